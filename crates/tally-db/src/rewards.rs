use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::accounts::query_balance_status;
use crate::models::{ConsumeOutcome, RedeemOutcome, RewardRow, VenueRow, VoucherRow, ts};
use crate::{Database, OptionalExt};

impl Database {
    // -- Venues --

    pub fn create_venue(
        &self,
        id: &str,
        name: &str,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO venues (id, name, latitude, longitude, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, name, latitude, longitude, ts(now)),
            )?;
            Ok(())
        })
    }

    pub fn get_venue(&self, id: &str) -> Result<Option<VenueRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, latitude, longitude, created_at FROM venues WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(VenueRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        latitude: row.get(2)?,
                        longitude: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    // -- Rewards --

    pub fn create_reward(
        &self,
        id: &str,
        venue_id: &str,
        title: &str,
        category: &str,
        cost_points: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO rewards (id, venue_id, title, category, cost_points, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                (id, venue_id, title, category, cost_points, ts(now)),
            )?;
            Ok(())
        })
    }

    pub fn get_reward(&self, id: &str) -> Result<Option<RewardRow>> {
        self.with_conn(|conn| query_reward(conn, id))
    }

    /// Soft toggle. Returns false when the reward doesn't exist.
    /// Already-issued vouchers are untouched either way.
    pub fn set_reward_active(&self, id: &str, active: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE rewards SET active = ?1 WHERE id = ?2",
                (active, id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn rewards_for_venue(&self, venue_id: &str) -> Result<Vec<RewardRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, venue_id, title, category, cost_points, active, created_at
                 FROM rewards
                 WHERE venue_id = ?1 AND active = 1
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([venue_id], map_reward)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Redemption --

    /// Debit the reward's cost and issue a voucher as one transaction.
    /// A failure anywhere after the debit (voucher insert included) rolls
    /// the debit back, so points can never leak out of a failed redemption.
    pub fn redeem(
        &self,
        account_id: &str,
        reward_id: &str,
        entry_id: &str,
        voucher_id: &str,
        code: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<RedeemOutcome> {
        self.with_tx(|tx| {
            let Some(reward) = query_reward(tx, reward_id)? else {
                return Ok(RedeemOutcome::RewardNotFound);
            };
            if !reward.active {
                return Ok(RedeemOutcome::RewardInactive);
            }

            let Some((balance, status)) = query_balance_status(tx, account_id)? else {
                return Ok(RedeemOutcome::AccountNotFound);
            };
            if status == "suspended" {
                return Ok(RedeemOutcome::Suspended);
            }

            let changed = tx.execute(
                "UPDATE accounts SET point_balance = point_balance - ?1
                 WHERE id = ?2 AND point_balance >= ?1",
                (reward.cost_points, account_id),
            )?;
            if changed == 0 {
                return Ok(RedeemOutcome::InsufficientBalance {
                    balance,
                    requested: reward.cost_points,
                });
            }

            tx.execute(
                "INSERT INTO ledger_entries (id, account_id, amount_delta, reason, created_at)
                 VALUES (?1, ?2, ?3, 'redemption-debit', ?4)",
                (entry_id, account_id, -reward.cost_points, ts(now)),
            )?;

            tx.execute(
                "INSERT INTO vouchers (id, account_id, reward_id, code, issued_at, expires_at, consumed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                (voucher_id, account_id, reward_id, code, ts(now), ts(expires_at)),
            )?;

            Ok(RedeemOutcome::Redeemed {
                voucher: VoucherRow {
                    id: voucher_id.to_string(),
                    account_id: account_id.to_string(),
                    reward_id: reward_id.to_string(),
                    code: code.to_string(),
                    issued_at: ts(now),
                    expires_at: ts(expires_at),
                    consumed: false,
                    consumed_at: None,
                    consumed_at_venue_id: None,
                },
                new_balance: balance - reward.cost_points,
                cost_points: reward.cost_points,
            })
        })
    }

    // -- Vouchers --

    pub fn get_voucher_by_code(&self, code: &str) -> Result<Option<VoucherRow>> {
        self.with_conn(|conn| query_voucher_by_code(conn, code))
    }

    pub fn vouchers_for_account(&self, account_id: &str) -> Result<Vec<VoucherRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, reward_id, code, issued_at, expires_at,
                        consumed, consumed_at, consumed_at_venue_id
                 FROM vouchers
                 WHERE account_id = ?1
                 ORDER BY issued_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([account_id], map_voucher)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Validate-and-consume in one transaction. The consume write is
    /// conditioned on `consumed = 0`, so of two racing validators exactly
    /// one sees the row flip; the other gets `AlreadyUsed`.
    pub fn consume_voucher(
        &self,
        code: &str,
        venue_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        self.with_tx(|tx| {
            let Some((voucher, reward_venue_id)) = query_voucher_with_venue(tx, code)? else {
                return Ok(ConsumeOutcome::NotFound);
            };

            if voucher.consumed {
                return Ok(ConsumeOutcome::AlreadyUsed);
            }
            let expires_at = crate::models::parse_ts(&voucher.expires_at)?;
            if now > expires_at {
                return Ok(ConsumeOutcome::Expired);
            }
            if reward_venue_id != venue_id {
                return Ok(ConsumeOutcome::WrongVenue);
            }

            let changed = tx.execute(
                "UPDATE vouchers SET consumed = 1, consumed_at = ?1, consumed_at_venue_id = ?2
                 WHERE id = ?3 AND consumed = 0",
                (ts(now), venue_id, &voucher.id),
            )?;
            if changed == 0 {
                return Ok(ConsumeOutcome::AlreadyUsed);
            }

            Ok(ConsumeOutcome::Consumed {
                voucher: VoucherRow {
                    consumed: true,
                    consumed_at: Some(ts(now)),
                    consumed_at_venue_id: Some(venue_id.to_string()),
                    ..voucher
                },
            })
        })
    }
}

fn map_reward(row: &rusqlite::Row<'_>) -> rusqlite::Result<RewardRow> {
    Ok(RewardRow {
        id: row.get(0)?,
        venue_id: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        cost_points: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_voucher(row: &rusqlite::Row<'_>) -> rusqlite::Result<VoucherRow> {
    Ok(VoucherRow {
        id: row.get(0)?,
        account_id: row.get(1)?,
        reward_id: row.get(2)?,
        code: row.get(3)?,
        issued_at: row.get(4)?,
        expires_at: row.get(5)?,
        consumed: row.get(6)?,
        consumed_at: row.get(7)?,
        consumed_at_venue_id: row.get(8)?,
    })
}

fn query_reward(conn: &Connection, id: &str) -> Result<Option<RewardRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, venue_id, title, category, cost_points, active, created_at
         FROM rewards WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], map_reward).optional()?;
    Ok(row)
}

fn query_voucher_by_code(conn: &Connection, code: &str) -> Result<Option<VoucherRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, reward_id, code, issued_at, expires_at,
                consumed, consumed_at, consumed_at_venue_id
         FROM vouchers WHERE code = ?1",
    )?;
    let row = stmt.query_row([code], map_voucher).optional()?;
    Ok(row)
}

/// Voucher joined with its reward's venue — vouchers are redeemed at the
/// venue that owns the reward, even if the reward was deactivated since.
fn query_voucher_with_venue(
    conn: &Connection,
    code: &str,
) -> Result<Option<(VoucherRow, String)>> {
    let mut stmt = conn.prepare(
        "SELECT v.id, v.account_id, v.reward_id, v.code, v.issued_at, v.expires_at,
                v.consumed, v.consumed_at, v.consumed_at_venue_id, r.venue_id
         FROM vouchers v
         JOIN rewards r ON v.reward_id = r.id
         WHERE v.code = ?1",
    )?;
    let row = stmt
        .query_row([code], |row| {
            Ok((
                VoucherRow {
                    id: row.get(0)?,
                    account_id: row.get(1)?,
                    reward_id: row.get(2)?,
                    code: row.get(3)?,
                    issued_at: row.get(4)?,
                    expires_at: row.get(5)?,
                    consumed: row.get(6)?,
                    consumed_at: row.get(7)?,
                    consumed_at_venue_id: row.get(8)?,
                },
                row.get(9)?,
            ))
        })
        .optional()?;
    Ok(row)
}
