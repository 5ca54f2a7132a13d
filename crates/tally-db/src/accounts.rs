use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::{AccountRow, DeltaOutcome, LedgerEntryRow, ts};
use crate::{Database, OptionalExt};

impl Database {
    // -- Accounts --

    pub fn create_account(&self, id: &str, display_name: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, display_name, point_balance, status, warning_count, created_at)
                 VALUES (?1, ?2, 0, 'active', 0, ?3)",
                (id, display_name, ts(now)),
            )?;
            Ok(())
        })
    }

    pub fn get_account(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, id))
    }

    // -- Ledger --

    /// Apply a signed point delta and append the matching ledger entry as
    /// one transaction. The balance update is conditional
    /// (`point_balance + delta >= 0`), so a debit past zero applies nothing
    /// and writes nothing.
    ///
    /// `require_active` refuses the mutation for suspended accounts; admin
    /// adjustments pass `false` so a suspended account can still be
    /// corrected.
    pub fn apply_delta(
        &self,
        entry_id: &str,
        account_id: &str,
        delta: i64,
        reason: &str,
        now: DateTime<Utc>,
        require_active: bool,
    ) -> Result<DeltaOutcome> {
        self.with_tx(|tx| {
            let Some((balance, status)) = query_balance_status(tx, account_id)? else {
                return Ok(DeltaOutcome::AccountNotFound);
            };
            if require_active && status == "suspended" {
                return Ok(DeltaOutcome::Suspended);
            }

            let changed = tx.execute(
                "UPDATE accounts SET point_balance = point_balance + ?1
                 WHERE id = ?2 AND point_balance + ?1 >= 0",
                (delta, account_id),
            )?;
            if changed == 0 {
                return Ok(DeltaOutcome::InsufficientBalance { balance });
            }

            tx.execute(
                "INSERT INTO ledger_entries (id, account_id, amount_delta, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (entry_id, account_id, delta, reason, ts(now)),
            )?;

            Ok(DeltaOutcome::Applied {
                new_balance: balance + delta,
            })
        })
    }

    /// Sum of all ledger deltas for an account. Must equal the cached
    /// balance; `Ledger::verify_account` checks exactly that.
    pub fn sum_entries(&self, account_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let sum = conn.query_row(
                "SELECT COALESCE(SUM(amount_delta), 0) FROM ledger_entries WHERE account_id = ?1",
                [account_id],
                |row| row.get(0),
            )?;
            Ok(sum)
        })
    }

    /// One-statement snapshot of the core invariant: cached balance vs
    /// entry sum. A single SELECT sees one consistent state even while
    /// writers are running. `None` if the account doesn't exist.
    pub fn verify_account(&self, account_id: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT a.point_balance,
                            COALESCE((SELECT SUM(amount_delta)
                                      FROM ledger_entries WHERE account_id = a.id), 0)
                     FROM accounts a WHERE a.id = ?1",
                    [account_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row.map(|(balance, sum)| balance == sum))
        })
    }

    pub fn ledger_history(&self, account_id: &str, limit: u32) -> Result<Vec<LedgerEntryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, amount_delta, reason, created_at
                 FROM ledger_entries
                 WHERE account_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map((account_id, limit), |row| {
                    Ok(LedgerEntryRow {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        amount_delta: row.get(2)?,
                        reason: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_account(conn: &Connection, id: &str) -> Result<Option<AccountRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, display_name, point_balance, status, warning_count, created_at
         FROM accounts WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                point_balance: row.get(2)?,
                status: row.get(3)?,
                warning_count: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_balance_status(
    conn: &Connection,
    account_id: &str,
) -> Result<Option<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT point_balance, status FROM accounts WHERE id = ?1")?;
    let row = stmt
        .query_row([account_id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    Ok(row)
}
