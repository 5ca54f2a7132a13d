use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::accounts::query_balance_status;
use crate::models::{CheckinOutcome, CheckinRow, EventRow, ts};
use crate::{Database, OptionalExt};

impl Database {
    // -- Events --

    #[allow(clippy::too_many_arguments)]
    pub fn create_event(
        &self,
        id: &str,
        venue_id: &str,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        check_in_method: &str,
        latitude: f64,
        longitude: f64,
        qr_token: &str,
        points_reward: i64,
        rsvp_required: bool,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO events (id, venue_id, title, start_time, end_time, check_in_method,
                                     latitude, longitude, qr_token, points_reward, rsvp_required)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    id,
                    venue_id,
                    title,
                    ts(start_time),
                    ts(end_time),
                    check_in_method,
                    latitude,
                    longitude,
                    qr_token,
                    points_reward,
                    rsvp_required,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_event(&self, id: &str) -> Result<Option<EventRow>> {
        self.with_conn(|conn| query_event(conn, id))
    }

    // -- RSVPs --

    /// Idempotent: returns true if the RSVP was newly recorded.
    pub fn add_rsvp(&self, event_id: &str, account_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO event_rsvps (event_id, account_id, created_at)
                 VALUES (?1, ?2, ?3)",
                (event_id, account_id, ts(now)),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn has_rsvp(&self, event_id: &str, account_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM event_rsvps WHERE event_id = ?1 AND account_id = ?2",
                    (event_id, account_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Check-ins --

    pub fn get_checkin(&self, account_id: &str, event_id: &str) -> Result<Option<CheckinRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, event_id, method, verified_at, points_awarded
                 FROM checkins WHERE account_id = ?1 AND event_id = ?2",
            )?;
            let row = stmt
                .query_row((account_id, event_id), |row| {
                    Ok(CheckinRow {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        event_id: row.get(2)?,
                        method: row.get(3)?,
                        verified_at: row.get(4)?,
                        points_awarded: row.get(5)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    /// Record a verified check-in and credit the points as one transaction.
    /// `INSERT OR IGNORE` against `UNIQUE(account_id, event_id)` is the
    /// atomic once-per-event gate: a racing duplicate inserts zero rows and
    /// no credit is written.
    #[allow(clippy::too_many_arguments)]
    pub fn record_checkin(
        &self,
        checkin_id: &str,
        entry_id: &str,
        account_id: &str,
        event_id: &str,
        method: &str,
        points_reward: i64,
        now: DateTime<Utc>,
    ) -> Result<CheckinOutcome> {
        self.with_tx(|tx| {
            let Some((balance, status)) = query_balance_status(tx, account_id)? else {
                return Ok(CheckinOutcome::AccountNotFound);
            };
            if status == "suspended" {
                return Ok(CheckinOutcome::Suspended);
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO checkins (id, account_id, event_id, method, verified_at, points_awarded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (checkin_id, account_id, event_id, method, ts(now), points_reward),
            )?;
            if inserted == 0 {
                return Ok(CheckinOutcome::Duplicate);
            }

            tx.execute(
                "UPDATE accounts SET point_balance = point_balance + ?1 WHERE id = ?2",
                (points_reward, account_id),
            )?;

            tx.execute(
                "INSERT INTO ledger_entries (id, account_id, amount_delta, reason, created_at)
                 VALUES (?1, ?2, ?3, 'check-in', ?4)",
                (entry_id, account_id, points_reward, ts(now)),
            )?;

            Ok(CheckinOutcome::Recorded {
                new_balance: balance + points_reward,
            })
        })
    }
}

fn query_event(conn: &Connection, id: &str) -> Result<Option<EventRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, venue_id, title, start_time, end_time, check_in_method,
                latitude, longitude, qr_token, points_reward, rsvp_required
         FROM events WHERE id = ?1",
    )?;
    let row = stmt
        .query_row([id], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                venue_id: row.get(1)?,
                title: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                check_in_method: row.get(5)?,
                latitude: row.get(6)?,
                longitude: row.get(7)?,
                qr_token: row.get(8)?,
                points_reward: row.get(9)?,
                rsvp_required: row.get(10)?,
            })
        })
        .optional()?;
    Ok(row)
}
