use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use tally_types::models::{CaseAction, CaseStatus};

use crate::models::{CaseRow, ResolveOutcome, ts};
use crate::{Database, OptionalExt};

impl Database {
    // -- Moderation cases --

    #[allow(clippy::too_many_arguments)]
    pub fn open_case(
        &self,
        id: &str,
        subject_account_id: &str,
        content_ref: Option<&str>,
        severity: &str,
        reporter_account_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO moderation_cases
                     (id, subject_account_id, content_ref, severity, status, reporter_account_id, opened_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
                (id, subject_account_id, content_ref, severity, reporter_account_id, ts(now)),
            )?;
            Ok(())
        })
    }

    pub fn get_case(&self, id: &str) -> Result<Option<CaseRow>> {
        self.with_conn(|conn| query_case(conn, id))
    }

    /// Moderation queue: open cases, oldest first.
    pub fn cases_for_review(&self, limit: u32) -> Result<Vec<CaseRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, subject_account_id, content_ref, severity, status,
                        reporter_account_id, resolution_notes, opened_at, resolved_at
                 FROM moderation_cases
                 WHERE status IN ('pending', 'investigating')
                 ORDER BY opened_at, rowid
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], map_case)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a moderator decision. The case update and its account side
    /// effect (warning increment or suspension) are one transaction, so a
    /// resolved case with an unapplied account action cannot exist.
    ///
    /// Transitions: terminal cases reject everything; `escalate` is only
    /// valid from `pending`.
    pub fn resolve_case(
        &self,
        case_id: &str,
        action: CaseAction,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ResolveOutcome> {
        self.with_tx(|tx| {
            let Some(case) = query_case(tx, case_id)? else {
                return Ok(ResolveOutcome::NotFound);
            };

            let Some(from) = CaseStatus::parse(&case.status) else {
                anyhow::bail!("bad case status '{}' on case {}", case.status, case_id);
            };
            let allowed = match action {
                CaseAction::Escalate => from == CaseStatus::Pending,
                _ => !from.is_terminal(),
            };
            if !allowed {
                return Ok(ResolveOutcome::InvalidTransition { from: case.status });
            }

            let new_status = match action {
                CaseAction::Dismiss => CaseStatus::Dismissed,
                CaseAction::Warn | CaseAction::Suspend => CaseStatus::Resolved,
                CaseAction::Escalate => CaseStatus::Investigating,
            };
            let resolved_at = new_status.is_terminal().then(|| ts(now));

            tx.execute(
                "UPDATE moderation_cases
                 SET status = ?1, resolution_notes = ?2, resolved_at = ?3
                 WHERE id = ?4",
                (new_status.as_str(), notes, &resolved_at, case_id),
            )?;

            match action {
                CaseAction::Warn => {
                    tx.execute(
                        "UPDATE accounts SET warning_count = warning_count + 1 WHERE id = ?1",
                        [&case.subject_account_id],
                    )?;
                }
                CaseAction::Suspend => {
                    tx.execute(
                        "UPDATE accounts SET status = 'suspended' WHERE id = ?1",
                        [&case.subject_account_id],
                    )?;
                }
                CaseAction::Dismiss | CaseAction::Escalate => {}
            }

            Ok(ResolveOutcome::Applied {
                case: CaseRow {
                    status: new_status.as_str().to_string(),
                    resolution_notes: notes.map(str::to_string),
                    resolved_at,
                    ..case
                },
            })
        })
    }

    /// Lift a suspension. Returns `None` when the account doesn't exist,
    /// otherwise whether anything changed (already-active is a no-op).
    pub fn reinstate(&self, account_id: &str) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE accounts SET status = 'active' WHERE id = ?1 AND status = 'suspended'",
                [account_id],
            )?;
            if changed > 0 {
                return Ok(Some(true));
            }
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM accounts WHERE id = ?1", [account_id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(exists.map(|_| false))
        })
    }
}

fn map_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaseRow> {
    Ok(CaseRow {
        id: row.get(0)?,
        subject_account_id: row.get(1)?,
        content_ref: row.get(2)?,
        severity: row.get(3)?,
        status: row.get(4)?,
        reporter_account_id: row.get(5)?,
        resolution_notes: row.get(6)?,
        opened_at: row.get(7)?,
        resolved_at: row.get(8)?,
    })
}

fn query_case(conn: &Connection, id: &str) -> Result<Option<CaseRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_account_id, content_ref, severity, status,
                reporter_account_id, resolution_notes, opened_at, resolved_at
         FROM moderation_cases WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], map_case).optional()?;
    Ok(row)
}
