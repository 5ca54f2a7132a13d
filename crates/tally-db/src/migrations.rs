use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id             TEXT PRIMARY KEY,
            display_name   TEXT NOT NULL,
            point_balance  INTEGER NOT NULL DEFAULT 0 CHECK (point_balance >= 0),
            status         TEXT NOT NULL DEFAULT 'active',
            warning_count  INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL
        );

        -- Append-only: no UPDATE or DELETE is ever issued against this table.
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id            TEXT PRIMARY KEY,
            account_id    TEXT NOT NULL REFERENCES accounts(id),
            amount_delta  INTEGER NOT NULL,
            reason        TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_account
            ON ledger_entries(account_id, created_at);

        CREATE TABLE IF NOT EXISTS venues (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            latitude    REAL NOT NULL,
            longitude   REAL NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rewards (
            id           TEXT PRIMARY KEY,
            venue_id     TEXT NOT NULL REFERENCES venues(id),
            title        TEXT NOT NULL,
            category     TEXT NOT NULL,
            cost_points  INTEGER NOT NULL CHECK (cost_points >= 0),
            active       INTEGER NOT NULL DEFAULT 1,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_rewards_venue
            ON rewards(venue_id);

        CREATE TABLE IF NOT EXISTS vouchers (
            id                    TEXT PRIMARY KEY,
            account_id            TEXT NOT NULL REFERENCES accounts(id),
            reward_id             TEXT NOT NULL REFERENCES rewards(id),
            code                  TEXT NOT NULL UNIQUE,
            issued_at             TEXT NOT NULL,
            expires_at            TEXT NOT NULL,
            consumed              INTEGER NOT NULL DEFAULT 0,
            consumed_at           TEXT,
            consumed_at_venue_id  TEXT REFERENCES venues(id)
        );

        CREATE INDEX IF NOT EXISTS idx_vouchers_account
            ON vouchers(account_id);

        CREATE TABLE IF NOT EXISTS events (
            id               TEXT PRIMARY KEY,
            venue_id         TEXT NOT NULL REFERENCES venues(id),
            title            TEXT NOT NULL,
            start_time       TEXT NOT NULL,
            end_time         TEXT NOT NULL,
            check_in_method  TEXT NOT NULL,
            latitude         REAL NOT NULL,
            longitude        REAL NOT NULL,
            qr_token         TEXT NOT NULL,
            points_reward    INTEGER NOT NULL CHECK (points_reward >= 0),
            rsvp_required    INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_events_venue
            ON events(venue_id);

        CREATE TABLE IF NOT EXISTS event_rsvps (
            event_id    TEXT NOT NULL REFERENCES events(id),
            account_id  TEXT NOT NULL REFERENCES accounts(id),
            created_at  TEXT NOT NULL,
            UNIQUE(event_id, account_id)
        );

        -- UNIQUE(account_id, event_id) is the at-most-one-check-in gate;
        -- the insert and the ledger credit share one transaction.
        CREATE TABLE IF NOT EXISTS checkins (
            id              TEXT PRIMARY KEY,
            account_id      TEXT NOT NULL REFERENCES accounts(id),
            event_id        TEXT NOT NULL REFERENCES events(id),
            method          TEXT NOT NULL,
            verified_at     TEXT NOT NULL,
            points_awarded  INTEGER NOT NULL,
            UNIQUE(account_id, event_id)
        );

        CREATE TABLE IF NOT EXISTS moderation_cases (
            id                   TEXT PRIMARY KEY,
            subject_account_id   TEXT NOT NULL REFERENCES accounts(id),
            content_ref          TEXT,
            severity             TEXT NOT NULL,
            status               TEXT NOT NULL DEFAULT 'pending',
            reporter_account_id  TEXT REFERENCES accounts(id),
            resolution_notes     TEXT,
            opened_at            TEXT NOT NULL,
            resolved_at          TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_cases_status
            ON moderation_cases(status, opened_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
