//! Database row types — these map directly to SQLite rows.
//! Distinct from the tally-types domain models to keep the DB layer
//! independent; conversions parse the TEXT-encoded ids, enums, and
//! timestamps back into domain values.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tally_types::models::{
    Account, AccountStatus, CaseSeverity, CaseStatus, CheckInMethod, CheckinRecord, Event,
    LedgerEntry, LedgerReason, ModerationCase, Reward, Venue, Voucher,
};

pub struct AccountRow {
    pub id: String,
    pub display_name: String,
    pub point_balance: i64,
    pub status: String,
    pub warning_count: i64,
    pub created_at: String,
}

pub struct LedgerEntryRow {
    pub id: String,
    pub account_id: String,
    pub amount_delta: i64,
    pub reason: String,
    pub created_at: String,
}

pub struct VenueRow {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: String,
}

pub struct RewardRow {
    pub id: String,
    pub venue_id: String,
    pub title: String,
    pub category: String,
    pub cost_points: i64,
    pub active: bool,
    pub created_at: String,
}

pub struct VoucherRow {
    pub id: String,
    pub account_id: String,
    pub reward_id: String,
    pub code: String,
    pub issued_at: String,
    pub expires_at: String,
    pub consumed: bool,
    pub consumed_at: Option<String>,
    pub consumed_at_venue_id: Option<String>,
}

pub struct EventRow {
    pub id: String,
    pub venue_id: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub check_in_method: String,
    pub latitude: f64,
    pub longitude: f64,
    pub qr_token: String,
    pub points_reward: i64,
    pub rsvp_required: bool,
}

pub struct CheckinRow {
    pub id: String,
    pub account_id: String,
    pub event_id: String,
    pub method: String,
    pub verified_at: String,
    pub points_awarded: i64,
}

pub struct CaseRow {
    pub id: String,
    pub subject_account_id: String,
    pub content_ref: Option<String>,
    pub severity: String,
    pub status: String,
    pub reporter_account_id: Option<String>,
    pub resolution_notes: Option<String>,
    pub opened_at: String,
    pub resolved_at: Option<String>,
}

// -- Store-level outcomes --
//
// Conditional writes report what actually happened instead of leaking SQL
// errors; the engine maps these onto the user-facing error taxonomy.

pub enum DeltaOutcome {
    Applied { new_balance: i64 },
    InsufficientBalance { balance: i64 },
    Suspended,
    AccountNotFound,
}

pub enum RedeemOutcome {
    Redeemed {
        voucher: VoucherRow,
        new_balance: i64,
        cost_points: i64,
    },
    RewardNotFound,
    RewardInactive,
    InsufficientBalance {
        balance: i64,
        requested: i64,
    },
    Suspended,
    AccountNotFound,
}

pub enum ConsumeOutcome {
    Consumed { voucher: VoucherRow },
    NotFound,
    AlreadyUsed,
    Expired,
    WrongVenue,
}

pub enum CheckinOutcome {
    Recorded { new_balance: i64 },
    Duplicate,
    Suspended,
    AccountNotFound,
}

pub enum ResolveOutcome {
    Applied { case: CaseRow },
    NotFound,
    InvalidTransition { from: String },
}

// -- Row -> domain conversions --

pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("bad timestamp '{}'", s))
}

pub(crate) fn parse_id(s: &str) -> Result<Uuid> {
    s.parse().with_context(|| format!("bad uuid '{}'", s))
}

impl AccountRow {
    pub fn into_account(self) -> Result<Account> {
        Ok(Account {
            id: parse_id(&self.id)?,
            status: AccountStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("bad account status '{}'", self.status))?,
            display_name: self.display_name,
            point_balance: self.point_balance,
            warning_count: self.warning_count,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl LedgerEntryRow {
    pub fn into_entry(self) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: parse_id(&self.id)?,
            account_id: parse_id(&self.account_id)?,
            amount_delta: self.amount_delta,
            reason: LedgerReason::parse(&self.reason)
                .ok_or_else(|| anyhow!("bad ledger reason '{}'", self.reason))?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl VenueRow {
    pub fn into_venue(self) -> Result<Venue> {
        Ok(Venue {
            id: parse_id(&self.id)?,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl RewardRow {
    pub fn into_reward(self) -> Result<Reward> {
        Ok(Reward {
            id: parse_id(&self.id)?,
            venue_id: parse_id(&self.venue_id)?,
            title: self.title,
            category: self.category,
            cost_points: self.cost_points,
            active: self.active,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl VoucherRow {
    pub fn into_voucher(self) -> Result<Voucher> {
        Ok(Voucher {
            id: parse_id(&self.id)?,
            account_id: parse_id(&self.account_id)?,
            reward_id: parse_id(&self.reward_id)?,
            code: self.code,
            issued_at: parse_ts(&self.issued_at)?,
            expires_at: parse_ts(&self.expires_at)?,
            consumed: self.consumed,
            consumed_at: self.consumed_at.as_deref().map(parse_ts).transpose()?,
            consumed_at_venue_id: self
                .consumed_at_venue_id
                .as_deref()
                .map(parse_id)
                .transpose()?,
        })
    }
}

impl EventRow {
    pub fn into_event(self) -> Result<Event> {
        Ok(Event {
            id: parse_id(&self.id)?,
            venue_id: parse_id(&self.venue_id)?,
            title: self.title,
            start_time: parse_ts(&self.start_time)?,
            end_time: parse_ts(&self.end_time)?,
            check_in_method: CheckInMethod::parse(&self.check_in_method)
                .ok_or_else(|| anyhow!("bad check-in method '{}'", self.check_in_method))?,
            latitude: self.latitude,
            longitude: self.longitude,
            qr_token: self.qr_token,
            points_reward: self.points_reward,
            rsvp_required: self.rsvp_required,
        })
    }
}

impl CheckinRow {
    pub fn into_record(self) -> Result<CheckinRecord> {
        Ok(CheckinRecord {
            id: parse_id(&self.id)?,
            account_id: parse_id(&self.account_id)?,
            event_id: parse_id(&self.event_id)?,
            method: CheckInMethod::parse(&self.method)
                .ok_or_else(|| anyhow!("bad check-in method '{}'", self.method))?,
            verified_at: parse_ts(&self.verified_at)?,
            points_awarded: self.points_awarded,
        })
    }
}

impl CaseRow {
    pub fn into_case(self) -> Result<ModerationCase> {
        Ok(ModerationCase {
            id: parse_id(&self.id)?,
            subject_account_id: parse_id(&self.subject_account_id)?,
            content_ref: self.content_ref,
            severity: CaseSeverity::parse(&self.severity)
                .ok_or_else(|| anyhow!("bad severity '{}'", self.severity))?,
            status: CaseStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("bad case status '{}'", self.status))?,
            reporter_account_id: self
                .reporter_account_id
                .as_deref()
                .map(parse_id)
                .transpose()?,
            resolution_notes: self.resolution_notes,
            opened_at: parse_ts(&self.opened_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}
