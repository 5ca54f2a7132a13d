use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Accounts --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// Loyalty tier, derived from the current point balance. Never stored —
/// recomputed on every read so it can't drift from the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Silver,
    Gold,
    Platinum,
}

/// Balance thresholds for Gold and Platinum. Below `gold` is Silver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierThresholds {
    pub gold: i64,
    pub platinum: i64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            gold: 500,
            platinum: 1500,
        }
    }
}

impl Tier {
    pub fn for_balance(balance: i64, thresholds: &TierThresholds) -> Self {
        if balance >= thresholds.platinum {
            Self::Platinum
        } else if balance >= thresholds.gold {
            Self::Gold
        } else {
            Self::Silver
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub display_name: String,
    pub point_balance: i64,
    pub status: AccountStatus,
    pub warning_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Read-model view of an account: cached balance plus the derived tier.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub display_name: String,
    pub point_balance: i64,
    pub tier: Tier,
    pub status: AccountStatus,
    pub warning_count: i64,
}

// -- Ledger --

/// Why a ledger entry was written. The string forms are what the store
/// persists and what notification payloads carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerReason {
    Post,
    Like,
    Comment,
    Survey,
    DailyTask,
    CheckIn,
    RedemptionDebit,
    RedemptionRefund,
    CashoutDebit,
    AdminAdjustment,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Survey => "survey",
            Self::DailyTask => "daily-task",
            Self::CheckIn => "check-in",
            Self::RedemptionDebit => "redemption-debit",
            Self::RedemptionRefund => "redemption-refund",
            Self::CashoutDebit => "cashout-debit",
            Self::AdminAdjustment => "admin-adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "like" => Some(Self::Like),
            "comment" => Some(Self::Comment),
            "survey" => Some(Self::Survey),
            "daily-task" => Some(Self::DailyTask),
            "check-in" => Some(Self::CheckIn),
            "redemption-debit" => Some(Self::RedemptionDebit),
            "redemption-refund" => Some(Self::RedemptionRefund),
            "cashout-debit" => Some(Self::CashoutDebit),
            "admin-adjustment" => Some(Self::AdminAdjustment),
            _ => None,
        }
    }
}

/// Immutable point movement. The ledger is append-only: entries are never
/// updated or deleted, and the sum of deltas per account equals the cached
/// balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount_delta: i64,
    pub reason: LedgerReason,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful ledger mutation.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceChange {
    pub entry_id: Uuid,
    pub new_balance: i64,
    pub tier: Tier,
}

// -- Venues & rewards --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub title: String,
    pub category: String,
    pub cost_points: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Single-use proof of redemption, presented to venue staff. A voucher
/// survives deactivation of its reward and expires on its own clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: Uuid,
    pub account_id: Uuid,
    pub reward_id: Uuid,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_at_venue_id: Option<Uuid>,
}

// -- Events & check-ins --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInMethod {
    Gps,
    Qr,
    Either,
}

impl CheckInMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Qr => "qr",
            Self::Either => "either",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gps" => Some(Self::Gps),
            "qr" => Some(Self::Qr),
            "either" => Some(Self::Either),
            _ => None,
        }
    }

    /// Whether an event configured with `self` accepts a check-in made
    /// with `attempted`. `Either` on the event side accepts both;
    /// `Either` is not a valid attempt method.
    pub fn accepts(&self, attempted: CheckInMethod) -> bool {
        match self {
            Self::Either => matches!(attempted, Self::Gps | Self::Qr),
            _ => *self == attempted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub check_in_method: CheckInMethod,
    /// Check-in location. Defaults to the venue's coordinates when the
    /// event doesn't override them.
    pub latitude: f64,
    pub longitude: f64,
    pub qr_token: String,
    pub points_reward: i64,
    pub rsvp_required: bool,
}

/// What the client presents to prove presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum CheckinAttempt {
    Qr { token: String },
    Gps { latitude: f64, longitude: f64 },
}

impl CheckinAttempt {
    pub fn method(&self) -> CheckInMethod {
        match self {
            Self::Qr { .. } => CheckInMethod::Qr,
            Self::Gps { .. } => CheckInMethod::Gps,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub event_id: Uuid,
    pub method: CheckInMethod,
    pub verified_at: DateTime<Utc>,
    pub points_awarded: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckinConfirmation {
    pub record: CheckinRecord,
    pub points_earned: i64,
    pub new_balance: i64,
}

// -- Moderation --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSeverity {
    Low,
    Medium,
    High,
}

impl CaseSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pending,
    Investigating,
    Resolved,
    Dismissed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Investigating => "investigating",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "investigating" => Some(Self::Investigating),
            "resolved" => Some(Self::Resolved),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

/// What a moderator decided for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseAction {
    Dismiss,
    Warn,
    Suspend,
    Escalate,
}

impl CaseAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dismiss => "dismiss",
            Self::Warn => "warn",
            Self::Suspend => "suspend",
            Self::Escalate => "escalate",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationCase {
    pub id: Uuid,
    pub subject_account_id: Uuid,
    pub content_ref: Option<String>,
    pub severity: CaseSeverity,
    pub status: CaseStatus,
    pub reporter_account_id: Option<Uuid>,
    pub resolution_notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
