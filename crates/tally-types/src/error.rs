use thiserror::Error;

use crate::models::{CaseAction, CaseStatus};

/// Everything the core can refuse to do, plus one catch-all for unexpected
/// storage failures. All variants except `Storage` are user-facing and map
/// to 4xx at the HTTP layer; `Storage` means the operation was not applied.
#[derive(Debug, Error)]
pub enum LoyaltyError {
    #[error("account not found")]
    AccountNotFound,

    #[error("account is suspended")]
    AccountSuspended,

    #[error("insufficient balance: have {balance}, need {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    #[error("reward not found")]
    RewardNotFound,

    #[error("reward is no longer active")]
    RewardInactive,

    #[error("venue not found")]
    VenueNotFound,

    #[error("voucher not found")]
    VoucherNotFound,

    #[error("voucher already used")]
    VoucherAlreadyUsed,

    #[error("voucher expired")]
    VoucherExpired,

    #[error("voucher is not valid at this venue")]
    VoucherWrongVenue,

    #[error("event not found")]
    EventNotFound,

    #[error("account is not registered for this event")]
    NotRegistered,

    #[error("already checked in to this event")]
    AlreadyCheckedIn,

    #[error("check-in method not accepted for this event")]
    WrongMethod,

    #[error("check-in code does not match")]
    InvalidCode,

    #[error("too far from venue: {distance_m:.0}m away, limit {max_m:.0}m")]
    TooFar { distance_m: f64, max_m: f64 },

    #[error("event has not started yet")]
    CheckinNotOpen,

    #[error("event has ended")]
    CheckinEnded,

    #[error("moderation case not found")]
    CaseNotFound,

    #[error("cannot apply {action:?} to a case in state {from:?}")]
    InvalidTransition { from: CaseStatus, action: CaseAction },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LoyaltyError {
    /// True for failures caused by the request rather than by the system.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
