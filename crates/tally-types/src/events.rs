use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CaseAction, CaseSeverity, CaseStatus, LedgerReason, Tier};

/// User-visible notifications emitted by the core after a mutation commits.
/// Delivery is fire-and-forget: a dropped notification never rolls back the
/// mutation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LoyaltyEvent {
    /// An account's balance moved
    PointsChanged {
        account_id: Uuid,
        delta: i64,
        reason: LedgerReason,
        new_balance: i64,
        tier: Tier,
    },

    /// A redemption produced a voucher
    VoucherIssued {
        account_id: Uuid,
        voucher_id: Uuid,
        reward_id: Uuid,
        expires_at: DateTime<Utc>,
    },

    /// Venue staff consumed a voucher
    VoucherConsumed {
        voucher_id: Uuid,
        venue_id: Uuid,
    },

    /// A check-in was verified and credited
    CheckinVerified {
        account_id: Uuid,
        event_id: Uuid,
        points_awarded: i64,
    },

    /// A fraud/abuse case was opened
    CaseOpened {
        case_id: Uuid,
        subject_account_id: Uuid,
        severity: CaseSeverity,
    },

    /// A case reached a decision
    CaseResolved {
        case_id: Uuid,
        action: CaseAction,
        status: CaseStatus,
    },

    /// A previously suspended account was restored
    AccountReinstated {
        account_id: Uuid,
    },
}

impl LoyaltyEvent {
    /// Returns the account this event concerns, when it is account-scoped.
    /// `VoucherConsumed` is venue-facing and returns `None`.
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            Self::PointsChanged { account_id, .. } => Some(*account_id),
            Self::VoucherIssued { account_id, .. } => Some(*account_id),
            Self::CheckinVerified { account_id, .. } => Some(*account_id),
            Self::CaseOpened {
                subject_account_id, ..
            } => Some(*subject_account_id),
            Self::AccountReinstated { account_id } => Some(*account_id),
            Self::VoucherConsumed { .. } | Self::CaseResolved { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;

    #[test]
    fn test_event_wire_shape() {
        let account_id = Uuid::new_v4();
        let event = LoyaltyEvent::PointsChanged {
            account_id,
            delta: -200,
            reason: LedgerReason::RedemptionDebit,
            new_balance: 300,
            tier: Tier::Silver,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PointsChanged");
        assert_eq!(json["data"]["delta"], -200);
        assert_eq!(json["data"]["reason"], "redemption-debit");
        assert_eq!(json["data"]["tier"], "silver");

        let back: LoyaltyEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.account_id(), Some(account_id));
    }
}
