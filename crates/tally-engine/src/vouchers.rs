use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tally_db::models::ConsumeOutcome;
use tally_types::error::LoyaltyError;
use tally_types::events::LoyaltyEvent;
use tally_types::models::Voucher;

use crate::{EngineInner, blocking};

/// Venue-side voucher verification. Validation and consumption are one
/// call on purpose: a voucher that validates is already burned, so two
/// staff scanning the same code can't both hand out the reward.
#[derive(Clone)]
pub struct VoucherValidator {
    inner: Arc<EngineInner>,
}

impl VoucherValidator {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Check a presented code and consume it. Failure order: unknown code,
    /// already used, expired, wrong venue. On success the returned voucher
    /// is the consumed row.
    pub async fn validate(&self, code: &str, venue_id: Uuid) -> Result<Voucher, LoyaltyError> {
        let now = Utc::now();
        let code = code.to_string();

        let inner = self.inner.clone();
        let outcome =
            blocking(move || inner.db.consume_voucher(&code, &venue_id.to_string(), now)).await?;

        match outcome {
            ConsumeOutcome::Consumed { voucher } => {
                let voucher = voucher.into_voucher()?;
                info!("voucher {} consumed at venue {}", voucher.id, venue_id);
                self.inner
                    .dispatcher
                    .broadcast(LoyaltyEvent::VoucherConsumed {
                        voucher_id: voucher.id,
                        venue_id,
                    });
                Ok(voucher)
            }
            ConsumeOutcome::NotFound => Err(LoyaltyError::VoucherNotFound),
            ConsumeOutcome::AlreadyUsed => Err(LoyaltyError::VoucherAlreadyUsed),
            ConsumeOutcome::Expired => Err(LoyaltyError::VoucherExpired),
            ConsumeOutcome::WrongVenue => Err(LoyaltyError::VoucherWrongVenue),
        }
    }

    /// Look up a voucher without consuming it (support/debug view).
    pub async fn peek(&self, code: &str) -> Result<Voucher, LoyaltyError> {
        let code = code.to_string();
        let inner = self.inner.clone();
        let row = blocking(move || inner.db.get_voucher_by_code(&code))
            .await?
            .ok_or(LoyaltyError::VoucherNotFound)?;
        Ok(row.into_voucher()?)
    }
}
