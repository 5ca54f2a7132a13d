use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tally_db::models::RedeemOutcome;
use tally_types::error::LoyaltyError;
use tally_types::events::LoyaltyEvent;
use tally_types::models::{LedgerReason, Reward, Tier, Venue, Voucher};

use crate::{EngineInner, blocking, codes};

/// Venue-facing catalog plus the redemption path. Redemption is the one
/// place a debit and a voucher are created together; the store runs both in
/// a single transaction, so a failed voucher insert takes its debit down
/// with it.
#[derive(Clone)]
pub struct RewardCatalog {
    inner: Arc<EngineInner>,
}

impl RewardCatalog {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub async fn register_venue(
        &self,
        name: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<Venue, LoyaltyError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let name = name.to_string();

        let inner = self.inner.clone();
        {
            let name = name.clone();
            blocking(move || {
                inner
                    .db
                    .create_venue(&id.to_string(), &name, latitude, longitude, now)
            })
            .await?;
        }

        info!("registered venue {} ({})", id, name);
        Ok(Venue {
            id,
            name,
            latitude,
            longitude,
            created_at: now,
        })
    }

    pub async fn create_reward(
        &self,
        venue_id: Uuid,
        title: &str,
        category: &str,
        cost_points: u32,
    ) -> Result<Reward, LoyaltyError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let title = title.to_string();
        let category = category.to_string();

        let inner = self.inner.clone();
        {
            let title = title.clone();
            let category = category.clone();
            blocking(move || {
                if inner.db.get_venue(&venue_id.to_string())?.is_none() {
                    return Ok(None);
                }
                inner.db.create_reward(
                    &id.to_string(),
                    &venue_id.to_string(),
                    &title,
                    &category,
                    i64::from(cost_points),
                    now,
                )?;
                Ok(Some(()))
            })
            .await?
            .ok_or(LoyaltyError::VenueNotFound)?;
        }

        Ok(Reward {
            id,
            venue_id,
            title,
            category,
            cost_points: i64::from(cost_points),
            active: true,
            created_at: now,
        })
    }

    /// Soft toggle. Vouchers already issued against the reward stay
    /// redeemable until they expire.
    pub async fn set_reward_active(
        &self,
        reward_id: Uuid,
        active: bool,
    ) -> Result<(), LoyaltyError> {
        let inner = self.inner.clone();
        let found =
            blocking(move || inner.db.set_reward_active(&reward_id.to_string(), active)).await?;
        if !found {
            return Err(LoyaltyError::RewardNotFound);
        }
        Ok(())
    }

    /// Active rewards at a venue, oldest first.
    pub async fn rewards_for_venue(&self, venue_id: Uuid) -> Result<Vec<Reward>, LoyaltyError> {
        let inner = self.inner.clone();
        let rows = blocking(move || inner.db.rewards_for_venue(&venue_id.to_string())).await?;

        let rewards = rows
            .into_iter()
            .map(|row| row.into_reward())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(rewards)
    }

    /// Redeem a reward: debit its cost and issue a single-use voucher.
    pub async fn redeem(
        &self,
        account_id: Uuid,
        reward_id: Uuid,
    ) -> Result<Voucher, LoyaltyError> {
        let entry_id = Uuid::new_v4();
        let voucher_id = Uuid::new_v4();
        let code = codes::generate_code();
        let now = Utc::now();
        let expires_at = now + self.inner.policy.voucher_ttl;

        let inner = self.inner.clone();
        let outcome = blocking(move || {
            inner.db.redeem(
                &account_id.to_string(),
                &reward_id.to_string(),
                &entry_id.to_string(),
                &voucher_id.to_string(),
                &code,
                now,
                expires_at,
            )
        })
        .await?;

        match outcome {
            RedeemOutcome::Redeemed {
                voucher,
                new_balance,
                cost_points,
            } => {
                let voucher = voucher.into_voucher()?;
                info!(
                    "account {} redeemed reward {} for {} points",
                    account_id, reward_id, cost_points
                );
                self.inner.dispatcher.broadcast(LoyaltyEvent::PointsChanged {
                    account_id,
                    delta: -cost_points,
                    reason: LedgerReason::RedemptionDebit,
                    new_balance,
                    tier: Tier::for_balance(new_balance, &self.inner.policy.tiers),
                });
                self.inner.dispatcher.broadcast(LoyaltyEvent::VoucherIssued {
                    account_id,
                    voucher_id: voucher.id,
                    reward_id,
                    expires_at: voucher.expires_at,
                });
                Ok(voucher)
            }
            RedeemOutcome::RewardNotFound => Err(LoyaltyError::RewardNotFound),
            RedeemOutcome::RewardInactive => Err(LoyaltyError::RewardInactive),
            RedeemOutcome::InsufficientBalance { balance, requested } => {
                Err(LoyaltyError::InsufficientBalance { balance, requested })
            }
            RedeemOutcome::Suspended => Err(LoyaltyError::AccountSuspended),
            RedeemOutcome::AccountNotFound => Err(LoyaltyError::AccountNotFound),
        }
    }

    /// An account's vouchers, newest first.
    pub async fn vouchers_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<Voucher>, LoyaltyError> {
        let inner = self.inner.clone();
        let rows = blocking(move || inner.db.vouchers_for_account(&account_id.to_string())).await?;

        let vouchers = rows
            .into_iter()
            .map(|row| row.into_voucher())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(vouchers)
    }
}
