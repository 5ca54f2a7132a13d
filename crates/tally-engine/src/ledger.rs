use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use tally_db::models::DeltaOutcome;
use tally_types::error::LoyaltyError;
use tally_types::events::LoyaltyEvent;
use tally_types::models::{
    Account, AccountStatus, AccountSummary, BalanceChange, LedgerEntry, LedgerReason, Tier,
};

use crate::{EngineInner, blocking};

/// Owner of every balance mutation. All point movement goes through
/// `apply_delta`; nothing else writes `point_balance`, which is what keeps
/// the cached balance equal to the entry sum.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<EngineInner>,
}

impl Ledger {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub async fn open_account(&self, display_name: &str) -> Result<Account, LoyaltyError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let name = display_name.to_string();

        let inner = self.inner.clone();
        {
            let name = name.clone();
            blocking(move || inner.db.create_account(&id.to_string(), &name, now)).await?;
        }

        info!("opened account {} ({})", id, name);
        Ok(Account {
            id,
            display_name: name,
            point_balance: 0,
            status: AccountStatus::Active,
            warning_count: 0,
            created_at: now,
        })
    }

    /// Apply a signed point delta. Fails with `InsufficientBalance` (and
    /// writes nothing) if a debit would take the balance below zero.
    /// Suspended accounts are refused, except for admin adjustments.
    pub async fn apply_delta(
        &self,
        account_id: Uuid,
        delta: i64,
        reason: LedgerReason,
    ) -> Result<BalanceChange, LoyaltyError> {
        let entry_id = Uuid::new_v4();
        let now = Utc::now();
        let require_active = reason != LedgerReason::AdminAdjustment;

        let inner = self.inner.clone();
        let outcome = blocking(move || {
            inner.db.apply_delta(
                &entry_id.to_string(),
                &account_id.to_string(),
                delta,
                reason.as_str(),
                now,
                require_active,
            )
        })
        .await?;

        match outcome {
            DeltaOutcome::Applied { new_balance } => {
                let tier = Tier::for_balance(new_balance, &self.inner.policy.tiers);
                debug!(
                    "ledger: {} {:+} ({}) -> {}",
                    account_id,
                    delta,
                    reason.as_str(),
                    new_balance
                );
                self.inner.dispatcher.broadcast(LoyaltyEvent::PointsChanged {
                    account_id,
                    delta,
                    reason,
                    new_balance,
                    tier,
                });
                Ok(BalanceChange {
                    entry_id,
                    new_balance,
                    tier,
                })
            }
            DeltaOutcome::InsufficientBalance { balance } => {
                Err(LoyaltyError::InsufficientBalance {
                    balance,
                    requested: -delta,
                })
            }
            DeltaOutcome::Suspended => Err(LoyaltyError::AccountSuspended),
            DeltaOutcome::AccountNotFound => Err(LoyaltyError::AccountNotFound),
        }
    }

    /// Current balance plus the tier derived from it.
    pub async fn balance(&self, account_id: Uuid) -> Result<AccountSummary, LoyaltyError> {
        let inner = self.inner.clone();
        let row = blocking(move || inner.db.get_account(&account_id.to_string()))
            .await?
            .ok_or(LoyaltyError::AccountNotFound)?;
        let account = row.into_account()?;

        Ok(AccountSummary {
            tier: Tier::for_balance(account.point_balance, &self.inner.policy.tiers),
            id: account.id,
            display_name: account.display_name,
            point_balance: account.point_balance,
            status: account.status,
            warning_count: account.warning_count,
        })
    }

    /// Recent point movements, newest first.
    pub async fn history(
        &self,
        account_id: Uuid,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, LoyaltyError> {
        let inner = self.inner.clone();
        let rows =
            blocking(move || inner.db.ledger_history(&account_id.to_string(), limit)).await?;

        let entries = rows
            .into_iter()
            .map(|row| row.into_entry())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Check the core invariant for one account: the cached balance equals
    /// the sum of its ledger entries. Admin consistency sweeps call this;
    /// it should never return false.
    pub async fn verify_account(&self, account_id: Uuid) -> Result<bool, LoyaltyError> {
        let inner = self.inner.clone();
        blocking(move || inner.db.verify_account(&account_id.to_string()))
            .await?
            .ok_or(LoyaltyError::AccountNotFound)
    }
}
