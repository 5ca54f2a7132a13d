use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use tally_db::models::ResolveOutcome;
use tally_types::error::LoyaltyError;
use tally_types::events::LoyaltyEvent;
use tally_types::models::{CaseAction, CaseSeverity, CaseStatus, ModerationCase};

use crate::{EngineInner, blocking};

/// Fraud/abuse case workflow. A decision and its account side effect
/// (warning, suspension) commit together — a resolved case whose account
/// action didn't land cannot be observed, in either order.
#[derive(Clone)]
pub struct ModerationCaseManager {
    inner: Arc<EngineInner>,
}

impl ModerationCaseManager {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// File a case against an account. `reporter` is None for flags raised
    /// by the system itself (automated fraud signals).
    pub async fn open_case(
        &self,
        subject_account_id: Uuid,
        content_ref: Option<&str>,
        severity: CaseSeverity,
        reporter_account_id: Option<Uuid>,
    ) -> Result<ModerationCase, LoyaltyError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let content_ref = content_ref.map(str::to_string);

        let inner = self.inner.clone();
        {
            let content_ref = content_ref.clone();
            blocking(move || {
                if inner
                    .db
                    .get_account(&subject_account_id.to_string())?
                    .is_none()
                {
                    return Ok(false);
                }
                inner.db.open_case(
                    &id.to_string(),
                    &subject_account_id.to_string(),
                    content_ref.as_deref(),
                    severity.as_str(),
                    reporter_account_id.map(|r| r.to_string()).as_deref(),
                    now,
                )?;
                Ok(true)
            })
            .await?
            .then_some(())
            .ok_or(LoyaltyError::AccountNotFound)?;
        }

        warn!(
            "moderation case {} opened against {} ({})",
            id,
            subject_account_id,
            severity.as_str()
        );
        self.inner.dispatcher.broadcast(LoyaltyEvent::CaseOpened {
            case_id: id,
            subject_account_id,
            severity,
        });

        Ok(ModerationCase {
            id,
            subject_account_id,
            content_ref,
            severity,
            status: CaseStatus::Pending,
            reporter_account_id,
            resolution_notes: None,
            opened_at: now,
            resolved_at: None,
        })
    }

    /// Apply a moderator decision: dismiss, warn, suspend, or escalate.
    /// Terminal cases reject every further action; escalation is only valid
    /// from `pending`.
    pub async fn resolve(
        &self,
        case_id: Uuid,
        action: CaseAction,
        notes: Option<&str>,
    ) -> Result<ModerationCase, LoyaltyError> {
        let now = Utc::now();
        let notes = notes.map(str::to_string);

        let inner = self.inner.clone();
        let outcome = blocking(move || {
            inner
                .db
                .resolve_case(&case_id.to_string(), action, notes.as_deref(), now)
        })
        .await?;

        match outcome {
            ResolveOutcome::Applied { case } => {
                let case = case.into_case()?;
                info!(
                    "case {} -> {} ({})",
                    case_id,
                    case.status.as_str(),
                    action.as_str()
                );
                self.inner.dispatcher.broadcast(LoyaltyEvent::CaseResolved {
                    case_id,
                    action,
                    status: case.status,
                });
                Ok(case)
            }
            ResolveOutcome::NotFound => Err(LoyaltyError::CaseNotFound),
            ResolveOutcome::InvalidTransition { from } => {
                let from = CaseStatus::parse(&from).unwrap_or(CaseStatus::Pending);
                Err(LoyaltyError::InvalidTransition { from, action })
            }
        }
    }

    /// Lift a suspension (admin reversal). Idempotent for already-active
    /// accounts.
    pub async fn reinstate(&self, account_id: Uuid) -> Result<(), LoyaltyError> {
        let inner = self.inner.clone();
        let changed = blocking(move || inner.db.reinstate(&account_id.to_string()))
            .await?
            .ok_or(LoyaltyError::AccountNotFound)?;

        if changed {
            info!("account {} reinstated", account_id);
            self.inner
                .dispatcher
                .broadcast(LoyaltyEvent::AccountReinstated { account_id });
        }
        Ok(())
    }

    /// The moderation queue: open cases, oldest first.
    pub async fn cases_for_review(
        &self,
        limit: u32,
    ) -> Result<Vec<ModerationCase>, LoyaltyError> {
        let inner = self.inner.clone();
        let rows = blocking(move || inner.db.cases_for_review(limit)).await?;

        let cases = rows
            .into_iter()
            .map(|row| row.into_case())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(cases)
    }

    pub async fn get_case(&self, case_id: Uuid) -> Result<ModerationCase, LoyaltyError> {
        let inner = self.inner.clone();
        let row = blocking(move || inner.db.get_case(&case_id.to_string()))
            .await?
            .ok_or(LoyaltyError::CaseNotFound)?;
        Ok(row.into_case()?)
    }
}
