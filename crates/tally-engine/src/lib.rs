pub mod checkin;
pub mod codes;
pub mod dispatcher;
pub mod geo;
pub mod ledger;
pub mod moderation;
pub mod policy;
pub mod rewards;
pub mod vouchers;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::error;

use tally_db::Database;
use tally_types::error::LoyaltyError;
use tally_types::events::LoyaltyEvent;

pub use crate::checkin::CheckinVerifier;
pub use crate::dispatcher::Dispatcher;
pub use crate::ledger::Ledger;
pub use crate::moderation::ModerationCaseManager;
pub use crate::policy::Policy;
pub use crate::rewards::RewardCatalog;
pub use crate::vouchers::VoucherValidator;

/// Shared state behind every component: the store, the notification
/// dispatcher, and the operating policy.
pub(crate) struct EngineInner {
    pub(crate) db: Database,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) policy: Policy,
}

/// The loyalty core. Cheap to clone; every component is a thin handle on
/// shared state and safe to call from any number of concurrent tasks. The
/// caller (the HTTP layer) supplies authenticated account ids — nothing in
/// here trusts a client-side id.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn open(path: &Path, policy: Policy) -> Result<Self, LoyaltyError> {
        let db = Database::open(path)?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                db,
                dispatcher: Dispatcher::new(),
                policy,
            }),
        })
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.inner.clone())
    }

    pub fn rewards(&self) -> RewardCatalog {
        RewardCatalog::new(self.inner.clone())
    }

    pub fn vouchers(&self) -> VoucherValidator {
        VoucherValidator::new(self.inner.clone())
    }

    pub fn checkins(&self) -> CheckinVerifier {
        CheckinVerifier::new(self.inner.clone())
    }

    pub fn moderation(&self) -> ModerationCaseManager {
        ModerationCaseManager::new(self.inner.clone())
    }

    /// Subscribe to user-visible notifications. Dropping the receiver (or
    /// never subscribing) is fine; delivery is fire-and-forget.
    pub fn subscribe(&self) -> broadcast::Receiver<LoyaltyEvent> {
        self.inner.dispatcher.subscribe()
    }
}

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, LoyaltyError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res.map_err(LoyaltyError::from),
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            Err(LoyaltyError::Storage(anyhow::anyhow!(
                "blocked task failed: {}",
                e
            )))
        }
    }
}
