use std::sync::Arc;

use tokio::sync::broadcast;

use tally_types::events::LoyaltyEvent;

/// Fans loyalty notifications out to whoever is listening (push gateways,
/// email workers, dashboards). Sends never fail the mutation that produced
/// them: no receivers just means the event is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<LoyaltyEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to notifications. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<LoyaltyEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all subscribers.
    pub fn broadcast(&self, event: LoyaltyEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
