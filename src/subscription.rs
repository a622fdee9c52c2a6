//! Scoped signal subscriptions
//!
//! A [`SignalSubscription`] owns one handler registration on the bus and removes it
//! when dropped, so every exit path of a blocking operation (completion, error,
//! cancellation, interruption, panic unwinding) releases its handlers.

use crate::bus::{AdapterPath, AdapterSignal, Bus, BusError, HandlerId, SignalKind};
use std::sync::Arc;
use tracing::{trace, warn};

/// One live handler registration, removed on drop
#[must_use = "the handler is removed as soon as the subscription is dropped"]
pub struct SignalSubscription {
    bus: Arc<dyn Bus>,
    id: HandlerId,
    kind: SignalKind,
}

impl SignalSubscription {
    /// Register `handler` for signals of `kind` emitted by `adapter`
    ///
    /// # Errors
    /// Returns the bus error if the handler could not be installed. Nothing is left
    /// registered in that case.
    pub fn subscribe<F>(
        bus: &Arc<dyn Bus>,
        adapter: &AdapterPath,
        kind: SignalKind,
        handler: F,
    ) -> Result<Self, BusError>
    where
        F: Fn(&AdapterSignal) + Send + Sync + 'static,
    {
        let id = bus.add_signal_handler(adapter, kind, Arc::new(handler))?;
        trace!("[SIGNAL] Subscribed {:?} as {:?}", kind, id);
        Ok(Self {
            bus: Arc::clone(bus),
            id,
            kind,
        })
    }

    /// Id the bus assigned to the handler
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Signal class this subscription listens to
    #[must_use]
    pub fn kind(&self) -> SignalKind {
        self.kind
    }
}

impl core::fmt::Debug for SignalSubscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignalSubscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        if let Err(err) = self.bus.remove_signal_handler(self.id) {
            warn!("[SIGNAL] Failed to remove {:?} handler: {}", self.kind, err);
        } else {
            trace!("[SIGNAL] Unsubscribed {:?}", self.id);
        }
    }
}
