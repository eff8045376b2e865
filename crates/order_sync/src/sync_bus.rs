//! Publish/subscribe channel carrying committed order changes between views.

use std::sync::atomic::{AtomicU64, Ordering};

use order_types::{
    domain::OrderId,
    protocol::{ChangeEnvelope, OrderChange},
};
use tracing::{debug, trace};

use crate::{
    error::SyncError,
    observer::{Observers, SubscriptionToken},
};

/// Delivery is synchronous, in subscription order, with no deduplication:
/// handlers must tolerate seeing the same change twice.
pub struct SyncBus {
    order_id: OrderId,
    handlers: Observers<ChangeEnvelope>,
    published: AtomicU64,
}

impl SyncBus {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            handlers: Observers::new(),
            published: AtomicU64::new(0),
        }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&ChangeEnvelope) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.handlers.subscribe(handler)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.handlers.unsubscribe(token)
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Fire-and-forget; returns the number of handlers that were called.
    pub fn publish(&self, envelope: ChangeEnvelope) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let delivered = self.handlers.notify(&envelope);
        trace!(
            order_id = %envelope.order_id,
            kind = envelope.change.kind_name(),
            delivered,
            "published change"
        );
        delivered
    }

    /// Intake for untyped messages from an external channel. Malformed input
    /// is dropped here and never reaches a handler.
    pub fn deliver_json(&self, raw: &str) -> Result<usize, SyncError> {
        match decode_envelope(raw) {
            Ok(envelope) => Ok(self.publish(envelope)),
            Err(err) => {
                debug!(error = %err, "dropping malformed change envelope");
                Err(err)
            }
        }
    }
}

pub fn decode_envelope(raw: &str) -> Result<ChangeEnvelope, SyncError> {
    let envelope: ChangeEnvelope =
        serde_json::from_str(raw).map_err(|err| SyncError::MalformedEnvelope(err.to_string()))?;
    validate_envelope(&envelope)?;
    Ok(envelope)
}

fn validate_envelope(envelope: &ChangeEnvelope) -> Result<(), SyncError> {
    let malformed = |what: &str| -> Result<(), SyncError> {
        Err(SyncError::MalformedEnvelope(format!("empty {what}")))
    };
    if envelope.order_id.as_str().is_empty() {
        return malformed("order_id");
    }
    match &envelope.change {
        OrderChange::LineAdded { pricebook_entry_id } if pricebook_entry_id.as_str().is_empty() => {
            malformed("pricebook_entry_id")
        }
        OrderChange::LineRemoved { order_item_id, .. } if order_item_id.as_str().is_empty() => {
            malformed("order_item_id")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "tests/sync_bus_tests.rs"]
mod tests;
