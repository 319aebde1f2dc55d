//! Fan-out of one transport payload to the listeners registered for a key.
//!
//! Delivery iterates a snapshot of the listener set taken at dispatch time, so a listener
//! unregistering itself mid-round does not affect the current round. A panicking listener is
//! logged and does not prevent delivery to the others, nor does it affect watch health.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::error;

use crate::{
    subscription::registry::SubscriptionRegistry,
    transport::ChainTransport,
    types::{CallbackId, ChainEvent, EventCallback, SubscriptionKind},
};

/// Deliver a live payload for `kind`.
///
/// This is the single point where the reconnect attempt counter resets: any data arriving from
/// the transport confirms the watch is healthy, regardless of listener outcomes.
pub(crate) fn dispatch<T: ChainTransport>(
    registry: &SubscriptionRegistry<T>,
    kind: &SubscriptionKind,
    event: &ChainEvent,
) {
    let callbacks = registry.confirm_data(kind);
    deliver(kind, event, &callbacks);
}

/// Invoke each callback with its own clone of the payload, isolating panics per listener.
pub(crate) fn deliver(
    kind: &SubscriptionKind,
    event: &ChainEvent,
    callbacks: &[(CallbackId, EventCallback)],
) {
    for (id, callback) in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(event.clone()))).is_err() {
            error!(key = %kind, callback_id = *id, "listener panicked, continuing with remaining listeners");
        }
    }
}
