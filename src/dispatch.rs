//! Stream dispatcher: routes one inbound frame by its active field name.
//!
//! Two independent lookups run for every frame:
//! 1. the field folded onto an event key reaches every subscriber of it;
//! 2. the field read as a response settles the oldest matching request.
//!
//! Either, both or neither may fire. Under the naming convention
//! notification and response names never collide, but nothing here relies
//! on that.

use frames::{Frame, names};
use tracing::trace;

use crate::pending::PendingTable;
use crate::subscriptions::SubscriptionRegistry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Subscribers the payload was handed to.
    pub delivered: usize,
    /// Whether a pending request was settled.
    pub resolved: bool,
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_unmatched(self) -> bool {
        self.delivered == 0 && !self.resolved
    }
}

pub fn dispatch_frame(
    frame: Frame,
    pending: &mut PendingTable,
    subscriptions: &SubscriptionRegistry,
) -> DispatchOutcome {
    let (name, payload) = frame.into_parts();

    let event = names::event_key(&name);
    let delivered = subscriptions.dispatch(&event, &payload);
    let resolved = pending.resolve(&name, payload);

    let outcome = DispatchOutcome { delivered, resolved };
    if outcome.is_unmatched() {
        trace!(field = %name, "dropping unmatched frame");
    } else {
        trace!(field = %name, delivered, resolved, "dispatched frame");
    }
    outcome
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
