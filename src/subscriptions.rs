//! Subscription registry: push subscriptions that outlive any one stream.
//!
//! DESIGN
//! ======
//! Subscriptions are grouped by event name (`blockAddedNotification`), which
//! is derived once from the subscribe method at registration. Each entry
//! keeps the payload it was opened with so the whole registry can be
//! replayed onto a fresh stream after a reconnect.
//!
//! Delivery goes through an unbounded channel per subscription, so pushing a
//! notification never blocks the dispatch loop regardless of what the
//! consumer does with it.

use std::collections::BTreeMap;
use std::fmt;

use frames::{Frame, NameError, names};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque handle identifying one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Entry {
    id: SubscriptionId,
    payload: Value,
    sender: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    by_event: BTreeMap<String, Vec<Entry>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription opened with `method` and `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when `method` is not `notify<Noun>Request`.
    pub fn add(
        &mut self,
        method: &str,
        payload: Value,
        sender: mpsc::UnboundedSender<Value>,
    ) -> Result<SubscriptionId, NameError> {
        let event = names::event_name(method)?;
        let id = SubscriptionId::new();
        self.by_event
            .entry(event)
            .or_default()
            .push(Entry { id, payload, sender });
        Ok(id)
    }

    /// Stop local delivery for `id`. Nothing is sent to the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when `method` is not `notify<Noun>Request`.
    pub fn remove(&mut self, method: &str, id: SubscriptionId) -> Result<bool, NameError> {
        let event = names::event_name(method)?;
        let Some(entries) = self.by_event.get_mut(&event) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.by_event.remove(&event);
        }
        Ok(removed)
    }

    /// Deliver `payload` to every subscriber of `event`.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let Some(entries) = self.by_event.get(event) else {
            return 0;
        };
        let mut delivered = 0;
        for entry in entries {
            if entry.sender.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(%event, id = %entry.id, "subscription receiver dropped");
            }
        }
        delivered
    }

    /// Subscribe frames for every surviving subscription, in registry order.
    #[must_use]
    pub fn replay_frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        for (event, entries) in &self.by_event {
            let method = match names::notify_method(event) {
                Ok(method) => method,
                Err(e) => {
                    warn!(%event, error = %e, "cannot rebuild subscribe method");
                    continue;
                }
            };
            frames.extend(
                entries
                    .iter()
                    .map(|entry| Frame::new(method.clone(), entry.payload.clone())),
            );
        }
        frames
    }

    #[must_use]
    pub fn has_event(&self, event: &str) -> bool {
        self.by_event.contains_key(event)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}

// =============================================================================
// SUBSCRIPTION HANDLE
// =============================================================================

/// Receiving end of a subscription.
///
/// Await pushes with [`recv`](Self::recv), poll with
/// [`try_recv`](Self::try_recv) or consume as a stream. Dropping the handle
/// does not unsubscribe; call `Multiplexer::unsubscribe` for that.
pub struct Subscription {
    id: SubscriptionId,
    method: String,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, method: String, rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { id, method, rx }
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Next pushed payload. `None` once the subscription is removed and its
    /// buffered payloads are drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Next buffered payload, if one is ready.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = Value> {
        futures_util::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|value| (value, rx))
        })
    }
}

#[cfg(test)]
#[path = "subscriptions_test.rs"]
mod tests;
