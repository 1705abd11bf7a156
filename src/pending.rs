//! Pending-request table: in-flight exchanges awaiting a response frame.
//!
//! DESIGN
//! ======
//! Entries are kept in issue order. A response frame resolves the oldest
//! entry whose request name matches the response name with its `Response`
//! suffix turned back into `Request`. There is no id on the wire, so two
//! concurrent calls to the same method are answered first-in, first-out.
//!
//! Callers that give up on a request (for example by wrapping it in a
//! timeout) drop their handle. Such entries are pruned before matching so
//! they cannot swallow the response meant for a later caller.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::MuxError;

/// Payload key carrying an application-level error.
pub const ERROR_FIELD: &str = "error";

type Completion = oneshot::Sender<Result<Value, MuxError>>;

struct PendingRequest {
    request_name: String,
    completion: Completion,
}

#[derive(Default)]
pub struct PendingTable {
    entries: Vec<PendingRequest>,
}

/// Future settled when the matching response arrives.
pub struct PendingHandle {
    rx: oneshot::Receiver<Result<Value, MuxError>>,
}

impl Future for PendingHandle {
    type Output = Result<Value, MuxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the table was torn down with the multiplexer.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(MuxError::Shutdown)))
    }
}

impl PendingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, request_name: impl Into<String>) -> PendingHandle {
        let (tx, rx) = oneshot::channel();
        self.entries.push(PendingRequest { request_name: request_name.into(), completion: tx });
        PendingHandle { rx }
    }

    /// Settle the oldest request answered by `response_field`.
    ///
    /// Returns `false` when nothing matched; the frame is then either a
    /// notification or an orphaned response.
    pub fn resolve(&mut self, response_field: &str, payload: Value) -> bool {
        let Some(request_name) = frames::names::request_name(response_field) else {
            return false;
        };

        self.entries.retain(|entry| !entry.completion.is_closed());
        let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.request_name == request_name)
        else {
            return false;
        };

        let entry = self.entries.remove(index);
        let _ = entry.completion.send(settle(payload));
        true
    }

    /// Reject every in-flight request, leaving the table empty.
    pub fn fail_all(&mut self, reason: impl Fn() -> MuxError) -> usize {
        let drained = self.entries.len();
        for entry in self.entries.drain(..) {
            let _ = entry.completion.send(Err(reason()));
        }
        drained
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a response payload into success or application error.
fn settle(mut payload: Value) -> Result<Value, MuxError> {
    if let Some(map) = payload.as_object_mut() {
        if let Some(error) = map.remove(ERROR_FIELD) {
            if is_set(&error) {
                return Err(MuxError::Remote(error));
            }
        }
    }
    Ok(payload)
}

/// Null, `false`, `""` and `0` mean "no error"; defaulted schema fields
/// arrive in one of those shapes.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Number(number) => number.as_f64().is_some_and(|n| n.abs() > 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod tests;
