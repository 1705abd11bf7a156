//! Public multiplexer handle.
//!
//! A [`Multiplexer`] is cheap to clone; every clone drives the same channel.
//! Dropping the last clone stops the supervisor.

use std::sync::{Arc, Mutex};

use frames::{Frame, names};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::Connector;
use crate::config::MuxConfig;
use crate::error::MuxError;
use crate::subscriptions::{Subscription, SubscriptionId};
use crate::supervisor::{ConnectionState, MuxEvent, ReadyHook, Shared, Supervisor};

#[derive(Clone)]
pub struct Multiplexer {
    shared: Arc<Shared>,
    shutdown: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

pub struct MultiplexerBuilder {
    connector: Arc<dyn Connector>,
    config: MuxConfig,
    on_ready: Option<ReadyHook>,
}

impl MultiplexerBuilder {
    #[must_use]
    pub fn config(mut self, config: MuxConfig) -> Self {
        self.config = config;
        self
    }

    /// Called once, when the first channel opens.
    #[must_use]
    pub fn on_ready(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(hook));
        self
    }

    /// Start the supervisor. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> Multiplexer {
        let shared = Arc::new(Shared::new(self.config));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            shared: Arc::clone(&shared),
            connector: self.connector,
            on_ready: self.on_ready,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run());

        Multiplexer {
            shared,
            shutdown: Arc::new(shutdown),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

impl Multiplexer {
    pub fn builder(connector: impl Connector) -> MultiplexerBuilder {
        MultiplexerBuilder {
            connector: Arc::new(connector),
            config: MuxConfig::default(),
            on_ready: None,
        }
    }

    /// Shorthand for `builder(connector).config(config).spawn()`.
    #[must_use]
    pub fn connect(connector: impl Connector, config: MuxConfig) -> Self {
        Self::builder(connector).config(config).spawn()
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Send `method` with `payload` and wait for the matching response.
    ///
    /// A `null` payload is sent as `{}`. Concurrent requests with the same
    /// method settle in issue order.
    ///
    /// # Errors
    ///
    /// - `InvalidMethod` when `method` does not end in `Request`.
    /// - `NotConnected` when the channel is not open.
    /// - `Remote` when the response carries an `error` field.
    /// - `Disconnected` / `Shutdown` when the request can no longer settle.
    pub async fn request(&self, method: &str, payload: Value) -> Result<Value, MuxError> {
        let response = names::response_name(method)?;
        let payload = object_or_empty(payload);

        let handle = {
            let mut session = self.shared.lock();
            match session.state {
                ConnectionState::Open => {}
                ConnectionState::Stopped => return Err(MuxError::Shutdown),
                ConnectionState::Connecting | ConnectionState::Closing => {
                    return Err(MuxError::NotConnected);
                }
            }
            // Register after the write succeeds; the lock keeps the dispatcher out.
            if !session.write(Frame::new(method, payload)) {
                return Err(MuxError::NotConnected);
            }
            session.pending.register(method)
        };

        debug!(%method, awaiting = %response, "request sent");
        handle.await
    }

    /// Typed variant of [`request`](Self::request).
    ///
    /// # Errors
    ///
    /// Everything `request` returns, plus `Payload` when either side does not
    /// (de)serialize.
    pub async fn request_as<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, MuxError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let value = self.request(method, payload).await?;
        Ok(serde_json::from_value(value)?)
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Register a subscription and, if the channel is open, send it now.
    /// Otherwise it goes out when the next channel opens.
    ///
    /// # Errors
    ///
    /// `InvalidMethod` for names outside `notify<Event>Request`, `Shutdown`
    /// after [`shutdown`](Self::shutdown).
    pub fn subscribe(&self, method: &str, payload: Value) -> Result<Subscription, MuxError> {
        let payload = object_or_empty(payload);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut session = self.shared.lock();
        if session.state == ConnectionState::Stopped {
            return Err(MuxError::Shutdown);
        }
        let id = session.subscriptions.add(method, payload.clone(), tx)?;
        if session.write(Frame::new(method, payload)) {
            debug!(%method, %id, "subscribe sent");
        } else {
            debug!(%method, %id, "stream not open; subscribe deferred to next open");
        }
        Ok(Subscription::new(id, method.to_owned(), rx))
    }

    /// Callback flavour of [`subscribe`](Self::subscribe). The callback runs
    /// on a spawned task until the subscription is removed.
    ///
    /// # Errors
    ///
    /// Same as `subscribe`.
    pub fn subscribe_with<F>(&self, method: &str, payload: Value, mut callback: F) -> Result<SubscriptionId, MuxError>
    where
        F: FnMut(Value) + Send + 'static,
    {
        let mut subscription = self.subscribe(method, payload)?;
        let id = subscription.id();
        tokio::spawn(async move {
            while let Some(value) = subscription.recv().await {
                callback(value);
            }
        });
        Ok(id)
    }

    /// Remove one subscription. Nothing is sent to the remote side; later
    /// notifications for this event just stop reaching it.
    ///
    /// Returns `false` when the id was not registered under `method`.
    ///
    /// # Errors
    ///
    /// `InvalidMethod` for names outside `notify<Event>Request`.
    pub fn unsubscribe(&self, method: &str, id: SubscriptionId) -> Result<bool, MuxError> {
        let removed = self.shared.lock().subscriptions.remove(method, id)?;
        if removed {
            debug!(%method, %id, "unsubscribed");
        }
        Ok(removed)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Lifecycle events from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<MuxEvent> {
        self.shared.subscribe_events()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.watch_state().borrow()
    }

    /// Wait until the channel is open.
    ///
    /// # Errors
    ///
    /// `Shutdown` if the multiplexer stops first.
    pub async fn wait_open(&self) -> Result<(), MuxError> {
        let mut rx = self.shared.watch_state();
        let state = rx
            .wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Stopped))
            .await
            .map_err(|_| MuxError::Shutdown)?;
        match *state {
            ConnectionState::Open => Ok(()),
            _ => Err(MuxError::Shutdown),
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.lock().subscriptions.len()
    }

    /// Stop the supervisor, close the channel and reject pending requests
    /// with `Shutdown`. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "supervisor task failed");
            }
        }
    }
}

fn object_or_empty(payload: Value) -> Value {
    if payload.is_null() { json!({}) } else { payload }
}

#[cfg(test)]
#[path = "mux_test.rs"]
mod tests;
