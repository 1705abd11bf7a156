//! Connection supervisor: owns the channel lifetime.
//!
//! DESIGN
//! ======
//! One task per multiplexer runs the state machine
//!
//! ```text
//! Connecting → Open → Closing → (delay) → Connecting → ...
//! ```
//!
//! and is the only reader of the channel, so inbound frames are dispatched
//! strictly in arrival order. All mutable state (current sink, pending
//! table, subscription registry) sits behind one `Session` mutex. The lock
//! is never held across an await; every delivery is a non-blocking channel
//! send.
//!
//! LIFECYCLE
//! =========
//! 1. Connect → Open → replay subscriptions → ready hook or `Reconnected`
//! 2. Pump channel events through the dispatcher
//! 3. Error → emit `Error`, then fall through to close
//! 4. Close → emit `Closed`, drop the sink, apply the pending policy
//! 5. Wait the reconnect delay, go to 1
//!
//! Shutdown (explicit, or every `Multiplexer` handle dropped) ends the loop
//! from any state and rejects whatever is still pending.

use std::sync::{Arc, Mutex, MutexGuard};

use frames::Frame;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, Connector};
use crate::config::{MuxConfig, PendingPolicy};
use crate::dispatch::dispatch_frame;
use crate::error::MuxError;
use crate::pending::PendingTable;
use crate::subscriptions::SubscriptionRegistry;

// =============================================================================
// STATE & EVENTS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    /// Terminal: the multiplexer was shut down.
    Stopped,
}

/// Lifecycle signals for external listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MuxEvent {
    /// A channel failed or could not be opened. Recovery is automatic.
    Error { message: String },
    /// The channel closed; a reconnect is scheduled.
    Closed,
    /// A replacement channel is open and subscriptions were replayed.
    Reconnected,
}

pub(crate) struct Session {
    pub(crate) state: ConnectionState,
    sink: Option<mpsc::UnboundedSender<Frame>>,
    pub(crate) pending: PendingTable,
    pub(crate) subscriptions: SubscriptionRegistry,
}

impl Session {
    /// Write a frame on the live channel. Only succeeds while open.
    pub(crate) fn write(&self, frame: Frame) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        let Some(sink) = &self.sink else {
            return false;
        };
        sink.send(frame).is_ok()
    }
}

pub(crate) struct Shared {
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<MuxEvent>,
    pub(crate) config: MuxConfig,
}

impl Shared {
    pub(crate) fn new(config: MuxConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            session: Mutex::new(Session {
                state: ConnectionState::Connecting,
                sink: None,
                pending: PendingTable::new(),
                subscriptions: SubscriptionRegistry::new(),
            }),
            state_tx,
            events,
            config,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<MuxEvent> {
        self.events.subscribe()
    }

    fn transition(&self, session: &mut Session, state: ConnectionState) {
        session.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: MuxEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }
}

// =============================================================================
// SUPERVISOR TASK
// =============================================================================

pub(crate) type ReadyHook = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Supervisor {
    pub(crate) shared: Arc<Shared>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) on_ready: Option<ReadyHook>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub(crate) async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut opened_before = false;

        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                result = self.connector.connect() => result,
                () = wait_shutdown(&mut self.shutdown) => break,
            };

            match connected {
                Ok(channel) => {
                    attempt = 0;
                    let replayed = self.open(channel.sink);
                    if opened_before {
                        info!(replayed, "stream reconnected");
                        self.shared.emit(MuxEvent::Reconnected);
                    } else {
                        info!(replayed, "stream open");
                        if let Some(hook) = self.on_ready.take() {
                            hook();
                        }
                    }
                    opened_before = true;

                    // Shutdown skips the disconnect policy; `stop` rejects with `Shutdown`.
                    if self.pump(channel.events).await {
                        break;
                    }
                    self.close();
                }
                Err(e) => {
                    warn!(error = %e, attempt, "connect failed");
                    self.shared.emit(MuxEvent::Error { message: e.to_string() });
                    self.close();
                }
            }

            let delay = self.shared.config.reconnect_delay_for(attempt);
            attempt = attempt.saturating_add(1);
            info!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "reconnecting after delay");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = wait_shutdown(&mut self.shutdown) => break,
            }
        }

        self.stop();
    }

    /// Drive inbound events until the channel ends. Returns `true` when the
    /// loop should stop for good.
    async fn pump(&mut self, mut events: mpsc::Receiver<ChannelEvent>) -> bool {
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                () = wait_shutdown(&mut self.shutdown) => return true,
            };

            match event {
                Some(ChannelEvent::Frame(frame)) => {
                    let mut guard = self.shared.lock();
                    let session = &mut *guard;
                    dispatch_frame(frame, &mut session.pending, &session.subscriptions);
                }
                Some(ChannelEvent::Error(e)) => {
                    warn!(error = %e, "stream error");
                    self.shared.emit(MuxEvent::Error { message: e.to_string() });
                    self.shared.emit(MuxEvent::Closed);
                    return false;
                }
                Some(ChannelEvent::Closed) | None => {
                    info!("stream closed");
                    self.shared.emit(MuxEvent::Closed);
                    return false;
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let mut session = self.shared.lock();
        self.shared.transition(&mut session, state);
    }

    /// Install the new sink and replay every surviving subscription on it.
    fn open(&self, sink: mpsc::UnboundedSender<Frame>) -> usize {
        let mut session = self.shared.lock();
        session.sink = Some(sink);
        self.shared.transition(&mut session, ConnectionState::Open);

        let frames = session.subscriptions.replay_frames();
        let replayed = frames.len();
        for frame in frames {
            if !session.write(frame) {
                warn!("channel closed during subscription replay");
                break;
            }
        }
        replayed
    }

    fn close(&self) {
        let mut session = self.shared.lock();
        self.shared.transition(&mut session, ConnectionState::Closing);
        session.sink = None;

        match self.shared.config.pending_policy {
            PendingPolicy::FailOnDisconnect => {
                let failed = session.pending.fail_all(|| MuxError::Disconnected);
                if failed > 0 {
                    warn!(failed, "rejected in-flight requests on disconnect");
                }
            }
            PendingPolicy::Retain => {
                if !session.pending.is_empty() {
                    debug!(stale = session.pending.len(), "in-flight requests kept across disconnect");
                }
            }
        }
    }

    fn stop(&self) {
        let mut session = self.shared.lock();
        self.shared.transition(&mut session, ConnectionState::Stopped);
        session.sink = None;
        session.pending.fail_all(|| MuxError::Shutdown);
        info!("supervisor stopped");
    }
}

/// Resolves once shutdown is requested or every handle is gone.
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod tests;
