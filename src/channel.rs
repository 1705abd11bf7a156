//! Duplex channel seam between the multiplexer and a concrete transport.
//!
//! DESIGN
//! ======
//! A transport hands the supervisor a [`Channel`]: a sink for outbound
//! frames and an ordered stream of inbound [`ChannelEvent`]s. The sink is an
//! unbounded queue drained by one writer task per connection, so concurrent
//! senders never interleave partial frames and a send never waits on the
//! socket. The event stream ending is treated the same as `Closed`.

use async_trait::async_trait;
use frames::Frame;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Buffer for inbound events between a transport reader and the supervisor.
pub const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
pub enum ChannelEvent {
    Frame(Frame),
    Error(TransportError),
    Closed,
}

pub struct Channel {
    pub sink: mpsc::UnboundedSender<Frame>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

impl Channel {
    #[must_use]
    pub fn new(sink: mpsc::UnboundedSender<Frame>, events: mpsc::Receiver<ChannelEvent>) -> Self {
        Self { sink, events }
    }
}

/// Opens a fresh duplex channel. Called once at startup and again after
/// every disconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the channel cannot be established.
    async fn connect(&self) -> Result<Channel, TransportError>;
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{Duration, timeout};

    use super::*;

    /// In-memory connector. Each successful `connect` hands the test the
    /// remote end of the new channel.
    #[derive(Clone)]
    pub struct MockConnector {
        remotes: mpsc::UnboundedSender<RemoteEnd>,
        refusals: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
    }

    /// The far side of one mock channel.
    pub struct RemoteEnd {
        outbound: mpsc::UnboundedReceiver<Frame>,
        events: mpsc::Sender<ChannelEvent>,
    }

    #[must_use]
    pub fn mock_connector() -> (MockConnector, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = MockConnector {
            remotes: tx,
            refusals: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        (connector, rx)
    }

    impl MockConnector {
        /// Make the next `count` connect attempts fail.
        pub fn refuse_next(&self, count: usize) {
            self.refusals.store(count, Ordering::SeqCst);
        }

        #[must_use]
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> Result<Channel, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(TransportError::Connect("connection refused".into()));
            }

            let (sink_tx, sink_rx) = mpsc::unbounded_channel();
            let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
            let _ = self.remotes.send(RemoteEnd { outbound: sink_rx, events: events_tx });
            Ok(Channel::new(sink_tx, events_rx))
        }
    }

    impl RemoteEnd {
        /// Next frame the multiplexer wrote.
        pub async fn next_frame(&mut self) -> Frame {
            timeout(Duration::from_millis(500), self.outbound.recv())
                .await
                .expect("outbound frame timed out")
                .expect("outbound channel closed unexpectedly")
        }

        /// Assert nothing else was written.
        pub async fn assert_silent(&mut self) {
            assert!(
                timeout(Duration::from_millis(80), self.outbound.recv()).await.is_err(),
                "expected no outbound frame"
            );
        }

        /// Stop accepting outbound frames while the channel still looks open.
        pub fn close_outbound(&mut self) {
            self.outbound.close();
        }

        pub async fn push(&self, frame: Frame) {
            self.events
                .send(ChannelEvent::Frame(frame))
                .await
                .expect("multiplexer stopped reading");
        }

        pub async fn fail(&self, message: &str) {
            let _ = self
                .events
                .send(ChannelEvent::Error(TransportError::Stream(message.to_owned())))
                .await;
        }

        pub async fn close(&self) {
            let _ = self.events.send(ChannelEvent::Closed).await;
        }
    }

    /// Wait for the next channel the multiplexer opens.
    pub async fn next_remote(remotes: &mut mpsc::UnboundedReceiver<RemoteEnd>) -> RemoteEnd {
        timeout(Duration::from_secs(2), remotes.recv())
            .await
            .expect("connect timed out")
            .expect("connector dropped")
    }
}
