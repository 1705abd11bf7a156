//! Client-side multiplexer over one long-lived bidirectional message stream.
//!
//! Many concurrent request/response calls and many push subscriptions share
//! a single channel. Responses are matched back to callers by field name,
//! notifications fan out to every subscriber of their event, and a
//! supervisor reopens the channel after any failure and replays every live
//! subscription on it.
//!
//! ```no_run
//! # async fn demo() -> Result<(), streammux::MuxError> {
//! use serde_json::json;
//! use streammux::{Multiplexer, MuxConfig, WsConnector};
//!
//! let mux = Multiplexer::connect(WsConnector::new("ws://127.0.0.1:16110"), MuxConfig::from_env());
//! mux.wait_open().await?;
//!
//! let info = mux.request("getInfoRequest", json!({})).await?;
//! let mut blocks = mux.subscribe("notifyBlockAddedRequest", json!({}))?;
//! while let Some(block) = blocks.recv().await {
//!     println!("{info} {block}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mux;
pub mod pending;
pub mod subscriptions;
pub mod supervisor;
pub mod ws;

pub use channel::{Channel, ChannelEvent, Connector};
pub use config::{MuxConfig, PendingPolicy};
pub use error::{MuxError, TransportError};
pub use frames::{Frame, names};
pub use mux::{Multiplexer, MultiplexerBuilder};
pub use subscriptions::{Subscription, SubscriptionId};
pub use supervisor::{ConnectionState, MuxEvent};
pub use ws::{WireEncoding, WsConnector};
