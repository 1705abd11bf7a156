//! Multiplexer configuration.
//!
//! Defaults reproduce the fixed two-second reconnect with no backoff or
//! jitter. Every knob can be overridden from the environment:
//!
//! - `STREAMMUX_RECONNECT_DELAY_MS`: base delay, default 2000
//! - `STREAMMUX_MAX_RECONNECT_DELAY_MS`: backoff ceiling, default 2000
//! - `STREAMMUX_BACKOFF_MULTIPLIER`: growth per failed attempt, default 1
//! - `STREAMMUX_RECONNECT_JITTER_MS`: random extra delay, default 0
//! - `STREAMMUX_PENDING_POLICY`: `retain` (default) or `fail`
//! - `STREAMMUX_EVENT_CAPACITY`: lifecycle event buffer, default 64
//! - `STREAMMUX_MAX_MESSAGE_BYTES`: inbound message size limit, default 0
//!   (unlimited)

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 1;
pub const DEFAULT_RECONNECT_JITTER_MS: u64 = 0;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// What happens to in-flight requests when the stream drops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PendingPolicy {
    /// Keep them registered. They never settle, since no response can arrive
    /// on the replacement stream.
    #[default]
    Retain,
    /// Reject them with `MuxError::Disconnected` as soon as the stream closes.
    FailOnDisconnect,
}

impl PendingPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "retain" => Some(Self::Retain),
            "fail" | "fail_on_disconnect" => Some(Self::FailOnDisconnect),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxConfig {
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub backoff_multiplier: u32,
    pub reconnect_jitter: Duration,
    pub pending_policy: PendingPolicy,
    pub event_capacity: usize,
    /// Largest inbound message a transport accepts. `None` is unlimited.
    pub max_message_size: Option<usize>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            reconnect_jitter: Duration::from_millis(DEFAULT_RECONNECT_JITTER_MS),
            pending_policy: PendingPolicy::Retain,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_message_size: None,
        }
    }
}

impl MuxConfig {
    /// Build config from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let reconnect_delay_ms = env_parse("STREAMMUX_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS);
        let max_reconnect_delay_ms = env_parse("STREAMMUX_MAX_RECONNECT_DELAY_MS", reconnect_delay_ms);
        let pending_policy = std::env::var("STREAMMUX_PENDING_POLICY")
            .ok()
            .and_then(|v| PendingPolicy::parse(&v))
            .unwrap_or_default();

        Self {
            reconnect_delay: Duration::from_millis(reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(max_reconnect_delay_ms.max(reconnect_delay_ms)),
            backoff_multiplier: env_parse("STREAMMUX_BACKOFF_MULTIPLIER", DEFAULT_BACKOFF_MULTIPLIER).max(1),
            reconnect_jitter: Duration::from_millis(env_parse(
                "STREAMMUX_RECONNECT_JITTER_MS",
                DEFAULT_RECONNECT_JITTER_MS,
            )),
            pending_policy,
            event_capacity: env_parse("STREAMMUX_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY).max(1),
            max_message_size: message_limit(env_parse("STREAMMUX_MAX_MESSAGE_BYTES", 0)),
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self.max_reconnect_delay = self.max_reconnect_delay.max(delay);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, multiplier: u32, max_delay: Duration) -> Self {
        self.backoff_multiplier = multiplier.max(1);
        self.max_reconnect_delay = max_delay.max(self.reconnect_delay);
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Cap inbound message size. `None` lifts the limit.
    #[must_use]
    pub fn with_max_message_size(mut self, limit: Option<usize>) -> Self {
        self.max_message_size = limit;
        self
    }

    #[must_use]
    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_policy = policy;
        self
    }

    /// Delay before reconnect attempt `attempt` (0-based), before jitter.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(attempt);
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.max_reconnect_delay)
    }

    /// Delay before reconnect attempt `attempt`, with jitter applied.
    #[must_use]
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff_delay(attempt);
        let jitter_ms = u64::try_from(self.reconnect_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Zero means no limit.
fn message_limit(bytes: usize) -> Option<usize> {
    (bytes > 0).then_some(bytes)
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
