//! Transport seam for the push connection.
//!
//! A [`Connector`] opens a [`Link`]: a pair of channels carrying outbound text
//! frames and inbound [`LinkEvent`]s. The manager never touches sockets
//! directly, which keeps the lifecycle logic testable with in-memory links.

use std::time::Duration;

use async_trait::async_trait;
use fieldhouse_shared::ConnectionError;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use rand::Rng;

/// Lifecycle state of the single push connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
    Errored,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }
}

/// Why a link closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server ended the session.
    ServerClosed,
    /// The link dropped underneath us (stream ended without a close frame).
    TransportLost(String),
    /// We closed it on purpose.
    ClientClosed,
}

impl DisconnectReason {
    /// Remote-initiated closes are the ones that trigger an automatic reconnect.
    pub fn is_remote(&self) -> bool {
        !matches!(self, DisconnectReason::ClientClosed)
    }
}

/// Something the transport reports about an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(String),
    Closed(DisconnectReason),
    Error(String),
}

/// An open link. Dropping `outbound` asks the transport to close.
pub struct Link {
    pub outbound: UnboundedSender<String>,
    pub inbound: UnboundedReceiver<LinkEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, ConnectionError>;
}

/// Capped exponential backoff with jitter for automatic reconnects.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
    /// Fraction (0.0..=1.0) of the delay that may be shaved off at random
    pub jitter: f32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            backoff_multiplier: 1.5,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before `attempt` (zero-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exp);
        let millis = self.initial_delay.as_millis() as f64 * factor as f64;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before `attempt` (zero-based), with jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let shave = rand::thread_rng().gen_range(0.0..=jitter);
        base.mul_f32(1.0 - shave)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::NativeConnector;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_only_shortens() {
        let policy = ReconnectPolicy {
            jitter: 0.5,
            ..ReconnectPolicy::default()
        };
        for attempt in 0..6 {
            let base = policy.base_delay(attempt);
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay <= base);
            assert!(delay >= base.mul_f32(0.49));
        }
    }

    #[test]
    fn attempt_limit() {
        let limited = ReconnectPolicy {
            max_attempts: 2,
            ..ReconnectPolicy::default()
        };
        assert!(limited.allows(1));
        assert!(!limited.allows(2));

        let forever = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert!(forever.allows(10_000));
    }

    #[test]
    fn only_client_close_is_local() {
        assert!(DisconnectReason::ServerClosed.is_remote());
        assert!(DisconnectReason::TransportLost("eof".into()).is_remote());
        assert!(!DisconnectReason::ClientClosed.is_remote());
    }
}
