//! Port traits: the hexagonal boundary between the session loop and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SessionManager / AuxLoop (domain)
//! ```
//!
//! Driven adapters (network link, transport, broker protocol, sensor,
//! actuators, bus expander, event sinks, storage) implement these traits.
//! The session state machine consumes them via generics, so the domain core
//! never touches sockets or GPIO directly.
//!
//! ## Ownership notes
//!
//! - A [`BrokerConnection`] is owned by exactly one session and released
//!   through [`BrokerConnection::close`], which consumes it.
//! - Persisted config is range-checked on save and again on load.

use core::time::Duration;

use crate::config::NodeConfig;
use crate::error::{ActuatorError, BusError, ProtocolError, SensorError, TransportError};
use crate::sensors::Reading;

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: network supervisor → domain)
// ───────────────────────────────────────────────────────────────

/// Network-level connectivity as seen by the session loop.
///
/// The supervisor behind this port (Wi-Fi STA on the device) is responsible
/// for its own reconnection; the session only asks whether the link is up
/// and gives the supervisor a chance to make progress between checks.
pub trait LinkPort {
    /// True once the node has an IP address and can open sockets.
    fn is_ready(&self) -> bool;

    /// Let the supervisor advance its own reconnect logic.
    fn poll(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: domain ↔ byte stream)
// ───────────────────────────────────────────────────────────────

/// Opens byte-stream connections to the broker.
pub trait TransportConnector {
    type Connection: Transport;

    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Connection, TransportError>;
}

/// An open, exclusively owned byte stream.
pub trait Transport {
    /// Write the whole buffer or fail.
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read whatever is available, waiting at most `timeout`.
    /// Returns [`TransportError::Timeout`] if nothing arrived.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Shut the stream down.  Consumes the connection.
    fn close(self)
    where
        Self: Sized;
}

// ───────────────────────────────────────────────────────────────
// Broker port (driven adapter: domain ↔ pub/sub protocol)
// ───────────────────────────────────────────────────────────────

/// Everything the CONNECT request carries.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
}

/// Opens a protocol connection (transport already established, handshake not yet run).
pub trait BrokerConnector {
    type Connection: BrokerConnection;

    fn open(&mut self, host: &str, port: u16) -> Result<Self::Connection, TransportError>;
}

/// Request/response primitives of a pub/sub session.
///
/// All publishes are QoS 0 (fire-and-forget, no retain).
pub trait BrokerConnection {
    /// Send CONNECT and wait up to `timeout_ms` for an accepting CONNACK.
    fn handshake(&mut self, options: &ConnectOptions<'_>, timeout_ms: u32) -> Result<(), ProtocolError>;

    /// Subscribe to `filter` at QoS 0 and wait up to `timeout_ms` for SUBACK.
    fn subscribe(&mut self, filter: &str, timeout_ms: u32) -> Result<(), ProtocolError>;

    /// Emit one QoS 0 message.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ProtocolError>;

    /// Service the connection for `wait_ms`: deliver inbound messages to
    /// `on_message` and keep the protocol alive.  Any error is fatal to the
    /// session.
    fn service(
        &mut self,
        wait_ms: u32,
        on_message: &mut dyn FnMut(&str, &[u8]),
    ) -> Result<(), ProtocolError>;

    /// Politely end the protocol session.
    fn disconnect(&mut self) -> Result<(), ProtocolError>;

    /// Release the underlying transport.  Consumes the connection.
    fn close(self)
    where
        Self: Sized;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One temperature/humidity acquisition attempt.
pub trait SensorPort {
    fn read(&mut self) -> Result<Reading, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Bank of PWM outputs addressed by channel index.
pub trait ActuatorPort {
    /// Number of addressable channels.
    fn channel_count(&self) -> usize;

    /// Drive `channel` at `percent` duty (0–100).
    fn set_output(&mut self, channel: usize, percent: u8) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Bus expander port (driven adapter: aux loop → I2C device)
// ───────────────────────────────────────────────────────────────

/// 8-bit output register on an I2C port expander.
pub trait BusExpanderPort {
    fn write_outputs(&mut self, value: u8) -> Result<(), BusError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Persistence ports (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Boot-time source of [`NodeConfig`].
///
/// `save` range-checks every field and refuses the whole config on the
/// first bad one; `load` applies the same check to what it reads back.
pub trait ConfigPort {
    /// The stored config, or [`ConfigError::NotFound`] on a fresh device.
    fn load(&self) -> Result<NodeConfig, ConfigError>;

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError>;
}

/// Raw blobs addressed by `(namespace, key)`.
pub trait StoragePort {
    /// Copy the blob into `buf`, truncating to fit; returns the copied length.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Replace the blob and commit.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Remove the blob.  Removing a missing key succeeds.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Nothing stored yet.
    NotFound,
    /// The stored blob does not decode as a config.
    Corrupted,
    /// Names the offending field and its allowed range.
    ValidationFailed(&'static str),
    /// The encoded config does not fit the partition or blob limit.
    StorageFull,
    /// Backend failure.
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Full,
    Io,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no stored config"),
            Self::Corrupted => write!(f, "stored config unreadable"),
            Self::ValidationFailed(why) => write!(f, "invalid config: {why}"),
            Self::StorageFull => write!(f, "config does not fit in NVS"),
            Self::Io => write!(f, "NVS backend error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such key"),
            Self::Full => write!(f, "NVS full"),
            Self::Io => write!(f, "NVS backend error"),
        }
    }
}
