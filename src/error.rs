//! Error types for the EnvNode firmware.
//!
//! Every layer gets its own small `Copy` enum so failures can be passed
//! through the session state machine and logged without allocation.  The
//! session layer wraps lower-level errors with the phase they occurred in,
//! which is what ends up in the teardown log line.

use core::fmt;

// ---------------------------------------------------------------------------
// Transport errors (byte stream to the broker)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Host name did not resolve to any address.
    Resolve,
    /// TCP connect was refused or timed out.
    Connect,
    /// No data arrived within the requested receive window.
    Timeout,
    /// Peer closed the stream.
    Closed,
    /// Any other socket error.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "host resolution failed"),
            Self::Connect => write!(f, "connect failed"),
            Self::Timeout => write!(f, "receive timed out"),
            Self::Closed => write!(f, "connection closed by peer"),
            Self::Io => write!(f, "socket I/O error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol errors (MQTT exchange on top of the transport)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The underlying transport failed.
    Transport(TransportError),
    /// The expected acknowledgment did not arrive within the command timeout.
    Timeout,
    /// Broker rejected the CONNECT with the given return code.
    Refused(u8),
    /// Broker answered SUBSCRIBE with the failure code.
    SubscribeRejected,
    /// Inbound bytes do not form a valid packet.
    Malformed,
    /// A packet type arrived that makes no sense in the current exchange.
    Unexpected(u8),
    /// A PINGREQ went unanswered for a full keep-alive period.
    KeepAliveExpired,
    /// Packet does not fit in the fixed connection buffers.
    Overflow,
    /// An outbound payload could not be serialised.
    Encoding,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Timeout => write!(f, "acknowledgment timed out"),
            Self::Refused(code) => write!(f, "connection refused (code {code})"),
            Self::SubscribeRejected => write!(f, "subscription rejected"),
            Self::Malformed => write!(f, "malformed packet"),
            Self::Unexpected(kind) => write!(f, "unexpected packet type 0x{kind:02X}"),
            Self::KeepAliveExpired => write!(f, "keep-alive expired"),
            Self::Overflow => write!(f, "packet exceeds buffer"),
            Self::Encoding => write!(f, "payload encoding failed"),
        }
    }
}

impl From<TransportError> for ProtocolError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(_: serde_json::Error) -> Self {
        Self::Encoding
    }
}

// ---------------------------------------------------------------------------
// Session errors (what the state machine records as the teardown reason)
// ---------------------------------------------------------------------------

/// A session-fatal failure, tagged with the lifecycle phase it occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Connect(TransportError),
    Handshake(ProtocolError),
    Subscribe(ProtocolError),
    Service(ProtocolError),
    Publish(ProtocolError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect: {e}"),
            Self::Handshake(e) => write!(f, "handshake: {e}"),
            Self::Subscribe(e) => write!(f, "subscribe: {e}"),
            Self::Service(e) => write!(f, "service: {e}"),
            Self::Publish(e) => write!(f, "publish: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Sensor never answered the start pulse.
    NoResponse,
    /// A bit edge did not arrive in time mid-frame.
    Timeout,
    /// Frame checksum byte did not match the payload.
    Checksum,
    /// Decoded value is outside the physically plausible range.
    OutOfRange,
    /// GPIO read or write returned an error.
    Gpio,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response from sensor"),
            Self::Timeout => write!(f, "bit timing timeout"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::Gpio => write!(f, "GPIO error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Channel index has no PWM output behind it.
    InvalidChannel,
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChannel => write!(f, "invalid actuator channel"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus errors (I2C expander)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Device did not acknowledge its address or data.
    Nack,
    /// Arbitration loss, bus fault or any other controller error.
    Io,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "no acknowledge"),
            Self::Io => write!(f, "bus I/O error"),
        }
    }
}
