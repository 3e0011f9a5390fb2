//! Outbound application events.
//!
//! The session state machine and the auxiliary loop emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them (serial log today).

use crate::app::commands::ActuatorCommand;
use crate::error::SessionError;
use crate::sensors::Reading;
use crate::session::{SessionState, SessionStats};

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The session loop has started (carries initial state).
    Started(SessionState),

    /// The session state machine moved between states.
    StateChanged { from: SessionState, to: SessionState },

    /// A session phase failed.  With a connection held the session is torn
    /// down next; without one the loop falls back to waiting for the link.
    SessionFailed(SessionError),

    /// A session was torn down; carries the running counters.
    SessionClosed(SessionStats),

    /// An inbound command was applied to an actuator.
    CommandApplied(ActuatorCommand),

    /// A reading was published as telemetry.
    TelemetryPublished(Reading),

    /// Every sensor attempt of this cycle failed; nothing was published.
    SampleSkipped { attempts: u8 },
}
