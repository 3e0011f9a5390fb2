//! Broker session state machine.
//!
//! Same table-driven engine shape as a classic embedded FSM, but each row
//! carries a single fallible `step` instead of enter/exit/update hooks:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StateTable                                                 │
//! │  ┌────────────────┬─────────────────────────────────────┐   │
//! │  │ SessionState   │ step                                │   │
//! │  ├────────────────┼─────────────────────────────────────┤   │
//! │  │ WaitingForLink │ fn(ctx) -> Result<SessionState, E>  │   │
//! │  │ Connecting     │ fn(ctx) -> Result<SessionState, E>  │   │
//! │  │ HandshakeAuth  │ fn(ctx) -> Result<SessionState, E>  │   │
//! │  │ Subscribing    │ fn(ctx) -> Result<SessionState, E>  │   │
//! │  │ Active         │ fn(ctx) -> Result<SessionState, E>  │   │
//! │  │ Disconnecting  │ fn(ctx) -> Result<SessionState, E>  │   │
//! │  └────────────────┴─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine owns exactly one failure rule: an `Err` from any step moves
//! to `Disconnecting` if the session holds a connection, otherwise straight
//! back to `WaitingForLink`.  `Disconnecting` is therefore the only place a
//! connection is ever released.

pub mod context;
pub mod sampler;
pub mod states;
pub mod telemetry;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{ActuatorPort, BrokerConnector, EventSink, LinkPort, SensorPort};
use crate::error::SessionError;
pub use context::{Ports, SessionContext};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Connection lifecycle states.  Cyclic, no terminal state.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    WaitingForLink = 0,
    Connecting = 1,
    HandshakeAuth = 2,
    Subscribing = 3,
    Active = 4,
    Disconnecting = 5,
}

impl SessionState {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 6;

    /// Convert an index back to `SessionState`.  Out-of-range indices fall
    /// back to `WaitingForLink`, the one state that holds nothing.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::WaitingForLink,
            1 => Self::Connecting,
            2 => Self::HandshakeAuth,
            3 => Self::Subscribing,
            4 => Self::Active,
            5 => Self::Disconnecting,
            _ => {
                debug_assert!(false, "invalid session state index: {idx}");
                Self::WaitingForLink
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Platform bundle
// ---------------------------------------------------------------------------

/// The concrete collaborator types a session runs against.
///
/// Implemented by a zero-sized marker in `main` (real hardware) and by the
/// mock platform in the integration tests.
pub trait SessionPorts {
    type Link: LinkPort;
    type Broker: BrokerConnector;
    type Sensor: SensorPort;
    type Actuators: ActuatorPort;
    type Delay: DelayNs;
    type Sink: EventSink;
}

/// Connection type produced by a platform's broker connector.
pub type ConnectionOf<P> = <<P as SessionPorts>::Broker as BrokerConnector>::Connection;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Per-state handler.  Returns the next state, or the failure that ends
/// the current session.
pub type StepFn<P> = fn(&mut SessionContext<P>) -> Result<SessionState, SessionError>;

pub struct StateDescriptor<P: SessionPorts> {
    pub id: SessionState,
    pub name: &'static str,
    pub step: StepFn<P>,
}

// ---------------------------------------------------------------------------
// Session statistics
// ---------------------------------------------------------------------------

/// Running counters across all sessions since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sessions_opened: u32,
    pub session_failures: u32,
    pub telemetry_published: u32,
    pub cycles_skipped: u32,
    pub commands_applied: u32,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SessionManager<P: SessionPorts> {
    table: [StateDescriptor<P>; SessionState::COUNT],
    current: usize,
    ctx: SessionContext<P>,
    steps: u64,
}

impl<P: SessionPorts> SessionManager<P> {
    /// A manager in `WaitingForLink` with no connection.
    pub fn new(ctx: SessionContext<P>) -> Self {
        let table = states::build_state_table();
        debug_assert!(
            table.iter().enumerate().all(|(i, row)| row.id as usize == i),
            "state table rows out of order"
        );
        Self {
            table,
            current: SessionState::WaitingForLink as usize,
            ctx,
            steps: 0,
        }
    }

    /// Announce the initial state.  Call once before the first `step()`.
    pub fn start(&mut self) {
        info!("Session starting in state: {}", self.table[self.current].name);
        let state = self.state();
        self.ctx.ports.sink.emit(&AppEvent::Started(state));
    }

    /// Run the current state's step once and apply the resulting transition.
    pub fn step(&mut self) -> SessionState {
        self.steps += 1;
        let next = match (self.table[self.current].step)(&mut self.ctx) {
            Ok(next) => next,
            Err(e) => self.fail(e),
        };
        if next as usize != self.current {
            self.transition(next);
        }
        next
    }

    /// Drive the state machine forever.
    pub fn run(&mut self) -> ! {
        self.start();
        loop {
            self.step();
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_index(self.current)
    }

    pub fn has_connection(&self) -> bool {
        self.ctx.connection.is_some()
    }

    pub fn stats(&self) -> SessionStats {
        self.ctx.stats
    }

    /// Number of steps executed since construction.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn context(&self) -> &SessionContext<P> {
        &self.ctx
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn fail(&mut self, e: SessionError) -> SessionState {
        self.ctx.stats.session_failures += 1;
        self.ctx.ports.sink.emit(&AppEvent::SessionFailed(e));
        if self.ctx.connection.is_some() {
            warn!("Session failed in {}: {}", self.table[self.current].name, e);
            self.ctx.failure = Some(e);
            SessionState::Disconnecting
        } else {
            warn!("Session failed in {} (nothing to release): {}", self.table[self.current].name, e);
            self.ctx.backoff_pending = true;
            SessionState::WaitingForLink
        }
    }

    fn transition(&mut self, next: SessionState) {
        let from = self.state();
        info!(
            "Session transition: {} -> {}",
            self.table[self.current].name, self.table[next as usize].name
        );
        self.current = next as usize;
        self.ctx.ports.sink.emit(&AppEvent::StateChanged { from, to: next });
    }
}
