//! Concrete session step functions and table builder.
//!
//! ```text
//!  WAITING_FOR_LINK ──[link up]──▶ CONNECTING ──[socket open]──▶ HANDSHAKE_AUTH
//!        ▲    ▲                        │                               │
//!        │    └──────[connect error]───┘                          [CONNACK ok]
//!        │                                                             ▼
//!        │                                                        SUBSCRIBING
//!        │                                                             │
//!        │                                                        [SUBACK ok]
//!        │                                                             ▼
//!        └──────────── DISCONNECTING ◀──[any error]────────────────  ACTIVE ⟲
//! ```
//!
//! `Active` loops on itself: one step is one service / sample / publish /
//! sleep cycle.

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use super::context::SessionContext;
use super::sampler::SampleOutcome;
use super::{SessionPorts, SessionState, StateDescriptor};
use crate::app::commands;
use crate::app::events::AppEvent;
use crate::app::ports::{ActuatorPort, BrokerConnection, BrokerConnector, ConnectOptions, EventSink, LinkPort};
use crate::error::SessionError;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Called once per [`SessionManager`](super::SessionManager).
pub fn build_state_table<P: SessionPorts>() -> [StateDescriptor<P>; SessionState::COUNT] {
    [
        // Index 0: WaitingForLink
        StateDescriptor {
            id: SessionState::WaitingForLink,
            name: "WaitingForLink",
            step: waiting_for_link_step::<P>,
        },
        // Index 1: Connecting
        StateDescriptor {
            id: SessionState::Connecting,
            name: "Connecting",
            step: connecting_step::<P>,
        },
        // Index 2: HandshakeAuth
        StateDescriptor {
            id: SessionState::HandshakeAuth,
            name: "HandshakeAuth",
            step: handshake_step::<P>,
        },
        // Index 3: Subscribing
        StateDescriptor {
            id: SessionState::Subscribing,
            name: "Subscribing",
            step: subscribing_step::<P>,
        },
        // Index 4: Active
        StateDescriptor {
            id: SessionState::Active,
            name: "Active",
            step: active_step::<P>,
        },
        // Index 5: Disconnecting
        StateDescriptor {
            id: SessionState::Disconnecting,
            name: "Disconnecting",
            step: disconnecting_step::<P>,
        },
    ]
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAITING_FOR_LINK: block (at a bounded poll rate) until the network is up
// ═══════════════════════════════════════════════════════════════════════════

fn waiting_for_link_step<P: SessionPorts>(
    ctx: &mut SessionContext<P>,
) -> Result<SessionState, SessionError> {
    if ctx.backoff_pending {
        ctx.backoff_pending = false;
        debug!("WAITING: reconnect backoff {} ms", ctx.config.reconnect_delay_ms);
        ctx.ports.delay.delay_ms(ctx.config.reconnect_delay_ms);
    }

    loop {
        ctx.ports.link.poll();
        if ctx.ports.link.is_ready() {
            return Ok(SessionState::Connecting);
        }
        ctx.ports.delay.delay_ms(ctx.config.link_poll_interval_ms);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING: open the transport to the broker
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_step<P: SessionPorts>(ctx: &mut SessionContext<P>) -> Result<SessionState, SessionError> {
    if ctx.connection.is_some() {
        // Only Disconnecting may release a connection; never open a second one.
        error!("CONNECTING: connection already held, tearing it down first");
        return Ok(SessionState::Disconnecting);
    }

    info!(
        "CONNECTING: {}:{}",
        ctx.config.broker_host, ctx.config.broker_port
    );
    let conn = ctx
        .ports
        .broker
        .open(&ctx.config.broker_host, ctx.config.broker_port)
        .map_err(SessionError::Connect)?;
    ctx.connection = Some(conn);
    ctx.established = false;
    Ok(SessionState::HandshakeAuth)
}

// ═══════════════════════════════════════════════════════════════════════════
//  HANDSHAKE_AUTH: CONNECT / CONNACK
// ═══════════════════════════════════════════════════════════════════════════

fn handshake_step<P: SessionPorts>(ctx: &mut SessionContext<P>) -> Result<SessionState, SessionError> {
    let Some(conn) = ctx.connection.as_mut() else {
        error!("HANDSHAKE: no connection");
        return Ok(SessionState::WaitingForLink);
    };

    let options = ConnectOptions {
        client_id: &ctx.config.client_id,
        username: non_empty(&ctx.config.username),
        password: non_empty(&ctx.config.password),
        keep_alive_secs: ctx.config.keep_alive_secs,
        clean_session: true,
    };
    conn.handshake(&options, ctx.config.command_timeout_ms)
        .map_err(SessionError::Handshake)?;
    ctx.established = true;
    info!("HANDSHAKE: accepted as '{}'", ctx.config.client_id);
    Ok(SessionState::Subscribing)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SUBSCRIBING: SUBSCRIBE / SUBACK on the command pattern
// ═══════════════════════════════════════════════════════════════════════════

fn subscribing_step<P: SessionPorts>(ctx: &mut SessionContext<P>) -> Result<SessionState, SessionError> {
    let Some(conn) = ctx.connection.as_mut() else {
        error!("SUBSCRIBING: no connection");
        return Ok(SessionState::WaitingForLink);
    };

    conn.subscribe(&ctx.config.command_topic, ctx.config.command_timeout_ms)
        .map_err(SessionError::Subscribe)?;
    ctx.stats.sessions_opened += 1;
    info!("SUBSCRIBING: listening on '{}'", ctx.config.command_topic);
    Ok(SessionState::Active)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ACTIVE: service inbound commands, then sample → publish → sleep
// ═══════════════════════════════════════════════════════════════════════════

fn active_step<P: SessionPorts>(ctx: &mut SessionContext<P>) -> Result<SessionState, SessionError> {
    let Some(conn) = ctx.connection.as_mut() else {
        error!("ACTIVE: no connection");
        return Ok(SessionState::WaitingForLink);
    };

    // 1. Inbound commands and keep-alive.
    let actuator_count = ctx.ports.actuators.channel_count();
    let actuators = &mut ctx.ports.actuators;
    let sink = &mut ctx.ports.sink;
    let stats = &mut ctx.stats;
    let mut on_message = |topic: &str, payload: &[u8]| {
        let cmd = commands::parse(topic, payload, actuator_count);
        match actuators.set_output(cmd.index, cmd.duty) {
            Ok(()) => {
                stats.commands_applied += 1;
                sink.emit(&AppEvent::CommandApplied(cmd));
            }
            Err(e) => warn!("ACTIVE: command {} on '{}' not applied: {}", cmd, topic, e),
        }
    };
    conn.service(ctx.config.service_wait_ms(), &mut on_message)
        .map_err(SessionError::Service)?;

    // 2. Sample with retry; publish only on success.
    match ctx.sampler.sample(&mut ctx.ports.sensor, &mut ctx.ports.delay) {
        SampleOutcome::Reading(reading) => {
            ctx.telemetry
                .publish(conn, &reading)
                .map_err(SessionError::Publish)?;
            ctx.stats.telemetry_published += 1;
            ctx.ports.sink.emit(&AppEvent::TelemetryPublished(reading));
        }
        SampleOutcome::Exhausted { attempts } => {
            warn!("ACTIVE: sensor failed {} attempts, skipping publish", attempts);
            ctx.stats.cycles_skipped += 1;
            ctx.ports.sink.emit(&AppEvent::SampleSkipped { attempts });
        }
    }

    // 3. Pace the cycle.
    ctx.ports.delay.delay_ms(ctx.config.publish_interval_ms);
    Ok(SessionState::Active)
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTING: the single cleanup path
// ═══════════════════════════════════════════════════════════════════════════

fn disconnecting_step<P: SessionPorts>(
    ctx: &mut SessionContext<P>,
) -> Result<SessionState, SessionError> {
    if let Some(mut conn) = ctx.connection.take() {
        if ctx.established {
            if let Err(e) = conn.disconnect() {
                debug!("DISCONNECTING: DISCONNECT not sent: {}", e);
            }
        }
        conn.close();
    }
    ctx.established = false;
    ctx.backoff_pending = true;

    match ctx.failure.take() {
        Some(reason) => warn!("DISCONNECTING: session closed after {}", reason),
        None => info!("DISCONNECTING: session closed"),
    }
    let stats = ctx.stats;
    info!(
        "DISCONNECTING: opened={} failed={} published={} skipped={} commands={}",
        stats.sessions_opened,
        stats.session_failures,
        stats.telemetry_published,
        stats.cycles_skipped,
        stats.commands_applied
    );
    ctx.ports.sink.emit(&AppEvent::SessionClosed(stats));
    Ok(SessionState::WaitingForLink)
}
