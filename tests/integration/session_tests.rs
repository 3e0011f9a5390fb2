//! Integration tests for the session state machine against the mock platform.
//!
//! Each test scripts the world, drives `SessionManager::step()` by hand and
//! asserts on the recorded side effects.

use crate::mock_hw::{harness, MockPlatform, Shared};

use envnode::app::events::AppEvent;
use envnode::error::{ProtocolError, SessionError, TransportError};
use envnode::session::{states, SessionManager, SessionState};

const TELEMETRY: &str = r#"{"temperature":23.4,"humidity":41.0}"#;

/// Step from `WaitingForLink` to `Active` on a healthy broker.
fn activate(session: &mut SessionManager<MockPlatform>) {
    assert_eq!(session.step(), SessionState::Connecting);
    assert_eq!(session.step(), SessionState::HandshakeAuth);
    assert_eq!(session.step(), SessionState::Subscribing);
    assert_eq!(session.step(), SessionState::Active);
}

fn deliver(world: &Shared, msgs: &[(&str, &str)]) {
    world.borrow_mut().inbound.push_back(
        msgs.iter()
            .map(|(t, p)| (t.to_string(), p.as_bytes().to_vec()))
            .collect(),
    );
}

// ── Bring-up ──────────────────────────────────────────────────

#[test]
fn state_table_rows_match_their_index() {
    let table = states::build_state_table::<MockPlatform>();
    for (i, row) in table.iter().enumerate() {
        assert_eq!(row.id, SessionState::from_index(i));
        assert_eq!(row.name, format!("{:?}", row.id));
    }
}

#[test]
fn reaches_active_and_subscribes_to_command_pattern() {
    let (mut session, world) = harness();
    assert_eq!(session.state(), SessionState::WaitingForLink);
    assert!(!session.has_connection());

    activate(&mut session);

    let w = world.borrow();
    assert!(session.has_connection());
    assert_eq!(w.opens, 1);
    assert_eq!(w.subscriptions, vec!["envnode/pwm/#".to_string()]);
    assert_eq!(w.last_client_id.as_deref(), Some("envnode-test"));
    assert_eq!(session.stats().sessions_opened, 1);
    assert!(matches!(w.events[0], AppEvent::Started(SessionState::WaitingForLink)));
    assert!(matches!(
        w.events[1],
        AppEvent::StateChanged {
            from: SessionState::WaitingForLink,
            to: SessionState::Connecting
        }
    ));
}

#[test]
fn waits_for_link_at_poll_interval() {
    let (mut session, world) = harness();
    {
        let mut w = world.borrow_mut();
        w.link_ready = false;
        w.ready_after_polls = Some(3);
    }
    assert_eq!(session.step(), SessionState::Connecting);
    let w = world.borrow();
    assert_eq!(w.link_polls, 3);
    assert_eq!(w.sleeps_ms, vec![500, 500]);
    assert_eq!(w.opens, 0);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn command_sets_selected_channel() {
    let (mut session, world) = harness();
    activate(&mut session);
    deliver(&world, &[("ns/1", "55")]);

    assert_eq!(session.step(), SessionState::Active);
    assert_eq!(world.borrow().actuator_writes, vec![(1, 55)]);
    assert_eq!(session.stats().commands_applied, 1);
}

#[test]
fn out_of_range_command_is_clamped() {
    let (mut session, world) = harness();
    activate(&mut session);
    deliver(&world, &[("ns/9", "200")]);

    session.step();
    assert_eq!(world.borrow().actuator_writes, vec![(1, 100)]);
}

#[test]
fn garbage_command_turns_channel_off() {
    let (mut session, world) = harness();
    activate(&mut session);
    deliver(&world, &[("ns/x", "abc"), ("ns/1", "-5")]);

    session.step();
    assert_eq!(world.borrow().actuator_writes, vec![(0, 0), (1, 0)]);
    assert_eq!(session.state(), SessionState::Active);
}

#[test]
fn commands_apply_in_arrival_order() {
    let (mut session, world) = harness();
    activate(&mut session);
    deliver(&world, &[("ns/0", "10"), ("ns/1", "20"), ("ns/0", "30")]);

    session.step();
    assert_eq!(world.borrow().actuator_writes, vec![(0, 10), (1, 20), (0, 30)]);
}

// ── Telemetry cycle ───────────────────────────────────────────

#[test]
fn active_cycle_services_samples_publishes_and_sleeps() {
    let (mut session, world) = harness();
    activate(&mut session);
    session.step();

    let w = world.borrow();
    // keep-alive 5 s + 1 s
    assert_eq!(w.service_waits, vec![6_000]);
    assert_eq!(w.published, vec![("envnode/weather".to_string(), TELEMETRY.as_bytes().to_vec())]);
    assert_eq!(w.sleeps_ms, vec![3_000]);
    assert_eq!(session.stats().telemetry_published, 1);
}

#[test]
fn sensor_retries_then_publishes() {
    let (mut session, world) = harness();
    activate(&mut session);
    world.borrow_mut().fail_sensor(4);

    assert_eq!(session.step(), SessionState::Active);
    let w = world.borrow();
    assert_eq!(w.sensor_reads, 5);
    assert_eq!(w.sleeps_ms, vec![300, 300, 300, 300, 3_000]);
    assert_eq!(w.published_payloads(), vec![TELEMETRY.to_string()]);
}

#[test]
fn exhausted_budget_skips_publish_and_stays_active() {
    let (mut session, world) = harness();
    activate(&mut session);
    world.borrow_mut().fail_sensor(5);

    assert_eq!(session.step(), SessionState::Active);
    let w = world.borrow();
    assert_eq!(w.sensor_reads, 5);
    assert!(w.published.is_empty());
    assert_eq!(w.sleeps_ms, vec![300, 300, 300, 300, 300, 3_000]);
    assert!(matches!(w.events.last(), Some(AppEvent::SampleSkipped { attempts: 5 })));
    drop(w);
    assert_eq!(session.stats().cycles_skipped, 1);
    assert!(session.has_connection());

    // The next cycle starts with a fresh budget.
    session.step();
    assert_eq!(world.borrow().published.len(), 1);
}

// ── Failure paths ─────────────────────────────────────────────

#[test]
fn service_failure_tears_down_through_disconnecting() {
    let (mut session, world) = harness();
    activate(&mut session);
    world
        .borrow_mut()
        .service_results
        .push_back(Err(ProtocolError::KeepAliveExpired));

    assert_eq!(session.step(), SessionState::Disconnecting);
    assert!(session.has_connection());
    assert_eq!(session.step(), SessionState::WaitingForLink);
    assert!(!session.has_connection());

    let w = world.borrow();
    assert_eq!(w.closes, 1);
    assert_eq!(w.live, 0);
    assert_eq!(w.disconnects_sent, 1);
    assert!(w.published.is_empty());
    assert!(w.events.iter().any(|e| matches!(
        e,
        AppEvent::SessionFailed(SessionError::Service(ProtocolError::KeepAliveExpired))
    )));
    assert!(matches!(w.events.last(), Some(AppEvent::StateChanged { to: SessionState::WaitingForLink, .. })));
    drop(w);
    assert_eq!(session.stats().session_failures, 1);
}

#[test]
fn reconnect_waits_backoff_then_opens_fresh_connection() {
    let (mut session, world) = harness();
    activate(&mut session);
    world
        .borrow_mut()
        .service_results
        .push_back(Err(ProtocolError::Transport(TransportError::Closed)));
    session.step();
    session.step();
    world.borrow_mut().sleeps_ms.clear();

    activate(&mut session);
    let w = world.borrow();
    assert_eq!(w.sleeps_ms, vec![1_000]);
    assert_eq!(w.opens, 2);
    assert!(!w.opened_while_live);
    drop(w);
    assert_eq!(session.stats().sessions_opened, 2);
}

#[test]
fn handshake_refusal_releases_without_disconnect_packet() {
    let (mut session, world) = harness();
    world
        .borrow_mut()
        .handshake_results
        .push_back(Err(ProtocolError::Refused(5)));

    assert_eq!(session.step(), SessionState::Connecting);
    assert_eq!(session.step(), SessionState::HandshakeAuth);
    assert_eq!(session.step(), SessionState::Disconnecting);
    assert_eq!(session.step(), SessionState::WaitingForLink);

    let w = world.borrow();
    assert_eq!(w.closes, 1);
    assert_eq!(w.disconnects_sent, 0);
    assert!(w.subscriptions.is_empty());
}

#[test]
fn subscribe_rejection_sends_disconnect() {
    let (mut session, world) = harness();
    world
        .borrow_mut()
        .subscribe_results
        .push_back(Err(ProtocolError::SubscribeRejected));

    for _ in 0..3 {
        session.step();
    }
    assert_eq!(session.step(), SessionState::Disconnecting);
    session.step();
    let w = world.borrow();
    assert_eq!(w.disconnects_sent, 1);
    assert_eq!(w.closes, 1);
    drop(w);
    assert_eq!(session.stats().sessions_opened, 0);
}

#[test]
fn connect_failure_returns_to_waiting_without_connection() {
    let (mut session, world) = harness();
    world
        .borrow_mut()
        .open_results
        .push_back(Err(TransportError::Connect));

    assert_eq!(session.step(), SessionState::Connecting);
    assert_eq!(session.step(), SessionState::WaitingForLink);
    assert!(!session.has_connection());
    {
        let w = world.borrow();
        assert_eq!(w.opens, 0);
        assert_eq!(w.closes, 0);
        assert!(w.events.iter().any(|e| matches!(
            e,
            AppEvent::SessionFailed(SessionError::Connect(TransportError::Connect))
        )));
    }

    // Backoff applies before the next attempt.
    assert_eq!(session.step(), SessionState::Connecting);
    assert_eq!(world.borrow().sleeps_ms, vec![1_000]);
}

#[test]
fn publish_failure_is_session_fatal() {
    let (mut session, world) = harness();
    activate(&mut session);
    world
        .borrow_mut()
        .publish_results
        .push_back(Err(ProtocolError::Transport(TransportError::Io)));

    assert_eq!(session.step(), SessionState::Disconnecting);
    // No pacing sleep once the cycle failed.
    assert!(world.borrow().sleeps_ms.is_empty());
}

#[test]
fn never_holds_two_connections() {
    let (mut session, world) = harness();
    {
        let mut w = world.borrow_mut();
        for i in 0..60 {
            w.service_results.push_back(if i % 3 == 2 {
                Err(ProtocolError::Timeout)
            } else {
                Ok(())
            });
            if i % 7 == 0 {
                w.open_results.push_back(Err(TransportError::Timeout));
            }
            if i % 5 == 0 {
                w.handshake_results.push_back(Err(ProtocolError::Refused(3)));
            }
        }
    }

    for _ in 0..400 {
        session.step();
        let w = world.borrow();
        assert!(w.live <= 1);
        assert_eq!(session.has_connection(), w.live == 1);
        assert!(!w.opened_while_live);
    }
    let w = world.borrow();
    assert_eq!(w.opens - w.closes, w.live);
    assert!(w.opens > 5);
}
