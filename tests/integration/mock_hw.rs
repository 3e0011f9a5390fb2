//! Mock platform for integration tests.
//!
//! Every mock shares one [`World`] so a test can script link, broker and
//! sensor behaviour up front and then assert on the full history of what
//! the session did: connections opened and closed, messages published,
//! actuator writes, sleeps and emitted events.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use envnode::app::events::AppEvent;
use envnode::app::ports::{
    ActuatorPort, BrokerConnection, BrokerConnector, BusExpanderPort, ConnectOptions, EventSink, LinkPort, SensorPort,
};
use envnode::config::NodeConfig;
use envnode::error::{ActuatorError, BusError, ProtocolError, SensorError, TransportError};
use envnode::sensors::Reading;
use envnode::session::{Ports, SessionContext, SessionManager, SessionPorts};

pub const CHANNELS: usize = 2;

/// Recorded side effects plus scripted responses.  Empty scripts mean
/// "succeed" (and, for the sensor, a nominal reading).
#[derive(Default)]
pub struct World {
    // ── link ──
    pub link_ready: bool,
    /// Bring the link up on this poll count.
    pub ready_after_polls: Option<u32>,
    pub link_polls: u32,

    // ── broker ──
    pub open_results: VecDeque<Result<(), TransportError>>,
    pub handshake_results: VecDeque<Result<(), ProtocolError>>,
    pub subscribe_results: VecDeque<Result<(), ProtocolError>>,
    /// One batch of (topic, payload) per `service` call.
    pub inbound: VecDeque<Vec<(String, Vec<u8>)>>,
    pub service_results: VecDeque<Result<(), ProtocolError>>,
    pub publish_results: VecDeque<Result<(), ProtocolError>>,

    pub opens: u32,
    pub closes: u32,
    pub live: u32,
    pub opened_while_live: bool,
    pub disconnects_sent: u32,
    pub last_client_id: Option<String>,
    pub subscriptions: Vec<String>,
    pub service_waits: Vec<u32>,
    pub published: Vec<(String, Vec<u8>)>,

    // ── sensor ──
    pub sensor_script: VecDeque<Result<Reading, SensorError>>,
    pub sensor_reads: u32,

    // ── actuators / bus ──
    pub actuator_writes: Vec<(usize, u8)>,
    pub bus_writes: Vec<u8>,
    pub bus_fail: bool,

    // ── timing / events ──
    pub sleeps_ms: Vec<u32>,
    pub events: Vec<AppEvent>,
}

pub type Shared = Rc<RefCell<World>>;

#[allow(dead_code)]
impl World {
    pub fn published_payloads(&self) -> Vec<String> {
        self.published
            .iter()
            .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }

    pub fn fail_sensor(&mut self, times: usize) {
        for _ in 0..times {
            self.sensor_script.push_back(Err(SensorError::Checksum));
        }
    }
}

// ── Link ──────────────────────────────────────────────────────

pub struct MockLink(pub Shared);

impl LinkPort for MockLink {
    fn is_ready(&self) -> bool {
        self.0.borrow().link_ready
    }

    fn poll(&mut self) {
        let mut w = self.0.borrow_mut();
        w.link_polls += 1;
        if w.ready_after_polls.is_some_and(|n| w.link_polls >= n) {
            w.link_ready = true;
        }
    }
}

// ── Broker ────────────────────────────────────────────────────

pub struct MockBroker(pub Shared);

impl BrokerConnector for MockBroker {
    type Connection = MockConnection;

    fn open(&mut self, _host: &str, _port: u16) -> Result<MockConnection, TransportError> {
        let mut w = self.0.borrow_mut();
        if w.live > 0 {
            w.opened_while_live = true;
        }
        w.open_results.pop_front().unwrap_or(Ok(()))?;
        w.opens += 1;
        w.live += 1;
        Ok(MockConnection(self.0.clone()))
    }
}

pub struct MockConnection(Shared);

impl BrokerConnection for MockConnection {
    fn handshake(&mut self, options: &ConnectOptions<'_>, _timeout_ms: u32) -> Result<(), ProtocolError> {
        let mut w = self.0.borrow_mut();
        w.last_client_id = Some(options.client_id.to_string());
        w.handshake_results.pop_front().unwrap_or(Ok(()))
    }

    fn subscribe(&mut self, filter: &str, _timeout_ms: u32) -> Result<(), ProtocolError> {
        let mut w = self.0.borrow_mut();
        w.subscriptions.push(filter.to_string());
        w.subscribe_results.pop_front().unwrap_or(Ok(()))
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ProtocolError> {
        let mut w = self.0.borrow_mut();
        w.publish_results.pop_front().unwrap_or(Ok(()))?;
        w.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn service(&mut self, wait_ms: u32, on_message: &mut dyn FnMut(&str, &[u8])) -> Result<(), ProtocolError> {
        // Release the borrow before the callback touches the actuators.
        let (batch, result) = {
            let mut w = self.0.borrow_mut();
            w.service_waits.push(wait_ms);
            let batch = w.inbound.pop_front().unwrap_or_default();
            let result = w.service_results.pop_front().unwrap_or(Ok(()));
            (batch, result)
        };
        for (topic, payload) in &batch {
            on_message(topic, payload);
        }
        result
    }

    fn disconnect(&mut self) -> Result<(), ProtocolError> {
        self.0.borrow_mut().disconnects_sent += 1;
        Ok(())
    }

    fn close(self) {
        let mut w = self.0.borrow_mut();
        w.closes += 1;
        w.live -= 1;
    }
}

// ── Sensor ────────────────────────────────────────────────────

pub struct MockSensor(pub Shared);

impl SensorPort for MockSensor {
    fn read(&mut self) -> Result<Reading, SensorError> {
        let mut w = self.0.borrow_mut();
        w.sensor_reads += 1;
        w.sensor_script
            .pop_front()
            .unwrap_or(Ok(Reading::new(23.4, 41.0)))
    }
}

// ── Actuators ─────────────────────────────────────────────────

pub struct MockActuators(pub Shared);

impl ActuatorPort for MockActuators {
    fn channel_count(&self) -> usize {
        CHANNELS
    }

    fn set_output(&mut self, channel: usize, percent: u8) -> Result<(), ActuatorError> {
        if channel >= CHANNELS {
            return Err(ActuatorError::InvalidChannel);
        }
        self.0.borrow_mut().actuator_writes.push((channel, percent));
        Ok(())
    }
}

// ── Bus expander ──────────────────────────────────────────────

pub struct MockExpander(pub Shared);

impl BusExpanderPort for MockExpander {
    fn write_outputs(&mut self, value: u8) -> Result<(), BusError> {
        let mut w = self.0.borrow_mut();
        if w.bus_fail {
            return Err(BusError::Nack);
        }
        w.bus_writes.push(value);
        Ok(())
    }
}

// ── Delay ─────────────────────────────────────────────────────

pub struct RecordingDelay(pub Shared);

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().sleeps_ms.push(ms);
    }
}

// ── Event sink ────────────────────────────────────────────────

pub struct RecordingSink(pub Shared);

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.0.borrow_mut().events.push(event.clone());
    }
}

// ── Platform ──────────────────────────────────────────────────

pub struct MockPlatform;

impl SessionPorts for MockPlatform {
    type Link = MockLink;
    type Broker = MockBroker;
    type Sensor = MockSensor;
    type Actuators = MockActuators;
    type Delay = RecordingDelay;
    type Sink = RecordingSink;
}

pub fn test_config() -> NodeConfig {
    NodeConfig {
        client_id: "envnode-test".try_into().unwrap(),
        ..NodeConfig::default()
    }
}

/// A started session over a fresh world whose link is already up.
pub fn harness() -> (SessionManager<MockPlatform>, Shared) {
    harness_with(test_config())
}

pub fn harness_with(config: NodeConfig) -> (SessionManager<MockPlatform>, Shared) {
    let world: Shared = Rc::new(RefCell::new(World {
        link_ready: true,
        ..World::default()
    }));
    let ports = Ports::<MockPlatform> {
        link: MockLink(world.clone()),
        broker: MockBroker(world.clone()),
        sensor: MockSensor(world.clone()),
        actuators: MockActuators(world.clone()),
        delay: RecordingDelay(world.clone()),
        sink: RecordingSink(world.clone()),
    };
    let mut session = SessionManager::new(SessionContext::new(config, ports));
    session.start();
    (session, world)
}
