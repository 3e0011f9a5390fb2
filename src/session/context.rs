//! Mutable context threaded through every session step.
//!
//! `SessionContext` owns the collaborators, the read-only configuration and
//! the one connection a session may hold.  Step functions borrow disjoint
//! fields of it; nothing in here is shared with another task.

use super::sampler::SensorSampler;
use super::telemetry::TelemetryPublisher;
use super::{ConnectionOf, SessionPorts, SessionStats};
use crate::config::NodeConfig;
use crate::error::SessionError;

/// The collaborator instances a session drives.
pub struct Ports<P: SessionPorts> {
    pub link: P::Link,
    pub broker: P::Broker,
    pub sensor: P::Sensor,
    pub actuators: P::Actuators,
    pub delay: P::Delay,
    pub sink: P::Sink,
}

pub struct SessionContext<P: SessionPorts> {
    pub config: NodeConfig,
    pub ports: Ports<P>,

    /// The live connection.  `Some` only between a successful `Connecting`
    /// step and the end of `Disconnecting`.
    pub connection: Option<ConnectionOf<P>>,
    /// CONNACK accepted on the current connection (DISCONNECT is only sent
    /// when this is set).
    pub established: bool,
    /// Reason the current session is being torn down.
    pub failure: Option<SessionError>,
    /// Sleep `reconnect_delay_ms` before the next link check.
    pub backoff_pending: bool,

    pub sampler: SensorSampler,
    pub telemetry: TelemetryPublisher,
    pub stats: SessionStats,
}

impl<P: SessionPorts> SessionContext<P> {
    pub fn new(config: NodeConfig, ports: Ports<P>) -> Self {
        let sampler = SensorSampler::new(config.sensor_max_attempts, config.sensor_retry_delay_ms);
        let telemetry = TelemetryPublisher::new(&config.telemetry_topic);
        Self {
            config,
            ports,
            connection: None,
            established: false,
            failure: None,
            backoff_pending: false,
            sampler,
            telemetry,
            stats: SessionStats::default(),
        }
    }
}
