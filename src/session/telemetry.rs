//! Telemetry payload formatting and publication.
//!
//! Wire format is compact JSON with one decimal per value:
//!
//! ```text
//! {"temperature":23.4,"humidity":41.0}
//! ```

use log::{debug, warn};
use serde::Serialize;

use crate::app::ports::BrokerConnection;
use crate::error::ProtocolError;
use crate::sensors::Reading;

#[derive(Serialize)]
struct TelemetryPayload {
    temperature: f64,
    humidity: f64,
}

/// Round to one decimal place; never emits `-0.0`.
fn one_decimal(value: f32) -> f64 {
    let rounded = (f64::from(value) * 10.0).round() / 10.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Serialise a reading into the telemetry payload.
pub fn encode_payload(reading: &Reading) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&TelemetryPayload {
        temperature: one_decimal(reading.temperature_c),
        humidity: one_decimal(reading.humidity_pct),
    })
}

#[derive(Debug, Clone)]
pub struct TelemetryPublisher {
    topic: heapless::String<64>,
}

impl TelemetryPublisher {
    pub fn new(topic: &str) -> Self {
        let mut t = heapless::String::new();
        if t.push_str(topic).is_err() {
            warn!("Telemetry: topic '{}' too long, truncating", topic);
            for ch in topic.chars() {
                if t.push(ch).is_err() {
                    break;
                }
            }
        }
        Self { topic: t }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Emit one reading as a QoS 0 message.  An encoding or transport
    /// failure is returned to the caller and is fatal to the session.
    pub fn publish<C: BrokerConnection>(&self, conn: &mut C, reading: &Reading) -> Result<(), ProtocolError> {
        let payload =
            encode_payload(reading).inspect_err(|e| warn!("Telemetry: payload encoding failed: {}", e))?;
        debug!("Telemetry: {} <- {}", self.topic, String::from_utf8_lossy(&payload));
        conn.publish(&self.topic, &payload)
    }
}
