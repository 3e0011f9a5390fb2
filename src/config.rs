//! Node configuration parameters
//!
//! Every tunable of the session loop, the sensor sampler and the auxiliary
//! bus task.  Defaults are fixed at build time (optionally overridden with
//! `ENVNODE_*` environment variables when compiling) and can be replaced at
//! runtime by a config blob stored in NVS.

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::pins;

/// Longest client identifier MQTT 3.1.1 brokers are required to accept.
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Wi-Fi ---
    pub wifi_ssid: String<32>,
    pub wifi_password: String<64>,

    // --- Broker ---
    pub broker_host: String<64>,
    pub broker_port: u16,
    /// Empty means "derive from the factory MAC" (see `adapters::device_id`).
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    pub username: String<32>,
    pub password: String<64>,
    /// Subscription pattern for actuator commands, e.g. `envnode/pwm/#`.
    pub command_topic: String<64>,
    /// Fixed topic telemetry is published to.
    pub telemetry_topic: String<64>,

    // --- Session timing ---
    /// Keep-alive advertised in CONNECT (seconds)
    pub keep_alive_secs: u16,
    /// Wait for CONNACK / SUBACK (milliseconds)
    pub command_timeout_ms: u32,
    /// Pause between telemetry cycles (milliseconds)
    pub publish_interval_ms: u32,
    /// How often WaitingForLink re-checks the network (milliseconds)
    pub link_poll_interval_ms: u32,
    /// Pause before reconnecting after a failed or torn-down session (milliseconds)
    pub reconnect_delay_ms: u32,

    // --- Sensor ---
    /// Attempts per sample cycle before the cycle is skipped
    pub sensor_max_attempts: u8,
    /// Delay between failed attempts (milliseconds)
    pub sensor_retry_delay_ms: u32,

    // --- Actuators ---
    /// GPIO per actuator channel; command index N drives entry N
    pub actuator_pins: Vec<i32, { pins::MAX_ACTUATORS }>,
    pub pwm_frequency_hz: u32,

    // --- Auxiliary bus task ---
    /// Counter write period (milliseconds)
    pub aux_interval_ms: u32,
    /// 7-bit I2C address of the port expander
    pub expander_address: u8,
}

impl NodeConfig {
    /// How long the session waits inside one protocol service call (milliseconds).
    /// One second longer than keep-alive so a ping always fits.
    pub fn service_wait_ms(&self) -> u32 {
        (u32::from(self.keep_alive_secs) + 1) * 1000
    }

    /// Number of actuator channels the command parser may address.
    pub fn actuator_count(&self) -> usize {
        self.actuator_pins.len()
    }
}

/// Truncating copy into a fixed-capacity string, used for build-time defaults.
pub(crate) fn fixed<const N: usize>(value: &str) -> String<N> {
    let mut out = String::new();
    for ch in value.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut actuator_pins = Vec::new();
        for gpio in pins::ACTUATOR_GPIOS {
            // Capacity is MAX_ACTUATORS, well above the default list.
            let _ = actuator_pins.push(gpio);
        }

        Self {
            // Wi-Fi
            wifi_ssid: fixed(option_env!("ENVNODE_WIFI_SSID").unwrap_or("")),
            wifi_password: fixed(option_env!("ENVNODE_WIFI_PASSWORD").unwrap_or("")),

            // Broker
            broker_host: fixed(option_env!("ENVNODE_MQTT_HOST").unwrap_or("broker.local")),
            broker_port: 1883,
            client_id: fixed(option_env!("ENVNODE_MQTT_CLIENT_ID").unwrap_or("")),
            username: fixed(option_env!("ENVNODE_MQTT_USERNAME").unwrap_or("")),
            password: fixed(option_env!("ENVNODE_MQTT_PASSWORD").unwrap_or("")),
            command_topic: fixed("envnode/pwm/#"),
            telemetry_topic: fixed("envnode/weather"),

            // Session timing
            keep_alive_secs: 5,
            command_timeout_ms: 2_000,
            publish_interval_ms: 3_000,
            link_poll_interval_ms: 500,
            reconnect_delay_ms: 1_000,

            // Sensor
            sensor_max_attempts: 5,
            sensor_retry_delay_ms: 300,

            // Actuators
            actuator_pins,
            pwm_frequency_hz: pins::PWM_FREQUENCY_HZ,

            // Auxiliary bus task
            aux_interval_ms: 200,
            expander_address: pins::MCP23017_ADDRESS,
        }
    }
}
