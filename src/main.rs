//! envnode firmware: main entry point.
//!
//! Wires concrete ESP32 peripherals into the two long-running loops:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  WifiAdapter   MqttConnector<Tcp>   Dht22      PwmBank<Ledc> │
//! │  (LinkPort)    (BrokerConnector)    (Sensor)   (Actuators)   │
//! │  LogEventSink  NvsAdapter           Mcp23017<I2cDriver>      │
//! │                                                              │
//! │  ───────────────── Port Trait Boundary ─────────────────     │
//! │                                                              │
//! │   session task (core 0)          aux task (core 1)           │
//! │   SessionManager (table FSM)     AuxLoop (I²C counter)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};

use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, IOPin, InputOutput, PinDriver};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::ledc::{LedcChannel, LedcDriver, LedcTimerDriver, LowSpeed, Resolution, config::TimerConfig};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::prelude::*;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use envnode::adapters::device_id;
use envnode::adapters::log_sink::LogEventSink;
use envnode::adapters::mqtt::MqttConnector;
use envnode::adapters::nvs::{NvsAdapter, validate_config};
use envnode::adapters::tcp_transport::TcpConnector;
use envnode::adapters::time::StdDelay;
use envnode::adapters::wifi::WifiAdapter;
use envnode::app::ports::{ConfigError, ConfigPort};
use envnode::aux_loop::AuxLoop;
use envnode::config::NodeConfig;
use envnode::drivers::mcp23017::Mcp23017;
use envnode::drivers::pwm::PwmBank;
use envnode::drivers::task_pin::{AUX_TASK, SESSION_TASK, spawn_on_core};
use envnode::pins;
use envnode::sensors::dht22::Dht22;
use envnode::session::{Ports, SessionContext, SessionManager, SessionPorts};

// ── Platform bundle ───────────────────────────────────────────

struct DevicePorts;

impl SessionPorts for DevicePorts {
    type Link = WifiAdapter;
    type Broker = MqttConnector<TcpConnector>;
    type Sensor = Dht22<PinDriver<'static, AnyIOPin, InputOutput>, Ets>;
    type Actuators = PwmBank<LedcDriver<'static>>;
    type Delay = StdDelay;
    type Sink = LogEventSink;
}

// ── Boot helpers ──────────────────────────────────────────────

fn load_config(nvs: &NvsAdapter) -> NodeConfig {
    let mut config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(ConfigError::NotFound) => {
            info!("No stored config, using build-time defaults");
            NodeConfig::default()
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            NodeConfig::default()
        }
    };
    if let Err(e) = validate_config(&config) {
        warn!("Build-time config invalid ({}), check ENVNODE_* variables", e);
    }
    if config.client_id.is_empty() {
        config.client_id = device_id::client_id(&device_id::read_mac());
    }
    config
}

fn attach_channel<C>(
    channel: impl Peripheral<P = C> + 'static,
    timer: &LedcTimerDriver<'static, LowSpeed>,
    gpio: i32,
) -> Result<LedcDriver<'static>>
where
    C: LedcChannel<SpeedMode = LowSpeed>,
{
    // SAFETY: each configured GPIO is claimed by exactly one channel and by
    // nothing else in this firmware.
    let pin = unsafe { AnyOutputPin::new(gpio) };
    LedcDriver::new(channel, timer, pin).with_context(|| format!("LEDC channel on GPIO{gpio}"))
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  envnode v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let config = match NvsAdapter::new() {
        Ok(nvs) => load_config(&nvs),
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults", e);
            let mut cfg = NodeConfig::default();
            cfg.client_id = device_id::client_id(&device_id::read_mac());
            cfg
        }
    };
    info!(
        "Node '{}' -> {}:{} cmd='{}' telemetry='{}'",
        config.client_id, config.broker_host, config.broker_port, config.command_topic, config.telemetry_topic
    );

    // ── 3. WiFi link ──────────────────────────────────────────
    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?,
        sysloop,
    )?;
    let mut link = WifiAdapter::with_driver(wifi);
    if let Err(e) = link.set_credentials(&config.wifi_ssid, &config.wifi_password) {
        error!("WiFi credentials rejected: {} (link will stay down)", e);
    }

    // ── 4. PWM actuators (LEDC, 10-bit) ───────────────────────
    let ledc = peripherals.ledc;
    // The channels use the timer for the life of the firmware.
    let timer: &'static LedcTimerDriver<'static, LowSpeed> = Box::leak(Box::new(LedcTimerDriver::new(
        ledc.timer0,
        &TimerConfig::new()
            .frequency(config.pwm_frequency_hz.Hz())
            .resolution(Resolution::Bits10),
    )?));
    let gpios = &config.actuator_pins;
    let mut channels = Vec::with_capacity(gpios.len());
    if let Some(&g) = gpios.first() {
        channels.push(attach_channel(ledc.channel0, timer, g)?);
    }
    if let Some(&g) = gpios.get(1) {
        channels.push(attach_channel(ledc.channel1, timer, g)?);
    }
    if let Some(&g) = gpios.get(2) {
        channels.push(attach_channel(ledc.channel2, timer, g)?);
    }
    if let Some(&g) = gpios.get(3) {
        channels.push(attach_channel(ledc.channel3, timer, g)?);
    }
    if let Some(&g) = gpios.get(4) {
        channels.push(attach_channel(ledc.channel4, timer, g)?);
    }
    if let Some(&g) = gpios.get(5) {
        channels.push(attach_channel(ledc.channel5, timer, g)?);
    }
    if let Some(&g) = gpios.get(6) {
        channels.push(attach_channel(ledc.channel6, timer, g)?);
    }
    if let Some(&g) = gpios.get(7) {
        channels.push(attach_channel(ledc.channel7, timer, g)?);
    }
    let mut actuators = PwmBank::new(channels);
    if let Err(e) = actuators.all_off() {
        warn!("PWM: initial all-off failed: {}", e);
    }

    // ── 5. DHT22 on an open-drain line ────────────────────────
    let dht_pin = PinDriver::input_output_od(peripherals.pins.gpio4.downgrade())?;
    let sensor = Dht22::new(dht_pin, Ets);

    // ── 6. MCP23017 on I²C0 ───────────────────────────────────
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &I2cConfig::new().baudrate(pins::I2C_FREQUENCY_HZ.Hz()),
    )?;
    let mut expander = Mcp23017::new(i2c, config.expander_address);
    if let Err(e) = expander.init() {
        warn!("MCP23017 @0x{:02X} init failed: {} (writes will be retried)", config.expander_address, e);
    }

    // ── 7. Spawn the two loops ────────────────────────────────
    let aux = AuxLoop::new(expander, StdDelay::new(), config.aux_interval_ms);
    let aux_task = spawn_on_core(AUX_TASK, move || aux.run()).context("spawn aux task")?;

    let ports = Ports::<DevicePorts> {
        link,
        broker: MqttConnector::new(TcpConnector::new(Duration::from_millis(u64::from(
            config.command_timeout_ms,
        )))),
        sensor,
        actuators,
        delay: StdDelay::new(),
        sink: LogEventSink::new(),
    };
    let mut session = SessionManager::new(SessionContext::new(config, ports));
    let session_task = spawn_on_core(SESSION_TASK, move || session.run()).context("spawn session task")?;

    info!("System ready.");

    // Neither loop returns; a join only completes if a task panicked.
    session_task.join().map_err(|_| anyhow!("session task panicked"))?;
    aux_task.join().map_err(|_| anyhow!("aux task panicked"))?;
    Ok(())
}
