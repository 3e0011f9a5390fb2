//! GPIO / peripheral pin assignments for the EnvNode board (ESP32-DevKitC).
//!
//! Single source of truth. The runtime config carries the actuator GPIO
//! list so a board variant can remap outputs without a rebuild. The
//! constants here seed its defaults and wire the fixed peripherals in
//! `main`.

// ---------------------------------------------------------------------------
// PWM actuators (LEDC)
// ---------------------------------------------------------------------------

/// Default actuator outputs. Command index N drives entry N.
pub const ACTUATOR_GPIOS: [i32; 2] = [16, 17];
/// Upper bound on actuator channels (LEDC low-speed mode has 8).
pub const MAX_ACTUATORS: usize = 8;
/// LEDC timer resolution. 10 bits gives duty 0..=1023.
pub const PWM_RESOLUTION_BITS: u32 = 10;
/// LEDC carrier frequency.
pub const PWM_FREQUENCY_HZ: u32 = 1_000;

// ---------------------------------------------------------------------------
// DHT22 temperature / humidity sensor
// ---------------------------------------------------------------------------

/// Single-wire data line, open-drain with external 10 kΩ pull-up.
pub const DHT22_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// I2C bus (MCP23017 port expander)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
/// Standard-mode bus clock.
pub const I2C_FREQUENCY_HZ: u32 = 100_000;
/// MCP23017 with A2..A0 tied low.
pub const MCP23017_ADDRESS: u8 = 0x20;
