//! Peripheral drivers and task placement helpers.

pub mod mcp23017;
pub mod pwm;
pub mod task_pin;
