//! Application core: domain types and the port boundary.
//!
//! Command parsing and the structured events the session loop emits live
//! here. All interaction with hardware and the network happens through
//! **port traits** defined in [`ports`], keeping the session logic fully
//! testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
