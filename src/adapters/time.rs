//! Blocking delay adapter.
//!
//! The session and auxiliary loops run on their own FreeRTOS tasks, so a
//! millisecond-scale wait simply parks the calling thread.
//!
//! - **`target_os = "espidf"`**: `std::thread::sleep` maps onto `vTaskDelay`,
//!   which yields the core to other tasks.
//! - **host**: plain `std::thread::sleep`.
//!
//! Sub-millisecond bit timing (DHT22) uses the HAL's busy-wait `Ets` delay
//! instead.

use core::time::Duration;

use embedded_hal::delay::DelayNs;

/// Thread-parking [`DelayNs`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl StdDelay {
    pub fn new() -> Self {
        Self
    }
}

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
