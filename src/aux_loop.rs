//! Auxiliary bus loop.
//!
//! Independent of the session: every tick writes an 8-bit counter to the
//! expander's output port and then increments it, wrapping 255 → 0.  Bus
//! errors are dropped; the counter advances either way.

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use crate::app::ports::BusExpanderPort;

pub struct AuxLoop<E, D> {
    expander: E,
    delay: D,
    interval_ms: u32,
    counter: u8,
    write_failures: u32,
}

impl<E: BusExpanderPort, D: DelayNs> AuxLoop<E, D> {
    pub fn new(expander: E, delay: D, interval_ms: u32) -> Self {
        Self {
            expander,
            delay,
            interval_ms,
            counter: 0,
            write_failures: 0,
        }
    }

    /// Value the next tick will write.
    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn write_failures(&self) -> u32 {
        self.write_failures
    }

    /// One write-then-increment step, without the sleep.
    pub fn tick(&mut self) {
        if let Err(e) = self.expander.write_outputs(self.counter) {
            self.write_failures = self.write_failures.saturating_add(1);
            debug!("Aux: write {} failed: {}", self.counter, e);
        }
        self.counter = self.counter.wrapping_add(1);
    }

    pub fn run(mut self) -> ! {
        info!("Aux: counter loop every {} ms", self.interval_ms);
        loop {
            self.tick();
            self.delay.delay_ms(self.interval_ms);
        }
    }
}
