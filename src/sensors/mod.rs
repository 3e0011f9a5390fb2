//! Sensor subsystem: the DHT22 driver and the [`Reading`] it produces.
//!
//! The session loop only ever sees a [`Reading`] through
//! [`SensorPort`](crate::app::ports::SensorPort); retry policy lives in
//! [`session::sampler`](crate::session::sampler), not in the driver.

pub mod dht22;

/// DHT22 rated measurement range.
pub const TEMPERATURE_RANGE_C: core::ops::RangeInclusive<f32> = -40.0..=80.0;
pub const HUMIDITY_RANGE_PCT: core::ops::RangeInclusive<f32> = 0.0..=100.0;

/// One temperature / relative-humidity measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

impl Reading {
    pub fn new(temperature_c: f32, humidity_pct: f32) -> Self {
        Self { temperature_c, humidity_pct }
    }

    /// True when both values are finite and inside the sensor's rated range.
    pub fn is_valid(&self) -> bool {
        TEMPERATURE_RANGE_C.contains(&self.temperature_c)
            && HUMIDITY_RANGE_PCT.contains(&self.humidity_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typical_indoor_reading_is_valid() {
        assert!(Reading::new(23.4, 41.0).is_valid());
    }

    #[test]
    fn out_of_range_or_nan_is_invalid() {
        assert!(!Reading::new(120.0, 50.0).is_valid());
        assert!(!Reading::new(20.0, 101.0).is_valid());
        assert!(!Reading::new(f32::NAN, 50.0).is_valid());
        assert!(!Reading::new(20.0, f32::INFINITY).is_valid());
    }
}
