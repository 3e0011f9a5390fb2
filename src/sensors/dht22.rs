//! DHT22 / AM2302 single-wire temperature and humidity sensor.
//!
//! ## Protocol
//!
//! ```text
//!  host  ▔▔▔╲____20 ms____╱▔▔ release
//!  sensor                      ╲__80 µs__╱▔▔80 µs▔▔╲ 40 × (50 µs low + 26/70 µs high)
//! ```
//!
//! Each bit is a ~50 µs low followed by a high pulse: ~26 µs means 0,
//! ~70 µs means 1.  Rather than trusting absolute timings (the polling loop
//! adds its own overhead), a bit is 1 when its high phase outlasts the low
//! phase that preceded it.
//!
//! Frame: humidity ×10 (u16 BE), temperature ×10 (sign-magnitude u16 BE),
//! checksum = low byte of the sum of the first four bytes.
//!
//! The driver is generic over embedded-hal 1.0 traits so it runs on an
//! open-drain `PinDriver` on the device and on scripted pins in tests.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use super::Reading;
use crate::app::ports::SensorPort;
use crate::error::SensorError;

pub const FRAME_LEN: usize = 5;

/// Host start pulse (the sensor needs at least 1 ms; 20 ms is the
/// conservative figure that also wakes slow AM2302 clones).
const START_PULSE_MS: u32 = 20;
/// Polling granularity while waiting for an edge.
const POLL_STEP_US: u32 = 2;

const RESPONSE_PULL_DOWN_TIMEOUT_US: u32 = 40;
const RESPONSE_PHASE_TIMEOUT_US: u32 = 88;
const BIT_LOW_TIMEOUT_US: u32 = 65;
const BIT_HIGH_TIMEOUT_US: u32 = 75;

/// Decode a raw 5-byte frame into a reading.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Result<Reading, SensorError> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(SensorError::Checksum);
    }

    let humidity_raw = u16::from_be_bytes([frame[0], frame[1]]);
    let temp_raw = u16::from_be_bytes([frame[2] & 0x7F, frame[3]]);
    let mut temperature_c = f32::from(temp_raw) / 10.0;
    if frame[2] & 0x80 != 0 {
        temperature_c = -temperature_c;
    }

    let reading = Reading::new(temperature_c, f32::from(humidity_raw) / 10.0);
    if !reading.is_valid() {
        return Err(SensorError::OutOfRange);
    }
    Ok(reading)
}

/// DHT22 on a single open-drain GPIO.
pub struct Dht22<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> Dht22<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    /// Run one start/response/data exchange and return the raw frame.
    pub fn read_frame(&mut self) -> Result<[u8; FRAME_LEN], SensorError> {
        self.pin.set_low().map_err(|_| SensorError::Gpio)?;
        self.delay.delay_ms(START_PULSE_MS);
        self.pin.set_high().map_err(|_| SensorError::Gpio)?;

        // Response: sensor pulls low ~80 µs, then high ~80 µs.
        self.await_level(false, RESPONSE_PULL_DOWN_TIMEOUT_US)
            .map_err(|_| SensorError::NoResponse)?;
        self.await_level(true, RESPONSE_PHASE_TIMEOUT_US)
            .map_err(|_| SensorError::NoResponse)?;
        self.await_level(false, RESPONSE_PHASE_TIMEOUT_US)
            .map_err(|_| SensorError::NoResponse)?;

        let mut frame = [0u8; FRAME_LEN];
        for bit in 0..FRAME_LEN * 8 {
            let low_us = self.await_level(true, BIT_LOW_TIMEOUT_US)?;
            let high_us = self.await_level(false, BIT_HIGH_TIMEOUT_US)?;
            if high_us > low_us {
                frame[bit / 8] |= 1 << (7 - bit % 8);
            }
        }
        Ok(frame)
    }

    /// Busy-wait until the line reads `high`, returning how long it took.
    fn await_level(&mut self, high: bool, timeout_us: u32) -> Result<u32, SensorError> {
        let mut elapsed = 0;
        while elapsed < timeout_us {
            self.delay.delay_us(POLL_STEP_US);
            if self.pin.is_high().map_err(|_| SensorError::Gpio)? == high {
                return Ok(elapsed);
            }
            elapsed += POLL_STEP_US;
        }
        Err(SensorError::Timeout)
    }

    /// Give back the pin and delay (used by tests and on re-init).
    pub fn release(self) -> (P, D) {
        (self.pin, self.delay)
    }
}

impl<P, D> SensorPort for Dht22<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    fn read(&mut self) -> Result<Reading, SensorError> {
        let frame = self.read_frame()?;
        decode_frame(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;
    use std::rc::Rc;

    // Virtual clock shared by the scripted pin and the delay.
    type Clock = Rc<Cell<u64>>;

    struct ClockDelay(Clock);

    impl DelayNs for ClockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.set(self.0.get() + u64::from(ns));
        }
    }

    /// Pin that replays a waveform of `(level, duration_us)` segments after
    /// the host releases the line; idles high once the script ends.
    struct ScriptedPin {
        clock: Clock,
        released_at: Option<u64>,
        script: Vec<(bool, u64)>,
    }

    impl ErrorType for ScriptedPin {
        type Error = Infallible;
    }

    impl OutputPin for ScriptedPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.released_at = None;
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.released_at = Some(self.clock.get());
            Ok(())
        }
    }

    impl InputPin for ScriptedPin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            let Some(start) = self.released_at else {
                return Ok(false);
            };
            let mut t_us = (self.clock.get() - start) / 1000;
            for &(level, dur) in &self.script {
                if t_us < dur {
                    return Ok(level);
                }
                t_us -= dur;
            }
            Ok(true)
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|h| !h)
        }
    }

    fn waveform(frame: [u8; FRAME_LEN]) -> Vec<(bool, u64)> {
        let mut w = vec![(true, 30), (false, 80), (true, 80)];
        for byte in frame {
            for i in (0..8).rev() {
                w.push((false, 50));
                w.push((true, if byte >> i & 1 == 1 { 70 } else { 26 }));
            }
        }
        w.push((false, 50));
        w
    }

    fn sensor(script: Vec<(bool, u64)>) -> Dht22<ScriptedPin, ClockDelay> {
        let clock: Clock = Rc::new(Cell::new(0));
        let pin = ScriptedPin { clock: clock.clone(), released_at: None, script };
        Dht22::new(pin, ClockDelay(clock))
    }

    #[test]
    fn decodes_positive_frame() {
        // 65.2 %RH, 35.1 °C
        let r = decode_frame(&[0x02, 0x8C, 0x01, 0x5F, 0xEE]).unwrap();
        assert!((r.humidity_pct - 65.2).abs() < 0.01);
        assert!((r.temperature_c - 35.1).abs() < 0.01);
    }

    #[test]
    fn decodes_negative_temperature() {
        // 65.2 %RH, -10.1 °C
        let r = decode_frame(&[0x02, 0x8C, 0x80, 0x65, 0x73]).unwrap();
        assert!((r.temperature_c + 10.1).abs() < 0.01);
    }

    #[test]
    fn rejects_bad_checksum() {
        assert_eq!(
            decode_frame(&[0x02, 0x8C, 0x01, 0x5F, 0xEF]),
            Err(SensorError::Checksum)
        );
    }

    #[test]
    fn rejects_implausible_humidity() {
        // 150.0 %RH with a valid checksum
        let frame = [0x05, 0xDC, 0x00, 0xC8, 0x05u8.wrapping_add(0xDC).wrapping_add(0xC8)];
        assert_eq!(decode_frame(&frame), Err(SensorError::OutOfRange));
    }

    #[test]
    fn captures_full_frame_from_waveform() {
        let frame = [0x02, 0x8C, 0x01, 0x5F, 0xEE];
        let mut dht = sensor(waveform(frame));
        assert_eq!(dht.read_frame().unwrap(), frame);
    }

    #[test]
    fn read_decodes_captured_frame() {
        let mut dht = sensor(waveform([0x01, 0x9A, 0x00, 0xEA, 0x85]));
        let r = dht.read().unwrap();
        assert!((r.humidity_pct - 41.0).abs() < 0.01);
        assert!((r.temperature_c - 23.4).abs() < 0.01);
    }

    #[test]
    fn silent_line_is_no_response() {
        // Line never pulled low by the sensor.
        let mut dht = sensor(vec![]);
        assert_eq!(dht.read(), Err(SensorError::NoResponse));
    }

    #[test]
    fn truncated_frame_times_out() {
        let mut script = waveform([0x02, 0x8C, 0x01, 0x5F, 0xEE]);
        script.truncate(3 + 20);
        // Hold the line low past every bit timeout.
        script.push((false, 1_000));
        let mut dht = sensor(script);
        assert_eq!(dht.read(), Err(SensorError::Timeout));
    }
}
