//! Bounded-retry sensor acquisition.
//!
//! One call to [`SensorSampler::sample`] is one telemetry cycle's worth of
//! attempts.  A fresh [`RetryBudget`] is created per call; nothing carries
//! over between cycles.

use embedded_hal::delay::DelayNs;
use log::debug;

use crate::app::ports::SensorPort;
use crate::sensors::Reading;

/// Attempt counter for a single sample cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts_made: u8,
    max_attempts: u8,
    retry_delay_ms: u32,
}

impl RetryBudget {
    /// A budget allows at least one attempt.
    pub fn new(max_attempts: u8, retry_delay_ms: u32) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: max_attempts.max(1),
            retry_delay_ms,
        }
    }

    /// Claim the next attempt.  Returns false once the budget is spent.
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempts_made >= self.max_attempts {
            return false;
        }
        self.attempts_made += 1;
        true
    }

    pub fn attempts_made(&self) -> u8 {
        self.attempts_made
    }

    pub fn retry_delay_ms(&self) -> u32 {
        self.retry_delay_ms
    }
}

/// Result of one sample cycle.  `Exhausted` is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Reading(Reading),
    Exhausted { attempts: u8 },
}

#[derive(Debug, Clone, Copy)]
pub struct SensorSampler {
    max_attempts: u8,
    retry_delay_ms: u32,
}

impl SensorSampler {
    pub fn new(max_attempts: u8, retry_delay_ms: u32) -> Self {
        Self { max_attempts, retry_delay_ms }
    }

    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_attempts, self.retry_delay_ms)
    }

    /// Read until the first valid reading or until the budget runs out.
    ///
    /// Every failed attempt (driver error or implausible values) is followed
    /// by the retry delay, the last one included.
    pub fn sample<S, D>(&self, sensor: &mut S, delay: &mut D) -> SampleOutcome
    where
        S: SensorPort,
        D: DelayNs,
    {
        let mut budget = self.budget();
        while budget.begin_attempt() {
            match sensor.read() {
                Ok(reading) if reading.is_valid() => return SampleOutcome::Reading(reading),
                Ok(reading) => debug!(
                    "Sampler: attempt {} implausible ({:.1} C, {:.1} %)",
                    budget.attempts_made(),
                    reading.temperature_c,
                    reading.humidity_pct
                ),
                Err(e) => debug!("Sampler: attempt {} failed: {}", budget.attempts_made(), e),
            }
            delay.delay_ms(budget.retry_delay_ms());
        }
        SampleOutcome::Exhausted {
            attempts: budget.attempts_made(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;

    struct ScriptedSensor {
        results: Vec<Result<Reading, SensorError>>,
        calls: usize,
    }

    impl SensorPort for ScriptedSensor {
        fn read(&mut self) -> Result<Reading, SensorError> {
            let r = self
                .results
                .get(self.calls)
                .copied()
                .unwrap_or(Err(SensorError::NoResponse));
            self.calls += 1;
            r
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        total_ms: u64,
        sleeps: u32,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ms += u64::from(ns) / 1_000_000;
        }
        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += u64::from(ms);
            self.sleeps += 1;
        }
    }

    fn ok() -> Result<Reading, SensorError> {
        Ok(Reading::new(23.4, 41.0))
    }

    #[test]
    fn first_success_returns_immediately() {
        let mut sensor = ScriptedSensor { results: vec![ok()], calls: 0 };
        let mut delay = RecordingDelay::default();
        let out = SensorSampler::new(5, 300).sample(&mut sensor, &mut delay);
        assert_eq!(out, SampleOutcome::Reading(Reading::new(23.4, 41.0)));
        assert_eq!(sensor.calls, 1);
        assert_eq!(delay.total_ms, 0);
    }

    #[test]
    fn four_failures_then_success_sleeps_four_times() {
        let mut results = vec![Err(SensorError::Checksum); 4];
        results.push(ok());
        let mut sensor = ScriptedSensor { results, calls: 0 };
        let mut delay = RecordingDelay::default();
        let out = SensorSampler::new(5, 300).sample(&mut sensor, &mut delay);
        assert!(matches!(out, SampleOutcome::Reading(_)));
        assert_eq!(sensor.calls, 5);
        assert_eq!(delay.sleeps, 4);
        assert_eq!(delay.total_ms, 1_200);
    }

    #[test]
    fn all_failures_exhaust_budget() {
        let mut sensor = ScriptedSensor { results: vec![], calls: 0 };
        let mut delay = RecordingDelay::default();
        let out = SensorSampler::new(5, 300).sample(&mut sensor, &mut delay);
        assert_eq!(out, SampleOutcome::Exhausted { attempts: 5 });
        assert_eq!(sensor.calls, 5);
        // A sleep follows the final failure too.
        assert_eq!(delay.sleeps, 5);
    }

    #[test]
    fn implausible_reading_counts_as_failure() {
        let mut sensor = ScriptedSensor {
            results: vec![Ok(Reading::new(200.0, 50.0)), ok()],
            calls: 0,
        };
        let mut delay = RecordingDelay::default();
        let out = SensorSampler::new(5, 300).sample(&mut sensor, &mut delay);
        assert_eq!(out, SampleOutcome::Reading(Reading::new(23.4, 41.0)));
        assert_eq!(sensor.calls, 2);
    }

    #[test]
    fn zero_budget_still_tries_once() {
        let mut b = RetryBudget::new(0, 300);
        assert!(b.begin_attempt());
        assert!(!b.begin_attempt());
        assert_eq!(b.attempts_made(), 1);
    }
}
