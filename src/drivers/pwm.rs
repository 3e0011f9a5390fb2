//! PWM actuator bank.
//!
//! One LEDC channel per configured GPIO, addressed by index.  Duty is
//! given in percent and handed to the channel through
//! [`SetDutyCycle::set_duty_cycle_percent`], which scales it to the
//! timer resolution (10 bits on the ESP32 build).
//!
//! The bank itself knows nothing about LEDC: any `embedded-hal` PWM
//! channel works, which is how the host tests drive it.

use embedded_hal::pwm::SetDutyCycle;
use log::debug;

use crate::app::commands::MAX_DUTY_PERCENT;
use crate::app::ports::ActuatorPort;
use crate::error::ActuatorError;
use crate::pins::MAX_ACTUATORS;

pub struct PwmBank<P> {
    channels: heapless::Vec<P, MAX_ACTUATORS>,
    duty: [u8; MAX_ACTUATORS],
}

impl<P: SetDutyCycle> PwmBank<P> {
    /// Channels beyond [`MAX_ACTUATORS`] are dropped.
    pub fn new(channels: impl IntoIterator<Item = P>) -> Self {
        let mut bank = heapless::Vec::new();
        for ch in channels {
            if bank.push(ch).is_err() {
                log::warn!("PWM: more than {} channels, extra ignored", MAX_ACTUATORS);
                break;
            }
        }
        Self {
            channels: bank,
            duty: [0; MAX_ACTUATORS],
        }
    }

    /// Last duty applied to `channel`, in percent.
    pub fn duty(&self, channel: usize) -> Option<u8> {
        (channel < self.channels.len()).then(|| self.duty[channel])
    }

    /// Drive every channel to 0 %.
    pub fn all_off(&mut self) -> Result<(), ActuatorError> {
        for ch in 0..self.channels.len() {
            self.set_output(ch, 0)?;
        }
        Ok(())
    }
}

impl<P: SetDutyCycle> ActuatorPort for PwmBank<P> {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn set_output(&mut self, channel: usize, percent: u8) -> Result<(), ActuatorError> {
        let pwm = self.channels.get_mut(channel).ok_or(ActuatorError::InvalidChannel)?;
        let percent = percent.min(MAX_DUTY_PERCENT);
        pwm.set_duty_cycle_percent(percent)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.duty[channel] = percent;
        debug!("PWM: ch{} -> {}%", channel, percent);
        Ok(())
    }
}
