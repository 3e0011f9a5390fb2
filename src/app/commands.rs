//! Inbound actuator commands.
//!
//! Commands arrive as pub/sub messages whose topic ends in a single digit
//! selecting the actuator and whose payload is the ASCII decimal duty:
//!
//! ```text
//!   envnode/pwm/1   "55"   → channel 1 at 55 %
//!   envnode/pwm/9   "200"  → channel 1 (last one) at 100 %
//! ```
//!
//! Parsing is fail-safe: nothing here ever errors.  An unusable index
//! selects channel 0, an unusable duty becomes 0 (off), and both are clamped
//! into range.  There is no acknowledgment path back to the sender.

use core::fmt;

/// Highest duty the actuators accept.
pub const MAX_DUTY_PERCENT: u8 = 100;

/// A validated actuator command.  `index < actuator_count` and
/// `duty <= 100` always hold for values returned by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub index: usize,
    pub duty: u8,
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}={}%", self.index, self.duty)
    }
}

/// Map a message to an actuator command.
///
/// `actuator_count` must be at least 1; config validation guarantees it.
pub fn parse(topic: &str, payload: &[u8], actuator_count: usize) -> ActuatorCommand {
    let last = actuator_count.saturating_sub(1);
    let index = topic_index(topic).min(last);
    let duty = parse_field(payload).unwrap_or(0).min(MAX_DUTY_PERCENT);
    ActuatorCommand { index, duty }
}

/// The trailing character of the topic as a base-10 digit, else 0.
fn topic_index(topic: &str) -> usize {
    topic
        .chars()
        .next_back()
        .and_then(|c| c.to_digit(10))
        .map_or(0, |d| d as usize)
}

/// Parse an unsigned 8-bit decimal field.
///
/// The field ends at the first NUL byte, so C-string payloads parse as their
/// text. Leading ASCII whitespace and a `+` sign are accepted; anything after
/// the digits, a `-` sign, an empty field or a value above 255 is rejected.
fn parse_field(raw: &[u8]) -> Option<u8> {
    let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
    let text = core::str::from_utf8(raw).ok()?;
    let text = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let digits = text.strip_prefix('+').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u8>().ok()
}
