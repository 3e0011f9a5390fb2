//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production, stderr on the host).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::SessionFailed(e) => {
                warn!("SESSION | failed: {}", e);
            }
            AppEvent::SessionClosed(s) => {
                info!(
                    "SESSION | closed | opened={} failed={} published={} skipped={} commands={}",
                    s.sessions_opened, s.session_failures, s.telemetry_published, s.cycles_skipped, s.commands_applied,
                );
            }
            AppEvent::CommandApplied(cmd) => {
                info!("CMD | {}", cmd);
            }
            AppEvent::TelemetryPublished(r) => {
                info!("TELEM | T={:.1}\u{00b0}C | RH={:.1}%", r.temperature_c, r.humidity_pct);
            }
            AppEvent::SampleSkipped { attempts } => {
                warn!("TELEM | skipped after {} sensor attempts", attempts);
            }
        }
    }
}
