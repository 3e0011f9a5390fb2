//! Wi-Fi station supervisor behind [`LinkPort`].
//!
//! The session loop only asks "is the link up?" and calls [`LinkPort::poll`]
//! while it waits.  Everything about association and re-association lives
//! here.
//!
//! On ESP-IDF the adapter drives a `BlockingWifi<EspWifi>` handed in by
//! `main`.  On the host it simulates the station so the reconnect logic can
//! be tested; the simulated AP refuses every attempt numbered 3 mod 10.
//!
//! ## Re-association
//!
//! After the link drops, the first attempt happens on the next poll.  Each
//! failed attempt doubles the wait before the next one, starting at 2 s and
//! capped at 60 s.  A poll inside the wait window returns at once.

use core::fmt;
use std::time::{Duration, Instant};

use heapless::String;
use log::{error, info, warn};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use crate::app::ports::LinkPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No SSID has been set.
    MissingSsid,
    /// SSID empty, longer than 32 bytes, or not printable ASCII.
    BadSsid,
    /// Passphrase neither empty (open network) nor 8..=64 bytes.
    BadPassword,
    /// The driver could not associate or get an address.
    AssociationFailed,
    /// `connect` called while already associated.
    AlreadyUp,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingSsid => "no SSID set",
            Self::BadSsid => "SSID must be 1..=32 printable ASCII bytes",
            Self::BadPassword => "passphrase must be empty or 8..=64 bytes",
            Self::AssociationFailed => "association failed",
            Self::AlreadyUp => "station already associated",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting to retry; `attempt` counts failures since the link dropped.
    Reconnecting { attempt: u32 },
}

const FIRST_RETRY_WAIT: Duration = Duration::from_secs(2);
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// Station credentials as the driver wants them.
#[derive(Debug, Clone, Default)]
struct Credentials {
    ssid: String<32>,
    password: String<64>,
}

impl Credentials {
    fn parse(ssid: &str, password: &str) -> Result<Self, LinkError> {
        if ssid.is_empty() || !ssid.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(LinkError::BadSsid);
        }
        if !password.is_empty() && !(8..=64).contains(&password.len()) {
            return Err(LinkError::BadPassword);
        }
        Ok(Self {
            ssid: ssid.try_into().map_err(|_| LinkError::BadSsid)?,
            password: password.try_into().map_err(|_| LinkError::BadPassword)?,
        })
    }

    fn is_set(&self) -> bool {
        !self.ssid.is_empty()
    }
}

pub struct WifiAdapter {
    state: WifiState,
    creds: Credentials,
    retry_wait: Duration,
    retry_at: Instant,
    rssi: Option<i8>,
    #[cfg(target_os = "espidf")]
    driver: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_attempts: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_associated: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn with_driver(driver: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            state: WifiState::Disconnected,
            creds: Credentials::default(),
            retry_wait: FIRST_RETRY_WAIT,
            retry_at: Instant::now(),
            rssi: None,
            driver,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            creds: Credentials::default(),
            retry_wait: FIRST_RETRY_WAIT,
            retry_at: Instant::now(),
            rssi: None,
            sim_attempts: 0,
            sim_associated: false,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Signal strength of the current AP, refreshed on every poll while up.
    pub fn rssi(&self) -> Option<i8> {
        self.rssi
    }

    /// Validate and store credentials.  Takes effect on the next association.
    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        self.creds = Credentials::parse(ssid, password)?;
        info!("WiFi: SSID set to '{}'", self.creds.ssid);
        Ok(())
    }

    /// Associate now.  On failure the adapter enters `Reconnecting` and the
    /// next attempt is left to [`LinkPort::poll`].
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if !self.creds.is_set() {
            return Err(LinkError::MissingSsid);
        }
        if self.state == WifiState::Connected {
            return Err(LinkError::AlreadyUp);
        }

        info!("WiFi: joining '{}'", self.creds.ssid);
        self.state = WifiState::Connecting;
        if let Err(e) = self.associate() {
            error!("WiFi: join failed: {}", e);
            self.wait_then_retry(0);
            return Err(e);
        }
        self.mark_up();
        info!("WiFi: up, RSSI {:?}", self.rssi);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.dissociate();
        self.state = WifiState::Disconnected;
        self.rssi = None;
        info!("WiFi: down");
    }

    fn mark_up(&mut self) {
        self.state = WifiState::Connected;
        self.retry_wait = FIRST_RETRY_WAIT;
        self.rssi = self.read_rssi();
    }

    fn wait_then_retry(&mut self, attempt: u32) {
        self.state = WifiState::Reconnecting { attempt };
        self.retry_at = Instant::now() + self.retry_wait;
    }

    // ── Driver ────────────────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn associate(&mut self) -> Result<(), LinkError> {
        let auth_method = if self.creds.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: self.creds.ssid.as_str().try_into().map_err(|_| LinkError::BadSsid)?,
            password: self
                .creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| LinkError::BadPassword)?,
            auth_method,
            ..Default::default()
        };
        let failed = |_| LinkError::AssociationFailed;
        self.driver
            .set_configuration(&Configuration::Client(client))
            .map_err(failed)?;
        if !self.driver.is_started().unwrap_or(false) {
            self.driver.start().map_err(failed)?;
        }
        self.driver.connect().map_err(failed)?;
        self.driver.wait_netif_up().map_err(failed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn associate(&mut self) -> Result<(), LinkError> {
        self.sim_attempts = self.sim_attempts.wrapping_add(1);
        if self.sim_attempts % 10 == 3 {
            warn!("WiFi(sim): AP refused attempt {}", self.sim_attempts);
            return Err(LinkError::AssociationFailed);
        }
        self.sim_associated = true;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn dissociate(&mut self) {
        if let Err(e) = self.driver.disconnect() {
            warn!("WiFi: driver disconnect: {:?}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn dissociate(&mut self) {
        self.sim_associated = false;
    }

    #[cfg(target_os = "espidf")]
    fn associated(&self) -> bool {
        self.driver.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn associated(&self) -> bool {
        self.sim_associated
    }

    #[cfg(target_os = "espidf")]
    fn read_rssi(&self) -> Option<i8> {
        let mut ap = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: `ap` is a valid, exclusively borrowed record for the call.
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap) };
        (rc == esp_idf_svc::sys::ESP_OK).then_some(ap.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_rssi(&self) -> Option<i8> {
        self.sim_associated.then_some(-58)
    }

    /// Simulation: the AP vanishes.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulate_link_loss(&mut self) {
        self.sim_associated = false;
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkPort for WifiAdapter {
    fn is_ready(&self) -> bool {
        self.state == WifiState::Connected && self.associated()
    }

    fn poll(&mut self) {
        match self.state {
            WifiState::Disconnected if self.creds.is_set() => {
                // A failure is logged and scheduled by connect().
                let _ = self.connect();
            }
            WifiState::Reconnecting { attempt } if Instant::now() >= self.retry_at => {
                info!("WiFi: rejoin attempt {} (wait was {:?})", attempt + 1, self.retry_wait);
                if self.associate().is_ok() {
                    self.mark_up();
                    info!("WiFi: rejoined, RSSI {:?}", self.rssi);
                } else {
                    self.retry_wait = (self.retry_wait * 2).min(MAX_RETRY_WAIT);
                    self.wait_then_retry(attempt + 1);
                }
            }
            WifiState::Connected if self.associated() => {
                self.rssi = self.read_rssi();
            }
            WifiState::Connected => {
                warn!("WiFi: link lost");
                self.state = WifiState::Reconnecting { attempt: 0 };
                self.retry_at = Instant::now();
                self.rssi = None;
            }
            _ => {}
        }
    }
}
