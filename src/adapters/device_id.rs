//! Device identity derived from the ESP32 factory MAC address.
//!
//! When no MQTT client id is configured, the node identifies itself as
//! `envnode-xxyyzz` (last 3 bytes of the 6-byte MAC, lowercase hex).  The
//! id is stable across reboots and fits the 23-byte MQTT 3.1.1 limit.

use core::fmt::Write;

use crate::config::MAX_CLIENT_ID_LEN;

pub type ClientIdString = heapless::String<MAX_CLIENT_ID_LEN>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Format: `envnode-xxyyzz` (e.g. `envnode-efcafe`).
pub fn client_id(mac: &MacAddress) -> ClientIdString {
    let mut id = ClientIdString::new();
    // 14 chars always fit.
    let _ = write!(id, "envnode-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    id
}
