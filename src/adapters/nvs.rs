//! Persistent configuration in NVS.
//!
//! One postcard-encoded [`NodeConfig`] lives under namespace `envnode`,
//! key `nodecfg`.  It is validated before every save and after every load,
//! so a blob written by an older firmware with out-of-range values is
//! refused rather than half-applied.  The same adapter exposes raw blob
//! access through [`StoragePort`].
//!
//! Host builds keep blobs in a `HashMap`.

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::NodeConfig;
use crate::pins::MAX_ACTUATORS;

const NAMESPACE: &str = "envnode";
const CONFIG_KEY: &str = "nodecfg";

/// Largest blob this adapter reads or writes.
const MAX_BLOB_SIZE: usize = 1024;

#[cfg(target_os = "espidf")]
mod flash {
    use esp_idf_svc::sys::*;

    /// NVS namespace and key names are at most 15 bytes.
    const MAX_NAME: usize = 15;

    pub const NOT_FOUND: esp_err_t = ESP_ERR_NVS_NOT_FOUND as esp_err_t;
    pub const NO_SPACE: esp_err_t = ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t;

    fn check(rc: esp_err_t) -> Result<(), esp_err_t> {
        if rc == ESP_OK { Ok(()) } else { Err(rc) }
    }

    fn c_name(name: &str) -> [u8; MAX_NAME + 1] {
        let mut out = [0u8; MAX_NAME + 1];
        let len = name.len().min(MAX_NAME);
        out[..len].copy_from_slice(&name.as_bytes()[..len]);
        out
    }

    /// Bring up the default partition, erasing it if its layout is stale.
    pub fn init() -> Result<(), esp_err_t> {
        // SAFETY: plain IDF calls with no arguments, made once at boot.
        unsafe {
            let rc = nvs_flash_init();
            if rc == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t || rc == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t {
                log::warn!("NVS: stale partition layout, erasing");
                check(nvs_flash_erase())?;
                return check(nvs_flash_init());
            }
            check(rc)
        }
    }

    /// An open namespace, closed on drop.
    pub struct Handle(nvs_handle_t);

    impl Handle {
        pub fn open(namespace: &str, writable: bool) -> Result<Self, esp_err_t> {
            let ns = c_name(namespace);
            let mode = if writable {
                nvs_open_mode_t_NVS_READWRITE
            } else {
                nvs_open_mode_t_NVS_READONLY
            };
            let mut raw: nvs_handle_t = 0;
            // SAFETY: `ns` is NUL-terminated and `raw` outlives the call.
            check(unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut raw) })?;
            Ok(Self(raw))
        }

        /// Length of the blob under `key`.
        pub fn len(&self, key: &str) -> Result<usize, esp_err_t> {
            let key = c_name(key);
            let mut len = 0usize;
            // SAFETY: a null output pointer asks NVS for the length only.
            check(unsafe { nvs_get_blob(self.0, key.as_ptr().cast(), core::ptr::null_mut(), &mut len) })?;
            Ok(len)
        }

        /// Copy the blob under `key` into `buf`; returns the bytes written.
        pub fn get(&self, key: &str, buf: &mut [u8]) -> Result<usize, esp_err_t> {
            let key = c_name(key);
            let mut len = buf.len();
            // SAFETY: `buf` is valid for `len` bytes.
            check(unsafe { nvs_get_blob(self.0, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut len) })?;
            Ok(len)
        }

        pub fn set(&mut self, key: &str, data: &[u8]) -> Result<(), esp_err_t> {
            let key = c_name(key);
            // SAFETY: `data` is valid for `data.len()` bytes.
            check(unsafe { nvs_set_blob(self.0, key.as_ptr().cast(), data.as_ptr().cast(), data.len()) })?;
            check(unsafe { nvs_commit(self.0) })
        }

        /// Erase `key`; a missing key is not an error.
        pub fn erase(&mut self, key: &str) -> Result<(), esp_err_t> {
            let key = c_name(key);
            match check(unsafe { nvs_erase_key(self.0, key.as_ptr().cast()) }) {
                Ok(()) | Err(NOT_FOUND) => {}
                Err(e) => return Err(e),
            }
            check(unsafe { nvs_commit(self.0) })
        }

        pub fn contains(&self, key: &str) -> bool {
            let key = c_name(key);
            unsafe { nvs_find_key(self.0, key.as_ptr().cast(), core::ptr::null_mut()) == ESP_OK }
        }
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            // SAFETY: the handle came from a successful nvs_open.
            unsafe { nvs_close(self.0) }
        }
    }
}

#[cfg(target_os = "espidf")]
fn storage_error(code: esp_idf_svc::sys::esp_err_t) -> StorageError {
    match code {
        flash::NOT_FOUND => StorageError::NotFound,
        flash::NO_SPACE => StorageError::Full,
        other => {
            warn!("NVS: error {}", other);
            StorageError::Io
        }
    }
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    blobs: RefCell<HashMap<(String, String), Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise the NVS partition (erasing it on a layout change).
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            flash::init().map_err(|e| {
                warn!("NVS: init failed ({})", e);
                ConfigError::Io
            })?;
            info!("NVS: ready");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NVS(sim): in-memory store");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            blobs: RefCell::new(HashMap::new()),
        })
    }

    /// Drop the persisted config so the next boot uses build-time defaults.
    pub fn reset_config(&mut self) -> Result<(), StorageError> {
        self.delete(NAMESPACE, CONFIG_KEY)
    }

    // ── Backend ───────────────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn fetch(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let handle = flash::Handle::open(namespace, false).map_err(storage_error)?;
        let len = handle.len(key).map_err(storage_error)?;
        if len > MAX_BLOB_SIZE {
            warn!("NVS: {}/{} is {} bytes, refusing", namespace, key, len);
            return Err(StorageError::Io);
        }
        let mut buf = vec![0u8; len];
        let read = handle.get(key, &mut buf).map_err(storage_error)?;
        buf.truncate(read);
        Ok(buf)
    }

    #[cfg(not(target_os = "espidf"))]
    fn fetch(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .borrow()
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    #[cfg(target_os = "espidf")]
    fn store(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut handle = flash::Handle::open(namespace, true).map_err(storage_error)?;
        handle.set(key, data).map_err(storage_error)
    }

    #[cfg(not(target_os = "espidf"))]
    fn store(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .borrow_mut()
            .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
        Ok(())
    }
}

fn is_wildcard_topic(topic: &str) -> bool {
    topic.contains('#') || topic.contains('+')
}

/// Range-check every field of a [`NodeConfig`].
pub fn validate_config(cfg: &NodeConfig) -> Result<(), ConfigError> {
    if cfg.broker_host.is_empty() {
        return Err(ConfigError::ValidationFailed("broker_host must not be empty"));
    }
    if cfg.broker_port == 0 {
        return Err(ConfigError::ValidationFailed("broker_port must be non-zero"));
    }
    if cfg.command_topic.is_empty() {
        return Err(ConfigError::ValidationFailed("command_topic must not be empty"));
    }
    if cfg.telemetry_topic.is_empty() || is_wildcard_topic(&cfg.telemetry_topic) {
        return Err(ConfigError::ValidationFailed(
            "telemetry_topic must be a non-empty topic without wildcards",
        ));
    }
    if !(1..=600).contains(&cfg.keep_alive_secs) {
        return Err(ConfigError::ValidationFailed("keep_alive_secs must be 1–600"));
    }
    if cfg.command_timeout_ms == 0
        || cfg.publish_interval_ms == 0
        || cfg.link_poll_interval_ms == 0
        || cfg.aux_interval_ms == 0
    {
        return Err(ConfigError::ValidationFailed("intervals and timeouts must be non-zero"));
    }
    if cfg.sensor_max_attempts == 0 {
        return Err(ConfigError::ValidationFailed("sensor_max_attempts must be at least 1"));
    }
    if cfg.actuator_pins.is_empty() || cfg.actuator_pins.len() > MAX_ACTUATORS {
        return Err(ConfigError::ValidationFailed("actuator_pins must list 1–8 GPIOs"));
    }
    if cfg.pwm_frequency_hz == 0 {
        return Err(ConfigError::ValidationFailed("pwm_frequency_hz must be non-zero"));
    }
    if !(0x20..=0x27).contains(&cfg.expander_address) {
        return Err(ConfigError::ValidationFailed("expander_address must be 0x20–0x27"));
    }
    Ok(())
}

fn decode_config(bytes: &[u8]) -> Result<NodeConfig, ConfigError> {
    let cfg: NodeConfig = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

impl ConfigPort for NvsAdapter {
    /// `NotFound` when nothing was ever saved; the caller falls back to defaults.
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        let bytes = self.fetch(NAMESPACE, CONFIG_KEY).map_err(|e| match e {
            StorageError::NotFound => ConfigError::NotFound,
            _ => ConfigError::Io,
        })?;
        let cfg = decode_config(&bytes)?;
        info!("NVS: config loaded ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::Io)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::StorageFull);
        }
        self.store(NAMESPACE, CONFIG_KEY, &bytes).map_err(|e| match e {
            StorageError::Full => ConfigError::StorageFull,
            _ => ConfigError::Io,
        })?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let blob = self.fetch(namespace, key)?;
        let len = blob.len().min(buf.len());
        buf[..len].copy_from_slice(&blob[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        self.store(namespace, key, data)
    }

    #[cfg(target_os = "espidf")]
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut handle = flash::Handle::open(namespace, true).map_err(storage_error)?;
        handle.erase(key).map_err(storage_error)
    }

    #[cfg(not(target_os = "espidf"))]
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.blobs
            .borrow_mut()
            .remove(&(namespace.to_owned(), key.to_owned()));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn exists(&self, namespace: &str, key: &str) -> bool {
        flash::Handle::open(namespace, false).is_ok_and(|h| h.contains(key))
    }

    #[cfg(not(target_os = "espidf"))]
    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.blobs
            .borrow()
            .contains_key(&(namespace.to_owned(), key.to_owned()))
    }
}
