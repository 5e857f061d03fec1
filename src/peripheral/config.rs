//! Peripheral configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to
//! the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::weixin::{DEFAULT_DEVICE_NAME, MANUFACTURER_COMPANY_ID};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] serde_json::Error),
}

/// What to advertise when the device address could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFailurePolicy {
    /// Leave the manufacturer data field out of the advertisement.
    OmitManufacturerData,
    /// Advertise the manufacturer data with an all-zero address.
    AdvertiseZeroAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Local name put in the advertisement.
    pub device_name: String,
    /// Company identifier of the manufacturer data field.
    pub company_id: u16,
    /// Upper bound on a raw controller command round trip.
    pub command_timeout_ms: u64,
    pub initial_steps: u32,
    pub initial_target: u32,
    pub address_failure: AddressFailurePolicy,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            company_id: MANUFACTURER_COMPANY_ID,
            command_timeout_ms: 2000,
            initial_steps: 0,
            initial_target: 10000,
            address_failure: AddressFailurePolicy::OmitManufacturerData,
        }
    }
}

impl PeripheralConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
