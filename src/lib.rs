// weixin-ble - Weixin pedometer BLE peripheral

pub mod ble;
pub mod peripheral;
pub mod weixin;

pub use ble::BleError;
pub use peripheral::{Peripheral, PeripheralConfig, PeripheralState};
