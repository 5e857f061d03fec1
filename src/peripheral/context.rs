use std::sync::RwLock;

use crate::ble::command::DeviceAddress;
use crate::weixin::PedometerState;

/// State shared between the lifecycle and the request handlers.
#[derive(Debug, Default)]
pub struct DeviceContext {
    pub pedometer: PedometerState,
    address: RwLock<Option<DeviceAddress>>,
}

impl DeviceContext {
    pub fn new(pedometer: PedometerState) -> Self {
        Self {
            pedometer,
            address: RwLock::new(None),
        }
    }

    /// The resolved device address, if bring-up managed to read it.
    pub fn address(&self) -> Option<DeviceAddress> {
        *self.address.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_address(&self, address: Option<DeviceAddress>) {
        *self.address.write().unwrap_or_else(|e| e.into_inner()) = address;
    }
}
