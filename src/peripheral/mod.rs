//! The peripheral engine
//!
//! Ties the BLE building blocks and the Weixin profile together: shared
//! device context, configuration, the notification task pool and the
//! lifecycle state machine that drives bring-up.

pub mod config;
pub mod context;
pub mod lifecycle;
pub mod notify;

pub use config::{AddressFailurePolicy, ConfigError, PeripheralConfig};
pub use context::DeviceContext;
pub use lifecycle::{Peripheral, PeripheralState};
pub use notify::NotifyPool;
