//! Weixin pedometer profile
//!
//! The service, characteristics and advertising layout a Weixin (WeChat)
//! sport device exposes: step count, step target and the device's own
//! Bluetooth address.

pub mod pedometer;
pub mod service;

pub use pedometer::PedometerState;
pub use service::{build_advertisement, build_service};

use crate::ble::advertising::{FLAG_GENERAL_DISCOVERABLE, FLAG_LE_ONLY};

/// Weixin service.
pub const WX_SERVICE_UUID: u16 = 0xFEE7;

/// Weixin write characteristic. Reserved: part of the Weixin profile but
/// not registered, since the pedometer exposes no auth/data channel.
pub const WX_CH_WRITE_UUID: u16 = 0xFEC7;
/// Weixin indicate characteristic. Reserved, as for [`WX_CH_WRITE_UUID`].
pub const WX_CH_INDICATE_UUID: u16 = 0xFEC8;
/// Weixin read characteristic; serves the device address.
pub const WX_CH_READ_UUID: u16 = 0xFEC9;

/// Current step count.
pub const WX_CH_PEDOMETER_UUID: u16 = 0xFEA1;
/// Daily step target.
pub const WX_CH_TARGET_UUID: u16 = 0xFEA2;

/// Flags advertised by the device.
pub const ADV_FLAGS: u8 = FLAG_GENERAL_DISCOVERABLE | FLAG_LE_ONLY;

/// Company identifier carried in the manufacturer data field.
pub const MANUFACTURER_COMPANY_ID: u16 = 0x2333;

pub const DEFAULT_DEVICE_NAME: &str = "WeixinBLE";
