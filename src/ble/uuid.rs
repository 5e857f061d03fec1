//! Attribute UUIDs
//!
//! GATT services and characteristics are identified either by a 16-bit
//! SIG-assigned UUID or by a full 128-bit UUID.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A service or characteristic UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BleUuid {
    /// A 16-bit UUID from the Bluetooth SIG assigned numbers.
    Uuid16(u16),
    /// A full 128-bit UUID.
    Uuid128(Uuid),
}

impl BleUuid {
    /// Encoded length on the wire (2 or 16 bytes).
    pub fn len(&self) -> usize {
        match self {
            BleUuid::Uuid16(_) => 2,
            BleUuid::Uuid128(_) => 16,
        }
    }

    /// Wire encoding: little-endian, as used in AD structures and ATT PDUs.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            BleUuid::Uuid16(v) => v.to_le_bytes().to_vec(),
            BleUuid::Uuid128(u) => {
                let mut bytes = u.as_bytes().to_vec();
                bytes.reverse();
                bytes
            }
        }
    }
}

impl From<u16> for BleUuid {
    fn from(value: u16) -> Self {
        BleUuid::Uuid16(value)
    }
}

impl From<Uuid> for BleUuid {
    fn from(value: Uuid) -> Self {
        BleUuid::Uuid128(value)
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BleUuid::Uuid16(v) => write!(f, "{:04x}", v),
            BleUuid::Uuid128(u) => write!(f, "{}", u),
        }
    }
}
