//! BLE peripheral building blocks
//!
//! Provides the transport abstraction the peripheral engine runs on, the
//! advertising payload builder, the GATT service registry, the raw
//! controller command bridge, and an in-process simulated adapter for
//! testing without real hardware.

pub mod advertising;
pub mod command;
pub mod gatt;
pub mod simulated;
pub mod transport;
pub mod uuid;

use thiserror::Error;

use self::transport::AdapterState;
use self::uuid::BleUuid;

#[derive(Error, Debug)]
pub enum BleError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Controller command failed with status {0:#04x}")]
    CommandFailed(u8),

    #[error("Malformed controller response: {0}")]
    MalformedResponse(String),

    #[error("Invalid write length ({actual} bytes, expected {expected})")]
    InvalidWriteLength { expected: usize, actual: usize },

    #[error("Unhandled adapter state: {0}")]
    UnhandledState(AdapterState),

    #[error("{operation} handler already bound on characteristic {characteristic}")]
    HandlerAlreadyBound {
        characteristic: BleUuid,
        operation: &'static str,
    },

    #[error("GATT error: {0}")]
    GattError(String),

    #[error("Payload exceeds MTU ({size} > {mtu})")]
    MtuExceeded { size: usize, mtu: usize },

    #[error("Peer disconnected")]
    Disconnected,

    #[error("Operation timed out")]
    Timeout,
}
