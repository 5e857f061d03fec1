//! Peripheral transport trait and adapter events
//!
//! Defines the boundary between the peripheral engine and whatever
//! actually talks to the controller (HCI socket, vendor SDK, or the
//! in-process simulator). The engine never touches the radio directly.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::advertising::AdvPacket;
use super::gatt::Service;
use super::BleError;

/// Power state reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Unknown => "Unknown",
            AdapterState::Resetting => "Resetting",
            AdapterState::Unsupported => "Unsupported",
            AdapterState::Unauthorized => "Unauthorized",
            AdapterState::PoweredOff => "PoweredOff",
            AdapterState::PoweredOn => "PoweredOn",
        };
        f.write_str(name)
    }
}

/// Identifier the transport assigns to a connected central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CentralId(pub u64);

impl fmt::Display for CentralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "central-{}", self.0)
    }
}

/// Asynchronous events raised by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    StateChanged(AdapterState),
    CentralConnected(CentralId),
    CentralDisconnected(CentralId),
}

/// What the peripheral engine needs from the layer below it.
///
/// Implementations deliver incoming ATT requests by calling the handlers
/// on the registered [`Service`]s, from whatever task they like.
#[async_trait]
pub trait PeripheralTransport: Send + Sync {
    /// Open the underlying device. Failure here is fatal to startup.
    async fn open(&self) -> Result<(), BleError>;

    /// Subscribe to power-state and connection events.
    fn events(&self) -> broadcast::Receiver<AdapterEvent>;

    /// Send a raw controller command and return the response parameters.
    async fn send_raw_command(&self, opcode: u16, params: &[u8]) -> Result<Vec<u8>, BleError>;

    /// Register a service so its characteristics become visible to centrals.
    async fn add_service(&self, service: Arc<Service>) -> Result<(), BleError>;

    /// Start (or restart) advertising with the given payload.
    async fn advertise(&self, packet: &AdvPacket) -> Result<(), BleError>;
}
