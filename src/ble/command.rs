//! Raw controller command bridge
//!
//! Sends a single HCI command through the transport and decodes the
//! status-prefixed response. The bridge itself never interprets the status
//! byte; helpers built on top of it (such as [`read_device_address`]) do.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::transport::PeripheralTransport;
use super::BleError;

/// Informational parameters: Read BD_ADDR.
pub const OPCODE_READ_BD_ADDR: u16 = 0x1009;

/// A controller command's opcode and parameter encoding.
pub trait CommandParam: Send + Sync {
    fn opcode(&self) -> u16;
    fn len(&self) -> usize;
    fn marshal(&self, buf: &mut [u8]);
}

/// Read the controller's public device address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadBdAddr;

impl CommandParam for ReadBdAddr {
    fn opcode(&self) -> u16 {
        OPCODE_READ_BD_ADDR
    }

    fn len(&self) -> usize {
        0
    }

    fn marshal(&self, _buf: &mut [u8]) {}
}

/// An encoded command ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerCommand {
    pub opcode: u16,
    pub params: Vec<u8>,
}

impl ControllerCommand {
    pub fn from_param(param: &dyn CommandParam) -> Self {
        let mut params = vec![0u8; param.len()];
        param.marshal(&mut params);
        Self {
            opcode: param.opcode(),
            params,
        }
    }

    /// HCI command layout: opcode (LE), parameter length, parameters.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 + self.params.len());
        buf.extend_from_slice(&self.opcode.to_le_bytes());
        buf.push(self.params.len() as u8);
        buf.extend_from_slice(&self.params);
        buf
    }

    /// Inverse of [`ControllerCommand::encode`].
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < 3 {
            return None;
        }
        let opcode = u16::from_le_bytes([raw[0], raw[1]]);
        let len = raw[2] as usize;
        let params = raw.get(3..3 + len)?.to_vec();
        Some(Self { opcode, params })
    }
}

/// Status byte plus the opcode-specific return parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: u8,
    pub payload: Vec<u8>,
}

impl CommandResponse {
    pub fn parse(raw: &[u8]) -> Result<Self, BleError> {
        let (status, payload) = raw
            .split_first()
            .ok_or_else(|| BleError::MalformedResponse("empty response".to_string()))?;
        Ok(Self {
            status: *status,
            payload: payload.to_vec(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// A 6-byte Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    /// Stand-in used while the address is unknown.
    pub const UNRESOLVED: DeviceAddress = DeviceAddress([0; 6]);

    /// Build from controller (little-endian) byte order.
    pub fn from_le_bytes(bytes: [u8; 6]) -> Self {
        let mut addr = bytes;
        addr.reverse();
        Self(addr)
    }

    /// Controller (little-endian) byte order.
    pub fn to_le_bytes(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl std::str::FromStr for DeviceAddress {
    type Err = BleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BleError::MalformedResponse(format!("invalid device address '{}'", s));
        let mut addr = [0u8; 6];
        let mut parts = s.split(':');
        for byte in addr.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            let decoded = hex::decode(part).map_err(|_| invalid())?;
            if decoded.len() != 1 {
                return Err(invalid());
            }
            *byte = decoded[0];
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(addr))
    }
}

/// Send one command and wait at most `timeout` for its response.
pub async fn send_raw_command(
    transport: &dyn PeripheralTransport,
    param: &dyn CommandParam,
    timeout: Duration,
) -> Result<CommandResponse, BleError> {
    let command = ControllerCommand::from_param(param);
    log::debug!("HCI command: {}", hex::encode(command.encode()));

    let raw = tokio::time::timeout(
        timeout,
        transport.send_raw_command(command.opcode, &command.params),
    )
    .await
    .map_err(|_| BleError::Timeout)??;

    log::debug!("HCI response: {}", hex::encode(&raw));
    CommandResponse::parse(&raw)
}

/// Resolve the controller's device address with Read BD_ADDR.
pub async fn read_device_address(
    transport: &dyn PeripheralTransport,
    timeout: Duration,
) -> Result<DeviceAddress, BleError> {
    let response = send_raw_command(transport, &ReadBdAddr, timeout).await?;
    if !response.is_success() {
        return Err(BleError::CommandFailed(response.status));
    }
    let bytes: [u8; 6] = response
        .payload
        .get(..6)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            BleError::MalformedResponse(format!(
                "expected 6 address bytes, got {}",
                response.payload.len()
            ))
        })?;
    Ok(DeviceAddress::from_le_bytes(bytes))
}
