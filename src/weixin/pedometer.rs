//! Pedometer values shared between the sensor feed and GATT handlers
//!
//! Both values travel as exactly 4 bytes, least significant byte first.

use std::sync::{Mutex, MutexGuard};

use crate::ble::BleError;

/// Width of a pedometer value on the wire.
pub const VALUE_LEN: usize = 4;

/// Wire encoding of a step count or target.
pub fn encode_value(value: u32) -> [u8; VALUE_LEN] {
    value.to_le_bytes()
}

/// Decode a wire value; anything but exactly 4 bytes is rejected.
pub fn decode_value(bytes: &[u8]) -> Result<u32, BleError> {
    let raw: [u8; VALUE_LEN] = bytes.try_into().map_err(|_| BleError::InvalidWriteLength {
        expected: VALUE_LEN,
        actual: bytes.len(),
    })?;
    Ok(u32::from_le_bytes(raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Values {
    steps: u32,
    target: u32,
}

/// Step count and step target behind one lock.
#[derive(Debug)]
pub struct PedometerState {
    values: Mutex<Values>,
}

impl PedometerState {
    pub fn new(steps: u32, target: u32) -> Self {
        Self {
            values: Mutex::new(Values { steps, target }),
        }
    }

    // Values are only ever replaced whole; a poisoned lock still holds a
    // consistent pair.
    fn lock(&self) -> MutexGuard<'_, Values> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn steps(&self) -> u32 {
        self.lock().steps
    }

    pub fn target(&self) -> u32 {
        self.lock().target
    }

    pub fn steps_bytes(&self) -> [u8; VALUE_LEN] {
        encode_value(self.steps())
    }

    pub fn target_bytes(&self) -> [u8; VALUE_LEN] {
        encode_value(self.target())
    }

    /// Sensor feed: replace the step count.
    pub fn set_steps(&self, steps: u32) {
        self.lock().steps = steps;
    }

    /// Sensor feed: count more steps. Saturates at `u32::MAX`.
    pub fn add_steps(&self, delta: u32) -> u32 {
        let mut values = self.lock();
        values.steps = values.steps.saturating_add(delta);
        values.steps
    }

    pub fn set_target(&self, target: u32) {
        self.lock().target = target;
    }

    /// Apply a target written by a central. Short or long payloads leave
    /// the state untouched.
    pub fn write_target(&self, bytes: &[u8]) -> Result<u32, BleError> {
        let target = decode_value(bytes)?;
        self.set_target(target);
        Ok(target)
    }
}

impl Default for PedometerState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
