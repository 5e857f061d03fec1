//! In-process BLE adapter simulator
//!
//! Implements [`PeripheralTransport`] entirely in memory and plays the
//! central's side of the link: power transitions, connects, reads, writes
//! and subscriptions. Used for integration testing and for running the
//! peripheral without real BLE hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};

use super::advertising::AdvPacket;
use super::command::{ControllerCommand, DeviceAddress, OPCODE_READ_BD_ADDR};
use super::gatt::{AttStatus, Characteristic, Notification, Notifier, ReadRequest, Request, Service};
use super::transport::{AdapterEvent, AdapterState, CentralId, PeripheralTransport};
use super::uuid::BleUuid;
use super::BleError;

/// Default ATT MTU; values carry at most MTU - 1 bytes (read) or
/// MTU - 3 bytes (notification).
pub const DEFAULT_ATT_MTU: usize = 23;

/// HCI status: unknown HCI command.
const STATUS_UNKNOWN_COMMAND: u8 = 0x01;

/// How the simulated controller answers a raw command.
#[derive(Debug, Clone)]
pub enum CommandReply {
    /// Return these bytes verbatim.
    Bytes(Vec<u8>),
    /// Fail at the transport level.
    Error(String),
    /// Never answer.
    Stall,
}

/// A simulated BLE adapter in the peripheral role.
pub struct SimAdapter {
    address: DeviceAddress,
    mtu: usize,
    available: AtomicBool,
    events_tx: broadcast::Sender<AdapterEvent>,
    adv_tx: broadcast::Sender<Vec<u8>>,
    advertisement: Mutex<Option<AdvPacket>>,
    services: Mutex<Vec<Arc<Service>>>,
    replies: Mutex<HashMap<u16, CommandReply>>,
    commands: Mutex<Vec<Vec<u8>>>,
    next_central: AtomicU64,
}

impl SimAdapter {
    /// Create a simulated adapter whose controller reports `address`.
    pub fn new(address: DeviceAddress) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        let (adv_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            address,
            mtu: DEFAULT_ATT_MTU,
            available: AtomicBool::new(true),
            events_tx,
            adv_tx,
            advertisement: Mutex::new(None),
            services: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            next_central: AtomicU64::new(1),
        })
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Make the next `open()` fail, as if the device node were missing.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Override the controller's answer to `opcode`.
    pub async fn set_command_reply(&self, opcode: u16, reply: CommandReply) {
        self.replies.lock().await.insert(opcode, reply);
    }

    /// Encoded HCI commands received so far.
    pub async fn sent_commands(&self) -> Vec<Vec<u8>> {
        self.commands.lock().await.clone()
    }

    /// Report an adapter power-state change.
    pub fn set_state(&self, state: AdapterState) {
        let _ = self.events_tx.send(AdapterEvent::StateChanged(state));
    }

    pub fn power_on(&self) {
        self.set_state(AdapterState::PoweredOn);
    }

    pub fn power_off(&self) {
        self.set_state(AdapterState::PoweredOff);
    }

    /// Subscribe to advertising payloads as they are transmitted.
    pub fn advertisements(&self) -> broadcast::Receiver<Vec<u8>> {
        self.adv_tx.subscribe()
    }

    /// The payload currently being advertised, if any.
    pub async fn current_advertisement(&self) -> Option<AdvPacket> {
        self.advertisement.lock().await.clone()
    }

    pub async fn services(&self) -> Vec<Arc<Service>> {
        self.services.lock().await.clone()
    }

    /// A central connects; returns the id it will use for requests.
    pub fn connect_central(&self) -> CentralId {
        let id = CentralId(self.next_central.fetch_add(1, Ordering::SeqCst));
        let _ = self.events_tx.send(AdapterEvent::CentralConnected(id));
        id
    }

    pub fn disconnect_central(&self, central: CentralId) {
        let _ = self.events_tx.send(AdapterEvent::CentralDisconnected(central));
    }

    async fn find_characteristic(&self, uuid: BleUuid) -> Option<Characteristic> {
        let services = self.services.lock().await;
        services
            .iter()
            .find_map(|s| s.characteristic(uuid))
            .cloned()
    }

    /// ATT read from `central`, starting at `offset`.
    pub async fn read(
        &self,
        central: CentralId,
        uuid: impl Into<BleUuid>,
        offset: u16,
    ) -> Result<Vec<u8>, AttStatus> {
        let uuid = uuid.into();
        let characteristic = self
            .find_characteristic(uuid)
            .await
            .ok_or(AttStatus::INVALID_HANDLE)?;
        let req = ReadRequest {
            request: Request {
                central,
                characteristic: uuid,
            },
            offset,
            cap: self.mtu - 1,
        };
        characteristic.read(&req)
    }

    /// ATT write request from `central`.
    pub async fn write(&self, central: CentralId, uuid: impl Into<BleUuid>, data: &[u8]) -> AttStatus {
        let uuid = uuid.into();
        match self.find_characteristic(uuid).await {
            Some(characteristic) => {
                let req = Request {
                    central,
                    characteristic: uuid,
                };
                characteristic.write(&req, data)
            }
            None => AttStatus::INVALID_HANDLE,
        }
    }

    /// `central` enables notifications; values arrive on the returned channel.
    /// Dropping the receiver acts as unsubscribing.
    pub async fn subscribe(
        &self,
        central: CentralId,
        uuid: impl Into<BleUuid>,
    ) -> Result<mpsc::Receiver<Notification>, AttStatus> {
        let (tx, rx) = mpsc::channel(16);
        self.subscribe_with(central, uuid, tx).await?;
        Ok(rx)
    }

    /// Like [`SimAdapter::subscribe`], but values are pushed into `tx`.
    /// A full channel holds the peripheral's notification task pending.
    pub async fn subscribe_with(
        &self,
        central: CentralId,
        uuid: impl Into<BleUuid>,
        tx: mpsc::Sender<Notification>,
    ) -> Result<(), AttStatus> {
        let uuid = uuid.into();
        let characteristic = self
            .find_characteristic(uuid)
            .await
            .ok_or(AttStatus::INVALID_HANDLE)?;
        let notifier = Notifier::new(central, uuid, self.mtu - 3, tx);
        let req = Request {
            central,
            characteristic: uuid,
        };
        match characteristic.subscribe(req, notifier) {
            status if status.is_success() => Ok(()),
            status => Err(status),
        }
    }

    fn default_reply(&self, opcode: u16) -> CommandReply {
        match opcode {
            OPCODE_READ_BD_ADDR => {
                let mut rsp = vec![0x00];
                rsp.extend_from_slice(&self.address.to_le_bytes());
                CommandReply::Bytes(rsp)
            }
            _ => CommandReply::Bytes(vec![STATUS_UNKNOWN_COMMAND]),
        }
    }
}

#[async_trait]
impl PeripheralTransport for SimAdapter {
    async fn open(&self) -> Result<(), BleError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BleError::TransportUnavailable(
                "simulated adapter is unavailable".to_string(),
            ))
        }
    }

    fn events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events_tx.subscribe()
    }

    async fn send_raw_command(&self, opcode: u16, params: &[u8]) -> Result<Vec<u8>, BleError> {
        let command = ControllerCommand {
            opcode,
            params: params.to_vec(),
        };
        self.commands.lock().await.push(command.encode());

        let reply = self.replies.lock().await.get(&opcode).cloned();
        match reply.unwrap_or_else(|| self.default_reply(opcode)) {
            CommandReply::Bytes(bytes) => Ok(bytes),
            CommandReply::Error(msg) => Err(BleError::GattError(msg)),
            CommandReply::Stall => std::future::pending().await,
        }
    }

    async fn add_service(&self, service: Arc<Service>) -> Result<(), BleError> {
        let mut services = self.services.lock().await;
        services.retain(|s| s.uuid() != service.uuid());
        services.push(service);
        Ok(())
    }

    async fn advertise(&self, packet: &AdvPacket) -> Result<(), BleError> {
        *self.advertisement.lock().await = Some(packet.clone());
        let _ = self.adv_tx.send(packet.as_bytes().to_vec());
        Ok(())
    }
}
