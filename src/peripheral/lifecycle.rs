//! Peripheral lifecycle: power-on bring-up and event handling
//!
//! Listens to adapter events and walks the device through
//! `Unpowered → PoweredOn → Advertising`. Bring-up resolves the device
//! address, registers the Weixin service and starts advertising, in that
//! order. Connection events are logged; they never change state.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::ble::command::read_device_address;
use crate::ble::transport::{AdapterEvent, AdapterState, CentralId, PeripheralTransport};
use crate::ble::BleError;
use crate::weixin::{build_advertisement, build_service, PedometerState};

use super::config::PeripheralConfig;
use super::context::DeviceContext;
use super::notify::NotifyPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralState {
    Unpowered,
    PoweredOn,
    Advertising,
}

impl fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeripheralState::Unpowered => "Unpowered",
            PeripheralState::PoweredOn => "PoweredOn",
            PeripheralState::Advertising => "Advertising",
        };
        f.write_str(name)
    }
}

/// A Weixin pedometer peripheral running on some transport.
pub struct Peripheral {
    config: PeripheralConfig,
    transport: Arc<dyn PeripheralTransport>,
    context: Arc<DeviceContext>,
    notify_pool: Arc<NotifyPool>,
    state_tx: watch::Sender<PeripheralState>,
    /// Only one central is served at a time; this is the one we last saw.
    central: Mutex<Option<CentralId>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Peripheral {
    pub fn new(config: PeripheralConfig, transport: Arc<dyn PeripheralTransport>) -> Arc<Self> {
        let pedometer = PedometerState::new(config.initial_steps, config.initial_target);
        let (state_tx, _) = watch::channel(PeripheralState::Unpowered);
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            config,
            transport,
            context: Arc::new(DeviceContext::new(pedometer)),
            notify_pool: NotifyPool::new(),
            state_tx,
            central: Mutex::new(None),
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    /// Shared pedometer values and device address. The step count is fed
    /// through here by whatever sensor drives the device.
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    pub fn notify_pool(&self) -> &Arc<NotifyPool> {
        &self.notify_pool
    }

    pub fn state(&self) -> PeripheralState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<PeripheralState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: PeripheralState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::debug!("Peripheral state: {} -> {}", previous, state);
        }
    }

    /// Open the transport and start reacting to adapter events.
    ///
    /// Failing to open the transport is the one fatal startup error.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, BleError> {
        self.transport.open().await.map_err(|e| match e {
            e @ BleError::TransportUnavailable(_) => e,
            other => BleError::TransportUnavailable(other.to_string()),
        })?;

        // Transports may dispatch subscriptions from their own threads.
        self.notify_pool.bind_runtime(tokio::runtime::Handle::current());

        let mut events = self.transport.events();
        let mut shutdown = self.shutdown_tx.subscribe();
        let peripheral = Arc::clone(self);
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = events.recv() => match result {
                        Ok(event) => peripheral.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Dropped {} adapter events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            log::debug!("Peripheral event loop stopped");
        }))
    }

    /// Stop the event loop and cancel outstanding notifications.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        self.notify_pool.cancel_all();
    }

    pub async fn handle_event(&self, event: AdapterEvent) {
        match event {
            AdapterEvent::StateChanged(state) => self.on_state_changed(state).await,
            AdapterEvent::CentralConnected(central) => self.on_connected(central),
            AdapterEvent::CentralDisconnected(central) => self.on_disconnected(central),
        }
    }

    async fn on_state_changed(&self, state: AdapterState) {
        log::info!("State: {}", state);
        match state {
            AdapterState::PoweredOn => {
                let claimed = self.state_tx.send_if_modified(|current| {
                    if *current == PeripheralState::Unpowered {
                        *current = PeripheralState::PoweredOn;
                        true
                    } else {
                        false
                    }
                });
                if !claimed {
                    log::info!("Already powered on ({}), ignoring", self.state());
                    return;
                }
                log::debug!(
                    "Peripheral state: {} -> {}",
                    PeripheralState::Unpowered,
                    PeripheralState::PoweredOn
                );
                match self.bring_up().await {
                    Ok(()) => self.set_state(PeripheralState::Advertising),
                    Err(e) => log::error!("Bring-up failed: {}", e),
                }
            }
            AdapterState::PoweredOff => {
                let cancelled = self.notify_pool.cancel_all();
                if cancelled > 0 {
                    log::info!("Cancelled {} pending notifications", cancelled);
                }
                self.set_state(PeripheralState::Unpowered);
            }
            other => log::warn!("{}", BleError::UnhandledState(other)),
        }
    }

    /// Resolve the address, register the service, advertise.
    async fn bring_up(&self) -> Result<(), BleError> {
        let address =
            match read_device_address(self.transport.as_ref(), self.config.command_timeout()).await {
                Ok(address) => {
                    log::info!("BD Addr: {}", address);
                    Some(address)
                }
                Err(e) => {
                    log::warn!("Failed to read device address: {}", e);
                    None
                }
            };
        self.context.set_address(address);

        let service = Arc::new(build_service(&self.context, &self.notify_pool)?);
        self.transport.add_service(Arc::clone(&service)).await?;

        let packet = build_advertisement(&service, &self.config, address);
        log::info!("Advertising: {}", hex::encode(packet.as_bytes()));
        self.transport.advertise(&packet).await
    }

    fn on_connected(&self, central: CentralId) {
        log::info!("Connect: {}", central);
        let mut current = self.central.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = *current {
            log::warn!(
                "{} connected while {} is still connected; only one central is supported",
                central,
                existing
            );
        }
        *current = Some(central);
    }

    fn on_disconnected(&self, central: CentralId) {
        log::info!("Disconnect: {}", central);
        let mut current = self.central.lock().unwrap_or_else(|e| e.into_inner());
        if *current == Some(central) {
            *current = None;
            let cancelled = self.notify_pool.cancel_all();
            if cancelled > 0 {
                log::info!("Cancelled {} pending notifications", cancelled);
            }
        }
    }

    /// The central currently being served, if any.
    pub fn connected_central(&self) -> Option<CentralId> {
        *self.central.lock().unwrap_or_else(|e| e.into_inner())
    }
}
