//! Service registration and advertising layout for the Weixin profile

use std::sync::Arc;

use crate::ble::advertising::AdvPacket;
use crate::ble::command::DeviceAddress;
use crate::ble::gatt::{AttStatus, Notifier, Service};
use crate::ble::BleError;
use crate::peripheral::config::{AddressFailurePolicy, PeripheralConfig};
use crate::peripheral::context::DeviceContext;
use crate::peripheral::notify::NotifyPool;

use super::pedometer::VALUE_LEN;
use super::{
    ADV_FLAGS, WX_CH_PEDOMETER_UUID, WX_CH_READ_UUID, WX_CH_TARGET_UUID, WX_SERVICE_UUID,
};

async fn indicate(notifier: Notifier, value: [u8; VALUE_LEN], name: &'static str) {
    match notifier.write(&value).await {
        Ok(_) => log::info!("Indicate: {} characteristic", name),
        Err(e) => log::warn!(
            "Indicate: {} characteristic to {} failed: {}",
            name,
            notifier.central(),
            e
        ),
    }
}

/// Build the Weixin service with every handler bound.
///
/// Handlers share `ctx`; notifications run on `pool`.
pub fn build_service(ctx: &Arc<DeviceContext>, pool: &Arc<NotifyPool>) -> Result<Service, BleError> {
    let mut service = Service::new(WX_SERVICE_UUID);

    let read_ctx = Arc::clone(ctx);
    let notify_ctx = Arc::clone(ctx);
    let notify_pool = Arc::clone(pool);
    service
        .add_characteristic(WX_CH_PEDOMETER_UUID)
        .handle_read_func(move |req, rsp| {
            log::info!("Read: pedometer characteristic ({})", req.request.central);
            rsp.write(&read_ctx.pedometer.steps_bytes());
        })?
        .handle_notify_func(move |_, notifier| {
            let ctx = Arc::clone(&notify_ctx);
            notify_pool.spawn(async move {
                indicate(notifier, ctx.pedometer.steps_bytes(), "pedometer").await;
            });
        })?;

    let read_ctx = Arc::clone(ctx);
    let write_ctx = Arc::clone(ctx);
    let notify_ctx = Arc::clone(ctx);
    let notify_pool = Arc::clone(pool);
    service
        .add_characteristic(WX_CH_TARGET_UUID)
        .handle_read_func(move |req, rsp| {
            log::info!("Read: target characteristic ({})", req.request.central);
            rsp.write(&read_ctx.pedometer.target_bytes());
        })?
        .handle_notify_func(move |_, notifier| {
            let ctx = Arc::clone(&notify_ctx);
            notify_pool.spawn(async move {
                indicate(notifier, ctx.pedometer.target_bytes(), "target").await;
            });
        })?
        .handle_write_func(move |req, data| match write_ctx.pedometer.write_target(data) {
            Ok(target) => {
                log::info!("Wrote target characteristic: {}", target);
                AttStatus::SUCCESS
            }
            Err(e) => {
                log::warn!("Rejected target write from {}: {}", req.central, e);
                AttStatus::INVALID_ATTRIBUTE_VALUE_LENGTH
            }
        })?;

    let read_ctx = Arc::clone(ctx);
    service
        .add_characteristic(WX_CH_READ_UUID)
        .handle_read_func(move |req, rsp| {
            log::info!("Read: read characteristic ({})", req.request.central);
            let address = read_ctx.address().unwrap_or(DeviceAddress::UNRESOLVED);
            rsp.write(address.as_bytes());
        })?;

    Ok(service)
}

/// Lay out the advertising payload: flags, service UUID, name, then the
/// device address as manufacturer data.
pub fn build_advertisement(
    service: &Service,
    config: &PeripheralConfig,
    address: Option<DeviceAddress>,
) -> AdvPacket {
    let mut packet = AdvPacket::new();
    packet.append_flags(ADV_FLAGS);
    packet.append_uuid_fit(&[service.uuid()]);
    packet.append_name(&config.device_name);

    match (address, config.address_failure) {
        (Some(address), _) => packet.append_manufacturer_data(config.company_id, address.as_bytes()),
        (None, AddressFailurePolicy::AdvertiseZeroAddress) => {
            packet.append_manufacturer_data(config.company_id, DeviceAddress::UNRESOLVED.as_bytes())
        }
        (None, AddressFailurePolicy::OmitManufacturerData) => {
            log::warn!("Device address unresolved, advertising without manufacturer data");
        }
    }
    packet
}
