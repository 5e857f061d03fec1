//! GATT service registry
//!
//! A passive declaration of services, characteristics and the handlers
//! bound to them. The registry does no dispatching of its own: the
//! transport looks up a characteristic and calls [`Characteristic::read`],
//! [`Characteristic::write`] or [`Characteristic::subscribe`] when a
//! central's request arrives.

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::transport::CentralId;
use super::uuid::BleUuid;
use super::BleError;

/// ATT status byte returned to the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttStatus(pub u8);

impl AttStatus {
    pub const SUCCESS: AttStatus = AttStatus(0x00);
    pub const INVALID_HANDLE: AttStatus = AttStatus(0x01);
    pub const READ_NOT_PERMITTED: AttStatus = AttStatus(0x02);
    pub const WRITE_NOT_PERMITTED: AttStatus = AttStatus(0x03);
    pub const REQUEST_NOT_SUPPORTED: AttStatus = AttStatus(0x06);
    pub const INVALID_OFFSET: AttStatus = AttStatus(0x07);
    pub const INVALID_ATTRIBUTE_VALUE_LENGTH: AttStatus = AttStatus(0x0D);
    pub const UNLIKELY_ERROR: AttStatus = AttStatus(0x0E);

    pub fn is_success(&self) -> bool {
        *self == AttStatus::SUCCESS
    }
}

impl fmt::Display for AttStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Characteristic property bits, as advertised in the declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Properties(pub u8);

impl Properties {
    pub const BROADCAST: Properties = Properties(0x01);
    pub const READ: Properties = Properties(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Properties = Properties(0x04);
    pub const WRITE: Properties = Properties(0x08);
    pub const NOTIFY: Properties = Properties(0x10);
    pub const INDICATE: Properties = Properties(0x20);

    pub fn contains(&self, other: Properties) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Properties {
    type Output = Properties;

    fn bitor(self, rhs: Properties) -> Properties {
        Properties(self.0 | rhs.0)
    }
}

/// Who is asking, and about which characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub central: CentralId,
    pub characteristic: BleUuid,
}

/// A read request: the value is served from `offset`, at most `cap` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub request: Request,
    pub offset: u16,
    pub cap: usize,
}

/// Collects the value a read handler produces.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    buf: Vec<u8>,
    status: Option<AttStatus>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, data: &[u8]) -> usize {
        self.buf.extend_from_slice(data);
        data.len()
    }

    pub fn set_status(&mut self, status: AttStatus) {
        self.status = Some(status);
    }

    pub fn status(&self) -> AttStatus {
        self.status.unwrap_or(AttStatus::SUCCESS)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// A value pushed to a subscribed central.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub central: CentralId,
    pub characteristic: BleUuid,
    pub value: Vec<u8>,
}

/// Handed to a notify handler when a central subscribes.
#[derive(Debug, Clone)]
pub struct Notifier {
    central: CentralId,
    characteristic: BleUuid,
    cap: usize,
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn new(
        central: CentralId,
        characteristic: BleUuid,
        cap: usize,
        tx: mpsc::Sender<Notification>,
    ) -> Self {
        Self {
            central,
            characteristic,
            cap,
            tx,
        }
    }

    /// Largest value a single notification can carry.
    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn central(&self) -> CentralId {
        self.central
    }

    /// Whether the subscriber has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Push one value to the central.
    pub async fn write(&self, data: &[u8]) -> Result<usize, BleError> {
        if data.len() > self.cap {
            return Err(BleError::MtuExceeded {
                size: data.len(),
                mtu: self.cap,
            });
        }
        let notification = Notification {
            central: self.central,
            characteristic: self.characteristic,
            value: data.to_vec(),
        };
        self.tx
            .send(notification)
            .await
            .map_err(|_| BleError::Disconnected)?;
        Ok(data.len())
    }
}

pub type ReadHandler = Arc<dyn Fn(&ReadRequest, &mut ResponseWriter) + Send + Sync>;
pub type WriteHandler = Arc<dyn Fn(&Request, &[u8]) -> AttStatus + Send + Sync>;
pub type NotifyHandler = Arc<dyn Fn(Request, Notifier) + Send + Sync>;

/// A characteristic and the handlers bound to it.
#[derive(Clone)]
pub struct Characteristic {
    uuid: BleUuid,
    read: Option<ReadHandler>,
    write: Option<WriteHandler>,
    notify: Option<NotifyHandler>,
}

impl Characteristic {
    fn new(uuid: BleUuid) -> Self {
        Self {
            uuid,
            read: None,
            write: None,
            notify: None,
        }
    }

    pub fn uuid(&self) -> BleUuid {
        self.uuid
    }

    /// Properties implied by the bound handlers.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::default();
        if self.read.is_some() {
            props = props | Properties::READ;
        }
        if self.write.is_some() {
            props = props | Properties::WRITE;
        }
        if self.notify.is_some() {
            props = props | Properties::NOTIFY | Properties::INDICATE;
        }
        props
    }

    fn already_bound(&self, operation: &'static str) -> BleError {
        BleError::HandlerAlreadyBound {
            characteristic: self.uuid,
            operation,
        }
    }

    pub fn handle_read_func<F>(&mut self, f: F) -> Result<&mut Self, BleError>
    where
        F: Fn(&ReadRequest, &mut ResponseWriter) + Send + Sync + 'static,
    {
        if self.read.is_some() {
            return Err(self.already_bound("read"));
        }
        self.read = Some(Arc::new(f));
        Ok(self)
    }

    pub fn handle_write_func<F>(&mut self, f: F) -> Result<&mut Self, BleError>
    where
        F: Fn(&Request, &[u8]) -> AttStatus + Send + Sync + 'static,
    {
        if self.write.is_some() {
            return Err(self.already_bound("write"));
        }
        self.write = Some(Arc::new(f));
        Ok(self)
    }

    pub fn handle_notify_func<F>(&mut self, f: F) -> Result<&mut Self, BleError>
    where
        F: Fn(Request, Notifier) + Send + Sync + 'static,
    {
        if self.notify.is_some() {
            return Err(self.already_bound("notify"));
        }
        self.notify = Some(Arc::new(f));
        Ok(self)
    }

    /// Serve a read: run the handler, then apply the request's offset and cap.
    pub fn read(&self, req: &ReadRequest) -> Result<Vec<u8>, AttStatus> {
        let handler = self.read.as_ref().ok_or(AttStatus::READ_NOT_PERMITTED)?;
        let mut rsp = ResponseWriter::new();
        handler(req, &mut rsp);

        let status = rsp.status();
        if !status.is_success() {
            return Err(status);
        }
        let value = rsp.into_bytes();
        let offset = req.offset as usize;
        if offset > value.len() {
            return Err(AttStatus::INVALID_OFFSET);
        }
        let end = offset.saturating_add(req.cap).min(value.len());
        Ok(value[offset..end].to_vec())
    }

    pub fn write(&self, req: &Request, data: &[u8]) -> AttStatus {
        match &self.write {
            Some(handler) => handler(req, data),
            None => AttStatus::WRITE_NOT_PERMITTED,
        }
    }

    /// A central enabled notifications or indications.
    pub fn subscribe(&self, req: Request, notifier: Notifier) -> AttStatus {
        match &self.notify {
            Some(handler) => {
                handler(req, notifier);
                AttStatus::SUCCESS
            }
            None => AttStatus::REQUEST_NOT_SUPPORTED,
        }
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid)
            .field("properties", &self.properties())
            .finish()
    }
}

/// A primary service and its characteristics, in enumeration order.
#[derive(Debug, Clone)]
pub struct Service {
    uuid: BleUuid,
    characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: impl Into<BleUuid>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics: Vec::new(),
        }
    }

    pub fn uuid(&self) -> BleUuid {
        self.uuid
    }

    /// Add a characteristic and return it for handler binding.
    pub fn add_characteristic(&mut self, uuid: impl Into<BleUuid>) -> &mut Characteristic {
        self.characteristics.push(Characteristic::new(uuid.into()));
        let last = self.characteristics.len() - 1;
        &mut self.characteristics[last]
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub fn characteristic(&self, uuid: BleUuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uuid: u16) -> Request {
        Request {
            central: CentralId(1),
            characteristic: BleUuid::Uuid16(uuid),
        }
    }

    fn read_request(uuid: u16, offset: u16, cap: usize) -> ReadRequest {
        ReadRequest {
            request: request(uuid),
            offset,
            cap,
        }
    }

    #[test]
    fn test_characteristics_keep_insertion_order() {
        let mut service = Service::new(0xFEE7u16);
        service.add_characteristic(0xFEA1u16);
        service.add_characteristic(0xFEA2u16);
        service.add_characteristic(0xFEC9u16);

        let uuids: Vec<BleUuid> = service.characteristics().iter().map(|c| c.uuid()).collect();
        assert_eq!(
            uuids,
            vec![
                BleUuid::Uuid16(0xFEA1),
                BleUuid::Uuid16(0xFEA2),
                BleUuid::Uuid16(0xFEC9)
            ]
        );
    }

    #[test]
    fn test_properties_follow_handlers() {
        let mut service = Service::new(0xFEE7u16);
        service
            .add_characteristic(0xFEA2u16)
            .handle_read_func(|_, rsp| {
                rsp.write(&[1]);
            })
            .unwrap()
            .handle_write_func(|_, _| AttStatus::SUCCESS)
            .unwrap();

        let props = service.characteristic(BleUuid::Uuid16(0xFEA2)).unwrap().properties();
        assert!(props.contains(Properties::READ));
        assert!(props.contains(Properties::WRITE));
        assert!(!props.contains(Properties::NOTIFY));
    }

    #[test]
    fn test_second_bind_is_an_error() {
        let mut service = Service::new(0xFEE7u16);
        let c = service.add_characteristic(0xFEA1u16);
        c.handle_read_func(|_, _| {}).unwrap();
        let err = c.handle_read_func(|_, _| {}).err().unwrap();
        assert!(matches!(err, BleError::HandlerAlreadyBound { operation: "read", .. }));
    }

    #[test]
    fn test_missing_handlers_reject() {
        let mut service = Service::new(0xFEE7u16);
        service.add_characteristic(0xFEC9u16);
        let c = service.characteristic(BleUuid::Uuid16(0xFEC9)).unwrap();

        assert_eq!(c.read(&read_request(0xFEC9, 0, 22)), Err(AttStatus::READ_NOT_PERMITTED));
        assert_eq!(c.write(&request(0xFEC9), &[0; 4]), AttStatus::WRITE_NOT_PERMITTED);

        let (tx, _rx) = mpsc::channel(1);
        let notifier = Notifier::new(CentralId(1), BleUuid::Uuid16(0xFEC9), 20, tx);
        assert_eq!(c.subscribe(request(0xFEC9), notifier), AttStatus::REQUEST_NOT_SUPPORTED);
    }

    #[test]
    fn test_read_applies_offset_and_cap() {
        let mut service = Service::new(0xFEE7u16);
        service
            .add_characteristic(0xFEC9u16)
            .handle_read_func(|_, rsp| {
                rsp.write(&[1, 2, 3, 4, 5, 6]);
            })
            .unwrap();
        let c = service.characteristic(BleUuid::Uuid16(0xFEC9)).unwrap();

        assert_eq!(c.read(&read_request(0xFEC9, 0, 22)).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(c.read(&read_request(0xFEC9, 2, 22)).unwrap(), vec![3, 4, 5, 6]);
        assert_eq!(c.read(&read_request(0xFEC9, 1, 2)).unwrap(), vec![2, 3]);
        assert_eq!(c.read(&read_request(0xFEC9, 6, 22)).unwrap(), Vec::<u8>::new());
        assert_eq!(c.read(&read_request(0xFEC9, 7, 22)), Err(AttStatus::INVALID_OFFSET));
    }

    #[test]
    fn test_read_handler_status_is_propagated() {
        let mut service = Service::new(0xFEE7u16);
        service
            .add_characteristic(0xFEA1u16)
            .handle_read_func(|_, rsp| rsp.set_status(AttStatus::UNLIKELY_ERROR))
            .unwrap();
        let c = service.characteristic(BleUuid::Uuid16(0xFEA1)).unwrap();
        assert_eq!(c.read(&read_request(0xFEA1, 0, 22)), Err(AttStatus::UNLIKELY_ERROR));
    }

    #[tokio::test]
    async fn test_notifier_enforces_cap() {
        let (tx, mut rx) = mpsc::channel(4);
        let notifier = Notifier::new(CentralId(3), BleUuid::Uuid16(0xFEA1), 4, tx);

        assert_eq!(notifier.write(&[1, 2, 3, 4]).await.unwrap(), 4);
        let result = notifier.write(&[0; 5]).await;
        assert!(matches!(result, Err(BleError::MtuExceeded { size: 5, mtu: 4 })));

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.central, CentralId(3));
        assert_eq!(sent.value, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_notifier_fails_after_unsubscribe() {
        let (tx, rx) = mpsc::channel(4);
        let notifier = Notifier::new(CentralId(3), BleUuid::Uuid16(0xFEA1), 20, tx);
        drop(rx);
        assert!(notifier.is_closed());
        assert!(matches!(notifier.write(&[1]).await, Err(BleError::Disconnected)));
    }
}
