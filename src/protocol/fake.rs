//! Scripted in-memory transport for tests

use super::transport::{Advertisement, Attribute, BleTransport, DiscoveryHandler, TransportError};
use parking_lot::Mutex;
use uuid::Uuid;

pub(crate) const YYC_ID: u32 = 7;

pub(crate) const GENERIC_SERVICE: Uuid = Uuid::from_u128(0x0000_1801_0000_1000_8000_0080_5f9b_34fb);
pub(crate) const SHOCK_SERVICE: Uuid = Uuid::from_u128(0x0000_fff0_0000_1000_8000_0080_5f9b_34fb);
pub(crate) const SHOCK_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_fff1_0000_1000_8000_0080_5f9b_34fb);
pub(crate) const STATUS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_fff2_0000_1000_8000_0080_5f9b_34fb);

pub(crate) const SHOCK_CHARACTERISTIC: u16 = 10;
pub(crate) const STATUS_CHARACTERISTIC: u16 = 11;

#[derive(Default)]
struct FakeState {
    handler: Option<DiscoveryHandler<u32>>,
    advertise_on_start: bool,
    discovery_starts: usize,
    fail_services: bool,
    fail_write_at: Option<usize>,
    write_attempts: usize,
    opened: Vec<u32>,
    closed: usize,
    writes: Vec<(u16, Vec<u8>)>,
}

/// Peripheral layout: service 0 is generic attribute, service 1 carries the
/// shock characteristic (index 0) and a status characteristic (index 1).
pub(crate) struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    /// A YYC-DJ that is already advertising when discovery starts
    pub(crate) fn advertising() -> Self {
        Self {
            state: Mutex::new(FakeState {
                advertise_on_start: true,
                ..Default::default()
            }),
        }
    }

    /// Nothing advertises until [`FakeTransport::advertise`] is called
    pub(crate) fn quiet() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub(crate) fn advertise(&self, name: Option<&str>, id: u32) {
        let state = self.state.lock();
        if let Some(handler) = state.handler.as_ref() {
            handler(Advertisement {
                id,
                name: name.map(str::to_string),
            });
        }
    }

    pub(crate) fn is_discovering(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    pub(crate) fn discovery_starts(&self) -> usize {
        self.state.lock().discovery_starts
    }

    pub(crate) fn fail_services(&self, fail: bool) {
        self.state.lock().fail_services = fail;
    }

    /// Fail the write attempt with this zero-based ordinal, once
    pub(crate) fn fail_write_at(&self, attempt: usize) {
        let mut state = self.state.lock();
        state.fail_write_at = Some(state.write_attempts + attempt);
    }

    pub(crate) fn opened(&self) -> Vec<u32> {
        self.state.lock().opened.clone()
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub(crate) fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.state.lock().writes.clone()
    }
}

impl BleTransport for FakeTransport {
    type DeviceId = u32;
    type Link = u32;
    type Service = u16;
    type Characteristic = u16;

    async fn start_discovery(&self, handler: DiscoveryHandler<u32>) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.discovery_starts += 1;
        if state.advertise_on_start {
            handler(Advertisement {
                id: 3,
                name: Some("Headphones".to_string()),
            });
            handler(Advertisement {
                id: YYC_ID,
                name: Some("YYC-DJ".to_string()),
            });
        }
        state.handler = Some(handler);
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        self.state.lock().handler = None;
        Ok(())
    }

    async fn open(&self, id: &u32) -> Result<u32, TransportError> {
        self.state.lock().opened.push(*id);
        Ok(*id)
    }

    async fn services(&self, _link: &u32) -> Result<Vec<Attribute<u16>>, TransportError> {
        if self.state.lock().fail_services {
            return Err(TransportError::new("GATT status: unreachable"));
        }
        Ok(vec![
            Attribute {
                uuid: GENERIC_SERVICE,
                handle: 0,
            },
            Attribute {
                uuid: SHOCK_SERVICE,
                handle: 1,
            },
        ])
    }

    async fn characteristics(
        &self,
        _link: &u32,
        service: &u16,
    ) -> Result<Vec<Attribute<u16>>, TransportError> {
        match *service {
            1 => Ok(vec![
                Attribute {
                    uuid: SHOCK_CHARACTERISTIC_UUID,
                    handle: SHOCK_CHARACTERISTIC,
                },
                Attribute {
                    uuid: STATUS_CHARACTERISTIC_UUID,
                    handle: STATUS_CHARACTERISTIC,
                },
            ]),
            _ => Ok(vec![Attribute {
                uuid: Uuid::from_u128(0x0000_2a05_0000_1000_8000_0080_5f9b_34fb),
                handle: 1,
            }]),
        }
    }

    async fn write(
        &self,
        _link: &u32,
        characteristic: &u16,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let attempt = state.write_attempts;
        state.write_attempts += 1;
        if state.fail_write_at == Some(attempt) {
            state.fail_write_at = None;
            return Err(TransportError::new("write not acknowledged"));
        }
        state.writes.push((*characteristic, payload.to_vec()));
        Ok(())
    }

    async fn close(&self, _link: &u32) -> Result<(), TransportError> {
        self.state.lock().closed += 1;
        Ok(())
    }
}
