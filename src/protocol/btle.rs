//! [`BleTransport`] on top of btleplug

use super::transport::{Advertisement, Attribute, BleTransport, DiscoveryHandler, TransportError};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        TransportError(e.to_string())
    }
}

/// Host Bluetooth adapter driven through btleplug
pub struct BtleplugTransport {
    adapter: Adapter,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugTransport {
    /// Use the first Bluetooth adapter reported by the OS
    pub async fn first_adapter() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::new("No Bluetooth adapter found"))?;

        match adapter.adapter_info().await {
            Ok(info) => log::info!("Using Bluetooth adapter {}", info),
            Err(e) => log::debug!("Adapter info unavailable: {}", e),
        }

        Ok(Self {
            adapter,
            watcher: Mutex::new(None),
        })
    }
}

impl BleTransport for BtleplugTransport {
    type DeviceId = PeripheralId;
    type Link = Peripheral;
    type Service = Service;
    type Characteristic = Characteristic;

    async fn start_discovery(
        &self,
        handler: DiscoveryHandler<PeripheralId>,
    ) -> Result<(), TransportError> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let name = match adapter.peripheral(&id).await {
                    Ok(peripheral) => match peripheral.properties().await {
                        Ok(props) => props.and_then(|p| p.local_name),
                        Err(e) => {
                            log::debug!("No properties for {:?}: {}", id, e);
                            None
                        }
                    },
                    Err(e) => {
                        log::debug!("Peripheral {:?} vanished: {}", id, e);
                        continue;
                    }
                };
                handler(Advertisement { id, name });
            }
            log::debug!("Discovery event stream ended");
        });

        if let Some(previous) = self.watcher.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        let task = self.watcher.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn open(&self, id: &PeripheralId) -> Result<Peripheral, TransportError> {
        let peripheral = self.adapter.peripheral(id).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(peripheral)
    }

    async fn services(
        &self,
        link: &Peripheral,
    ) -> Result<Vec<Attribute<Service>>, TransportError> {
        link.discover_services().await?;
        Ok(link
            .services()
            .into_iter()
            .filter(|s| s.primary)
            .map(|s| Attribute {
                uuid: s.uuid,
                handle: s,
            })
            .collect())
    }

    async fn characteristics(
        &self,
        _link: &Peripheral,
        service: &Service,
    ) -> Result<Vec<Attribute<Characteristic>>, TransportError> {
        Ok(service
            .characteristics
            .iter()
            .cloned()
            .map(|c| Attribute {
                uuid: c.uuid,
                handle: c,
            })
            .collect())
    }

    async fn write(
        &self,
        link: &Peripheral,
        characteristic: &Characteristic,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        link.write(characteristic, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn close(&self, link: &Peripheral) -> Result<(), TransportError> {
        link.disconnect().await?;
        Ok(())
    }
}
