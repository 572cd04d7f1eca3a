//! Connection state machine and command writer for the YYC-DJ peripheral

use super::messages::{Channel, ShockCommand};
use super::transport::{Attribute, BleTransport, DiscoveryHandler, TransportError};
use crate::report::Reporter;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Advertised name of the supported peripheral
pub const DEVICE_NAME: &str = "YYC-DJ";

/// Controller errors
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("Bluetooth error: {0}")]
    Transport(#[from] TransportError),

    #[error("No device named {name} found within {waited:?}")]
    DiscoveryTimeout { name: String, waited: Duration },

    #[error("Discovery ended before a device was found")]
    DiscoveryAborted,

    #[error("Request services failed: {0}")]
    ServiceResolution(String),

    #[error("Request characteristics failed: {0}")]
    CharacteristicResolution(String),

    #[error("Write to channel {channel} failed: {source}")]
    WriteFailed {
        channel: Channel,
        source: TransportError,
    },
}

/// Peripheral selection and attribute layout
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Exact advertised name to connect to
    pub name: String,

    /// Shock service UUID; when unset the service is picked by position
    pub service_uuid: Option<Uuid>,

    /// Shock characteristic UUID; when unset it is picked by position
    pub characteristic_uuid: Option<Uuid>,

    /// Position of the shock service in the enumerated primary services
    pub service_index: usize,

    /// Position of the shock characteristic within its service
    pub characteristic_index: usize,

    /// Discovery timeout in seconds (0 = wait forever)
    pub discovery_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEVICE_NAME.to_string(),
            service_uuid: None,
            characteristic_uuid: None,
            service_index: 1,
            characteristic_index: 0,
            discovery_timeout_secs: 30,
        }
    }
}

impl DeviceConfig {
    pub fn discovery_timeout(&self) -> Option<Duration> {
        match self.discovery_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Connection progress. Steps only move forward; a failed step leaves the
/// controller where it stopped until `connect` or `disconnect` is called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Discovering,
    Matched,
    Connecting,
    ServicesResolved,
    CharacteristicResolved,
    Ready,
}

/// Open link plus the characteristic commands are written to
struct ShockTarget<T: BleTransport> {
    link: T::Link,
    characteristic: T::Characteristic,
}

/// Controller for one YYC-DJ peripheral
pub struct DeviceController<T: BleTransport> {
    transport: Arc<T>,
    config: DeviceConfig,
    reporter: Reporter,
    state: Mutex<ConnectionState>,
    target: Mutex<Option<Arc<ShockTarget<T>>>>,
    connect_gate: tokio::sync::Mutex<()>,
    attempts: Mutex<AttemptRecord>,
}

/// Outcome of the most recent finished connect attempt
#[derive(Default)]
struct AttemptRecord {
    generation: u64,
    failure: Option<DeviceError>,
}

impl<T: BleTransport> DeviceController<T> {
    /// Create a disconnected controller
    pub fn new(transport: Arc<T>, config: DeviceConfig, reporter: Reporter) -> Self {
        Self {
            transport,
            config,
            reporter,
            state: Mutex::new(ConnectionState::Disconnected),
            target: Mutex::new(None),
            connect_gate: tokio::sync::Mutex::new(()),
            attempts: Mutex::new(AttemptRecord::default()),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Check if commands will be written
    pub fn is_ready(&self) -> bool {
        self.target.lock().is_some()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        log::debug!("Device state {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Discover, connect and resolve the shock characteristic.
    ///
    /// Returns at once when already ready. Concurrent callers share a single
    /// attempt: later callers wait for the first and then observe its result.
    pub async fn connect(&self) -> Result<(), DeviceError> {
        if self.is_ready() {
            return Ok(());
        }

        let seen = self.attempts.lock().generation;
        let _gate = self.connect_gate.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        {
            let record = self.attempts.lock();
            if record.generation != seen {
                if let Some(failure) = &record.failure {
                    log::debug!("Sharing failed connect attempt: {}", failure);
                    return Err(failure.clone());
                }
            }
        }

        let outcome = self.attempt().await;

        let mut record = self.attempts.lock();
        record.generation += 1;
        record.failure = outcome.as_ref().err().cloned();
        outcome
    }

    async fn attempt(&self) -> Result<(), DeviceError> {
        let id = self.discover().await?;

        self.set_state(ConnectionState::Connecting);
        self.reporter.line(format!(
            "Connecting Device {} [{:?}]...",
            self.config.name, id
        ));
        let link = self.transport.open(&id).await?;
        self.reporter.line("Connected");

        match self.resolve_characteristic(&link).await {
            Ok(characteristic) => {
                *self.target.lock() = Some(Arc::new(ShockTarget {
                    link,
                    characteristic,
                }));
                self.set_state(ConnectionState::Ready);
                self.reporter.line("Device Ready!");
                Ok(())
            }
            Err(e) => {
                log::error!("Attribute resolution failed: {}", e);
                if let Err(close_err) = self.transport.close(&link).await {
                    log::warn!("Failed to close link after error: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Scan until the first advertisement with the configured name
    async fn discover(&self) -> Result<T::DeviceId, DeviceError> {
        let (found_tx, found_rx) = oneshot::channel();
        let found_tx = Mutex::new(Some(found_tx));
        let target = self.config.name.clone();
        let reporter = self.reporter.clone();

        let handler: DiscoveryHandler<T::DeviceId> = Box::new(move |adv| {
            if adv.name.as_deref() != Some(target.as_str()) {
                return;
            }
            // Only the first match is handed over
            if let Some(tx) = found_tx.lock().take() {
                reporter.line(format!("{} Found! deviceid: {:?}", target, adv.id));
                let _ = tx.send(adv.id);
            }
        });

        self.set_state(ConnectionState::Discovering);
        self.reporter
            .line(format!("Searching Device {}...", self.config.name));
        self.transport.start_discovery(handler).await?;

        let found = match self.config.discovery_timeout() {
            Some(limit) => match tokio::time::timeout(limit, found_rx).await {
                Ok(received) => received.map_err(|_| DeviceError::DiscoveryAborted),
                Err(_) => Err(DeviceError::DiscoveryTimeout {
                    name: self.config.name.clone(),
                    waited: limit,
                }),
            },
            None => found_rx.await.map_err(|_| DeviceError::DiscoveryAborted),
        };

        if let Err(e) = self.transport.stop_discovery().await {
            log::warn!("Failed to stop discovery: {}", e);
        }

        let id = found?;
        self.set_state(ConnectionState::Matched);
        Ok(id)
    }

    async fn resolve_characteristic(
        &self,
        link: &T::Link,
    ) -> Result<T::Characteristic, DeviceError> {
        self.reporter.line("Requesting services...");
        let services = self
            .transport
            .services(link)
            .await
            .map_err(|e| DeviceError::ServiceResolution(e.to_string()))?;
        let service = select_attribute(
            services,
            self.config.service_uuid,
            self.config.service_index,
        )
        .map_err(DeviceError::ServiceResolution)?;
        self.set_state(ConnectionState::ServicesResolved);

        self.reporter.line("Requesting Characteristics...");
        let characteristics = self
            .transport
            .characteristics(link, &service.handle)
            .await
            .map_err(|e| DeviceError::CharacteristicResolution(e.to_string()))?;
        let characteristic = select_attribute(
            characteristics,
            self.config.characteristic_uuid,
            self.config.characteristic_index,
        )
        .map_err(DeviceError::CharacteristicResolution)?;
        self.set_state(ConnectionState::CharacteristicResolved);

        Ok(characteristic.handle)
    }

    /// Write channel A's command, then channel B's.
    ///
    /// Returns `Ok(false)` without writing when the controller is not ready.
    /// A failed write aborts the call; a command already written stays written.
    pub async fn shock(&self, a: ShockCommand, b: ShockCommand) -> Result<bool, DeviceError> {
        let target = self.target.lock().clone();
        let Some(target) = target else {
            return Ok(false);
        };

        for cmd in [&a, &b] {
            if cmd.overflows() {
                log::warn!(
                    "Channel {} command exceeds field width (strength {}, freq {}); value wraps",
                    cmd.channel,
                    cmd.strength,
                    cmd.frequency
                );
            }
        }
        self.reporter
            .line(format!("{}, {}", a.to_hex(), b.to_hex()));

        for cmd in [a, b] {
            self.transport
                .write(&target.link, &target.characteristic, &cmd.encode())
                .await
                .map_err(|source| DeviceError::WriteFailed {
                    channel: cmd.channel,
                    source,
                })?;
        }

        Ok(true)
    }

    /// Release the link and return to `Disconnected`
    pub async fn disconnect(&self) -> Result<(), DeviceError> {
        let _gate = self.connect_gate.lock().await;
        let target = self.target.lock().take();
        self.set_state(ConnectionState::Disconnected);

        if let Some(target) = target {
            self.transport.close(&target.link).await?;
            self.reporter.line("Disconnected");
        }
        Ok(())
    }
}

/// Pick an attribute by UUID when one is configured, otherwise by position
fn select_attribute<H>(
    mut attributes: Vec<Attribute<H>>,
    uuid: Option<Uuid>,
    index: usize,
) -> Result<Attribute<H>, String> {
    match uuid {
        Some(uuid) => attributes
            .iter()
            .position(|a| a.uuid == uuid)
            .map(|pos| attributes.swap_remove(pos))
            .ok_or_else(|| format!("no attribute with UUID {}", uuid)),
        None if index < attributes.len() => Ok(attributes.swap_remove(index)),
        None => Err(format!(
            "index {} out of range ({} available)",
            index,
            attributes.len()
        )),
    }
}
