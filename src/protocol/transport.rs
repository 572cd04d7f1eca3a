//! Seam between the controller and the host Bluetooth LE stack
//!
//! The controller only needs four primitives: watch advertisements, open a
//! link, enumerate remote attributes and write one. Everything else about the
//! radio stack stays behind [`BleTransport`].

use std::fmt::Debug;
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by the underlying BLE stack
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Advertising report delivered while discovery is running
#[derive(Debug, Clone)]
pub struct Advertisement<Id> {
    pub id: Id,
    pub name: Option<String>,
}

/// Remote service or characteristic together with its stack handle
#[derive(Debug, Clone)]
pub struct Attribute<H> {
    pub uuid: Uuid,
    pub handle: H,
}

/// Callback invoked for each advertisement, on the stack's notification thread
pub type DiscoveryHandler<Id> = Box<dyn Fn(Advertisement<Id>) + Send + Sync>;

/// Host BLE stack primitives used by [`DeviceController`](super::DeviceController)
pub trait BleTransport: Send + Sync + 'static {
    /// Peripheral identifier reported by discovery
    type DeviceId: Clone + Debug + Send + Sync;

    /// Open logical connection
    type Link: Send + Sync;

    /// Primary service handle
    type Service: Send + Sync;

    /// Characteristic handle
    type Characteristic: Send + Sync;

    /// Start watching for advertising peripherals; `handler` runs per report.
    fn start_discovery(
        &self,
        handler: DiscoveryHandler<Self::DeviceId>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop the watch started by `start_discovery`
    fn stop_discovery(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Open a connection to a discovered peripheral
    fn open(
        &self,
        id: &Self::DeviceId,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;

    /// Primary services in the order the stack enumerates them
    fn services(
        &self,
        link: &Self::Link,
    ) -> impl Future<Output = Result<Vec<Attribute<Self::Service>>, TransportError>> + Send;

    /// Characteristics of one service in enumeration order
    fn characteristics(
        &self,
        link: &Self::Link,
        service: &Self::Service,
    ) -> impl Future<Output = Result<Vec<Attribute<Self::Characteristic>>, TransportError>> + Send;

    /// Write one value with response
    fn write(
        &self,
        link: &Self::Link,
        characteristic: &Self::Characteristic,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the connection
    fn close(&self, link: &Self::Link) -> impl Future<Output = Result<(), TransportError>> + Send;
}
