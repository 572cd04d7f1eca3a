//! YYC-DJ peripheral protocol: wire format, transport seam and controller

#[cfg(feature = "ble")]
mod btle;
mod client;
#[cfg(test)]
pub(crate) mod fake;
mod messages;
mod transport;

#[cfg(feature = "ble")]
pub use btle::BtleplugTransport;
pub use client::{ConnectionState, DeviceConfig, DeviceController, DeviceError, DEVICE_NAME};
pub use messages::*;
pub use transport::{Advertisement, Attribute, BleTransport, DiscoveryHandler, TransportError};
