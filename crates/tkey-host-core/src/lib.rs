//! Host-side client for a TKey running the U2F device app (spec.md §4.4).

pub mod connection;
pub mod der;
pub mod ops;

pub use connection::{ClientError, ClientState, DeviceClient, FirmwareLoader, IdleTimer, NoPortLocator, NoopFirmwareLoader, PortLocator};
