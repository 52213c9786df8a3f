//! # Printer Driver Layer
//!
//! This module defines the boundary between the session core and whatever
//! actually talks to the printer.
//!
//! ## Driver Model
//!
//! A [`Driver`] exposes four fire-and-forget operations. None of them return
//! an outcome: results arrive later as [`DriverEvent`]s on the channel the
//! driver was built with, in the order the driver produced them.
//!
//! | Operation | Resolved by |
//! |-----------|-------------|
//! | `discover_paired_devices` | `DeviceSetDiscovered` |
//! | `connect` | `LinkStateChanged(Connected \| Disconnected)` |
//! | `disconnect` | `LinkStateChanged(Disconnected)` |
//! | `transmit` | optionally `Other(RawMessage)` |
//!
//! ## Available Drivers
//!
//! - [`bluetooth`]: Bluetooth RFCOMM via BlueZ tools (Linux)
//! - [`mock`]: Scripted in-memory driver for tests and dry runs

pub mod bluetooth;
pub mod mock;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;

pub use bluetooth::RfcommDriver;
pub use mock::MockDriver;

/// `what` code of a direct-I/O completion message.
pub const MESSAGE_DIRECT_IO: i32 = 6;

/// Opaque identifier of a paired printer.
///
/// Normalised to uppercase so that set ordering and equality do not depend on
/// how the driver spells the address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Link state reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    /// A state code the session does not interpret (e.g. "connecting")
    Other(i32),
}

/// Payload attached to a raw driver message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Opaque(String),
}

/// A driver message the session has no specific handling for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub what: i32,
    pub arg1: i32,
    pub payload: Payload,
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Bytes(bytes) if !bytes.is_empty() => {
                write!(f, "message callback( {}-{}-{:02X?} )", self.what, self.arg1, bytes)
            }
            Payload::Opaque(s) if !s.is_empty() => {
                write!(f, "message callback( {}-{}-{} )", self.what, self.arg1, s)
            }
            _ => write!(f, "message callback( {}-{} )", self.what, self.arg1),
        }
    }
}

/// One entry of the driver's callback stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    DeviceSetDiscovered(BTreeSet<DeviceAddress>),
    LinkStateChanged(LinkState),
    Other(RawMessage),
}

/// Operations the session core needs from a printer driver.
///
/// Implementations must not block: long-running work belongs on a spawned
/// task that reports back through the event channel.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Ask for the set of already-paired candidate devices.
    async fn discover_paired_devices(&self);

    /// Open a link to `address`.
    async fn connect(&self, address: &DeviceAddress);

    /// Close the current link.
    async fn disconnect(&self);

    /// Send one command buffer over the open link.
    async fn transmit(&self, data: &[u8], wait_for_ack: bool);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_normalised() {
        assert_eq!(DeviceAddress::new(" aa:bb:cc:dd:ee:ff "), DeviceAddress::from("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_raw_message_display() {
        let empty = RawMessage { what: 1, arg1: 2, payload: Payload::Empty };
        assert_eq!(empty.to_string(), "message callback( 1-2 )");

        let bytes = RawMessage { what: 6, arg1: 5, payload: Payload::Bytes(vec![0x1D, 0x07]) };
        assert_eq!(bytes.to_string(), "message callback( 6-5-[1D, 07] )");

        let opaque = RawMessage { what: 3, arg1: 0, payload: Payload::Opaque("name=TP-80".into()) };
        assert_eq!(opaque.to_string(), "message callback( 3-0-name=TP-80 )");
    }
}
