//! Radio transport capability
//!
//! The bridge core only talks to these traits. Platform adapters (see
//! [`ble`]) implement them; tests substitute in-memory mocks.

#[cfg(feature = "ble")]
pub mod ble;
pub mod guard;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TransportError;

/// Standard BLE MIDI service UUID
pub const MIDI_SERVICE_UUID: Uuid = Uuid::from_u128(0x03b80e5a_ede8_4b33_a751_6ce34ec4c700);

/// Standard BLE MIDI I/O characteristic UUID
pub const MIDI_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x7772e5db_3868_4112_a1a9_f2669d106bf3);

/// Sending half of the payload queue handed to [`TransportSession::subscribe`]
///
/// Unbounded so that notification callbacks never block or drop a payload.
pub type PayloadSender = mpsc::UnboundedSender<Vec<u8>>;

/// Receiving half of the payload queue, drained by the supervisor
pub type PayloadReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// A device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
}

/// Device discovery and connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Scan for `timeout` and return every named device seen
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a session to a previously scanned device
    async fn connect(&self, address: &str) -> Result<Box<dyn TransportSession>, TransportError>;
}

/// One established connection
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Start notifications on `characteristic`, delivering each payload to `payloads`.
    ///
    /// Dropping the sender (for example when the link goes away) signals
    /// the end of the notification stream.
    async fn subscribe(
        &mut self,
        characteristic: Uuid,
        payloads: PayloadSender,
    ) -> Result<(), TransportError>;

    async fn is_connected(&self) -> bool;

    async fn unsubscribe(&mut self) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Case-insensitive substring match on device names
pub fn find_device<'a>(
    devices: &'a [DiscoveredDevice],
    pattern: &str,
) -> Option<&'a DiscoveredDevice> {
    let pattern = pattern.to_lowercase();
    devices
        .iter()
        .find(|d| d.name.to_lowercase().contains(&pattern))
}
