//! Error types shared by the bridge core and its adapters

use thiserror::Error;

/// Errors raised by a radio transport adapter
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    #[error("scan failed: {0}")]
    Scan(String),

    #[error("unknown device address '{0}' (scan again)")]
    UnknownDevice(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("characteristic {0} not found or not notifiable")]
    CharacteristicNotFound(uuid::Uuid),

    #[error("subscription failed: {0}")]
    Subscribe(String),

    #[error("not connected")]
    NotConnected,

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[cfg(feature = "ble")]
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
}

/// Errors raised by a MIDI output adapter
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("MIDI output unavailable: {0}")]
    Init(String),

    #[error("MIDI output port '{0}' not found")]
    PortNotFound(String),

    #[error("failed to open MIDI output port '{port}': {reason}")]
    Open { port: String, reason: String },

    #[error("MIDI write failed: {0}")]
    Write(String),
}

/// Failures the connection supervisor recovers from.
///
/// None of these escape the supervisor; each one ends the current cycle and
/// leads to backoff (or to a stop when auto-reconnect is off).
#[derive(Debug, Error)]
pub enum BridgeFailure {
    #[error("device '{target}' not found after {attempts} scan attempt(s)")]
    Discovery { target: String, attempts: u32 },

    #[error("could not connect to '{device}': {source}")]
    Connect {
        device: String,
        #[source]
        source: TransportError,
    },

    #[error("could not subscribe to MIDI notifications: {0}")]
    Subscribe(#[source] TransportError),

    #[error("MIDI output error: {0}")]
    Sink(#[from] SinkError),

    #[error("connection to '{0}' lost")]
    TransportDrop(String),
}
