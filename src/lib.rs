//! BLE MIDI Bridge
//!
//! Forwards MIDI from a Bluetooth LE instrument to a local MIDI output port.
//! The [`bridge`] supervisor finds and connects to the device, keeps the link
//! alive across drops, and streams notification payloads through the
//! [`midi`] reassembler and translator into an output port.
//!
//! Radio and MIDI output are reached through the [`transport::Transport`] and
//! [`sink::OutputSink`] traits. The `ble` and `midi-out` features provide the
//! btleplug and midir adapters.

pub mod bridge;
pub mod config;
pub mod error;
pub mod midi;
pub mod paths;
pub mod report;
pub mod sink;
pub mod transport;

pub use bridge::{BridgeHandle, ConnectionState, ConnectionSupervisor, StopHandle, SupervisorStats};
pub use config::BridgeConfig;
pub use error::{BridgeFailure, SinkError, TransportError};
pub use midi::{translate, MidiEvent, MidiReassembler};
pub use report::{ActivityReporter, BridgeEvent, ChannelReporter, StatusReporter};
