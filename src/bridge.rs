//! Connection supervisor
//!
//! One task owns the connection state machine: it scans for the configured
//! device, connects, subscribes to MIDI notifications and streams every
//! payload through the reassembler and translator into the output port.
//! Failures end the current cycle and lead to a backoff before the next
//! scan. The task only finishes when a stop is requested (or on the first
//! failure when auto-reconnect is off).

mod handle;
mod state;
mod supervisor;


pub use handle::{BridgeHandle, StopHandle};
pub use state::{ConnectionState, DeviceTarget, SupervisorStats};
pub use supervisor::ConnectionSupervisor;
