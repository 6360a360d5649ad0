//! Supervisor state types

use std::fmt;

use crate::transport::DiscoveredDevice;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Subscribing,
    Streaming,
    Disconnecting,
    Backoff,
    /// Terminal
    Stopped,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Stopped
    }

    /// What the supervisor is doing in this state, for status text
    pub(crate) fn activity(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Backoff => "waiting to retry",
            ConnectionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Subscribing => "Subscribing",
            ConnectionState::Streaming => "Streaming",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Backoff => "Backoff",
            ConnectionState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// The device the supervisor looks for
///
/// Starts as a bare name pattern; a scan hit produces a resolved copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    name: String,
    device: Option<DiscoveredDevice>,
}

impl DeviceTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: None,
        }
    }

    /// Same pattern, bound to a scanned device
    pub fn resolved(&self, device: &DiscoveredDevice) -> Self {
        Self {
            name: self.name.clone(),
            device: Some(device.clone()),
        }
    }

    /// Same pattern, without the resolved device
    pub fn unresolved(&self) -> Self {
        Self::new(self.name.clone())
    }

    /// Name substring used for matching
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> Option<&DiscoveredDevice> {
        self.device.as_ref()
    }

    pub fn address(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.address.as_str())
    }

    /// Best name for status text: the advertised one once resolved
    pub fn display_name(&self) -> &str {
        self.device
            .as_ref()
            .map(|d| d.name.as_str())
            .unwrap_or(&self.name)
    }
}

/// Counters collected over one supervisor run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupervisorStats {
    pub scan_cycles: u32,
    pub backoff_cycles: u32,
    pub sessions_established: u32,
    pub messages_forwarded: u64,
    /// Delimited messages the translator rejected
    pub messages_dropped: u64,
    pub write_failures: u64,
}

impl fmt::Display for SupervisorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scan cycle(s), {} backoff(s), {} session(s), {} message(s) forwarded, {} dropped, {} write failure(s)",
            self.scan_cycles,
            self.backoff_cycles,
            self.sessions_established,
            self.messages_forwarded,
            self.messages_dropped,
            self.write_failures
        )
    }
}
