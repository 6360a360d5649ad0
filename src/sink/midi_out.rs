//! Hardware/virtual MIDI output backed by midir

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use tracing::{debug, info};

use super::{OutputPort, OutputSink};
use crate::error::SinkError;
use crate::midi::{format_hex, MidiEvent};

/// midir-based output sink
pub struct MidirSink {
    client_name: String,
}

impl MidirSink {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn client(&self) -> Result<MidiOutput, SinkError> {
        MidiOutput::new(&self.client_name).map_err(|e| SinkError::Init(e.to_string()))
    }

    /// Find an output port, exact name first, then case-insensitive substring
    fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
        let named: Vec<_> = midi_out
            .ports()
            .into_iter()
            .filter_map(|port| midi_out.port_name(&port).ok().map(|name| (port, name)))
            .collect();

        let pattern_lower = pattern.to_lowercase();
        let found = named
            .iter()
            .position(|(_, name)| name == pattern)
            .or_else(|| {
                named
                    .iter()
                    .position(|(_, name)| name.to_lowercase().contains(&pattern_lower))
            })?;

        let (port, name) = named.into_iter().nth(found)?;
        debug!("Found port '{}' matching pattern '{}'", name, pattern);
        Some((port, name))
    }
}

impl Default for MidirSink {
    fn default() -> Self {
        Self::new("BLE-MIDI-Bridge")
    }
}

impl OutputSink for MidirSink {
    fn list_ports(&self) -> Result<Vec<String>, SinkError> {
        let midi_out = self.client()?;

        let mut port_names = Vec::new();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                port_names.push(name);
            }
        }

        Ok(port_names)
    }

    fn open(&self, name: &str) -> Result<Box<dyn OutputPort>, SinkError> {
        let midi_out = self.client()?;

        let (port, port_name) = Self::find_output_port(&midi_out, name)
            .ok_or_else(|| SinkError::PortNotFound(name.to_string()))?;

        let connection = midi_out
            .connect(&port, &self.client_name)
            .map_err(|e| SinkError::Open {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        info!("Opened MIDI output port: {}", port_name);

        Ok(Box::new(MidirPort {
            connection,
            name: port_name,
        }))
    }
}

/// Open midir output connection
struct MidirPort {
    connection: MidiOutputConnection,
    name: String,
}

// SAFETY: the connection is owned by a single supervisor task and never shared;
// some midir backends do not mark their handles Send.
unsafe impl Send for MidirPort {}

impl OutputPort for MidirPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, event: &MidiEvent) -> Result<(), SinkError> {
        let bytes = event.to_bytes();
        debug!("MIDI TX -> {}: {}", self.name, format_hex(&bytes));
        self.connection
            .send(&bytes)
            .map_err(|e| SinkError::Write(e.to_string()))
    }

    fn close(self: Box<Self>) {
        debug!("Closing MIDI output port: {}", self.name);
        let _ = self.connection.close();
    }
}
