//! MIDI output capability
//!
//! The supervisor writes translated events through [`OutputPort`]. The
//! [`midi_out`] adapter implements it on top of midir.

#[cfg(feature = "midi-out")]
pub mod midi_out;

use tracing::debug;

use crate::error::SinkError;
use crate::midi::MidiEvent;

/// Port name fragments that identify virtual/loopback ports
const VIRTUAL_PORT_HINTS: &[&str] = &["loopmidi", "virtual", "iac"];

/// Enumerates and opens output ports
pub trait OutputSink: Send + Sync {
    /// Output port names, in platform order
    fn list_ports(&self) -> Result<Vec<String>, SinkError>;

    fn open(&self, name: &str) -> Result<Box<dyn OutputPort>, SinkError>;
}

/// An open output port
pub trait OutputPort: Send {
    fn name(&self) -> &str;

    fn write(&mut self, event: &MidiEvent) -> Result<(), SinkError>;

    fn close(self: Box<Self>);
}

/// Whether a port name looks like a virtual/loopback port
pub fn is_virtual_port(name: &str) -> bool {
    let name = name.to_lowercase();
    VIRTUAL_PORT_HINTS.iter().any(|hint| name.contains(hint))
}

/// Pick the output port to open.
///
/// With a preference: exact name first, then case-insensitive substring.
/// Without one: the first virtual/loopback port.
pub fn resolve_output_port(ports: &[String], preferred: Option<&str>) -> Option<String> {
    let resolved = match preferred {
        Some(wanted) => {
            let wanted_lower = wanted.to_lowercase();
            ports
                .iter()
                .find(|p| p.as_str() == wanted)
                .or_else(|| ports.iter().find(|p| p.to_lowercase().contains(&wanted_lower)))
        },
        None => ports.iter().find(|p| is_virtual_port(p)),
    };

    if let Some(port) = resolved {
        debug!("Resolved MIDI output port '{}' (wanted {:?})", port, preferred);
    }
    resolved.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<String> {
        vec![
            "Microsoft GS Wavetable Synth".to_string(),
            "loopMIDI ToSeeMusic 1".to_string(),
            "loopMIDI ToSeeMusic".to_string(),
        ]
    }

    #[test]
    fn test_exact_match_wins_over_substring() {
        assert_eq!(
            resolve_output_port(&ports(), Some("loopMIDI ToSeeMusic")).as_deref(),
            Some("loopMIDI ToSeeMusic")
        );
    }

    #[test]
    fn test_substring_match_is_case_insensitive() {
        assert_eq!(
            resolve_output_port(&ports(), Some("wavetable")).as_deref(),
            Some("Microsoft GS Wavetable Synth")
        );
    }

    #[test]
    fn test_no_preference_picks_virtual_port() {
        assert_eq!(
            resolve_output_port(&ports(), None).as_deref(),
            Some("loopMIDI ToSeeMusic 1")
        );
    }

    #[test]
    fn test_missing_port() {
        assert_eq!(resolve_output_port(&ports(), Some("IAC Driver")), None);
        assert_eq!(resolve_output_port(&[], None), None);
    }

    #[test]
    fn test_is_virtual_port() {
        assert!(is_virtual_port("IAC Driver Bus 1"));
        assert!(is_virtual_port("Midi Through Port-0 (Virtual)"));
        assert!(!is_virtual_port("USB MIDI Interface"));
    }
}
