//! MIDI event model and translation
//!
//! Turns complete channel-message byte sequences into typed [`MidiEvent`]s and
//! back. Only the four message types the bridge forwards are modelled.

pub mod reassembler;

use std::fmt;

use thiserror::Error;

pub use reassembler::{Messages, MidiReassembler};

/// Note Off status nibble
pub const NOTE_OFF: u8 = 0x80;
/// Note On status nibble
pub const NOTE_ON: u8 = 0x90;
/// Polyphonic key pressure status nibble (recognised for framing only)
pub const POLY_PRESSURE: u8 = 0xA0;
/// Control Change status nibble
pub const CONTROL_CHANGE: u8 = 0xB0;
/// Program Change status nibble (recognised for framing only)
pub const PROGRAM_CHANGE: u8 = 0xC0;
/// Channel pressure status nibble (recognised for framing only)
pub const CHANNEL_PRESSURE: u8 = 0xD0;
/// Pitch Bend status nibble
pub const PITCH_BEND: u8 = 0xE0;

/// Length of every message type the translator accepts
pub const MESSAGE_LEN: usize = 3;

/// Reasons a byte sequence cannot become a [`MidiEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MidiError {
    #[error("empty MIDI message")]
    Empty,

    #[error("unsupported status byte 0x{0:02X}")]
    UnsupportedStatus(u8),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("value {value} out of range (max {max})")]
    ValueOutOfRange { value: u16, max: u16 },
}

/// A 7-bit MIDI data value (0-127)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct U7(u8);

impl U7 {
    pub const MIN: U7 = U7(0);
    pub const MAX: U7 = U7(0x7F);

    pub fn new(value: u8) -> Result<Self, MidiError> {
        if value > Self::MAX.0 {
            return Err(MidiError::ValueOutOfRange {
                value: value as u16,
                max: Self::MAX.0 as u16,
            });
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for U7 {
    type Error = MidiError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<U7> for u8 {
    fn from(value: U7) -> Self {
        value.0
    }
}

impl fmt::Display for U7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 14-bit MIDI value (0-16383), as carried by Pitch Bend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct U14(u16);

impl U14 {
    pub const MIN: U14 = U14(0);
    pub const MAX: U14 = U14(0x3FFF);

    pub fn new(value: u16) -> Result<Self, MidiError> {
        if value > Self::MAX.0 {
            return Err(MidiError::ValueOutOfRange {
                value,
                max: Self::MAX.0,
            });
        }
        Ok(Self(value))
    }

    /// Assemble from two 7-bit data bytes, least-significant first
    pub fn from_lsb_msb(lsb: U7, msb: U7) -> Self {
        Self(((msb.0 as u16) << 7) | lsb.0 as u16)
    }

    pub fn lsb(self) -> U7 {
        U7((self.0 & 0x7F) as u8)
    }

    pub fn msb(self) -> U7 {
        U7(((self.0 >> 7) & 0x7F) as u8)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for U14 {
    type Error = MidiError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for U14 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MIDI channel (0-15 on the wire, shown 1-16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Channel(u8);

impl Channel {
    pub fn new(value: u8) -> Result<Self, MidiError> {
        if value > 0x0F {
            return Err(MidiError::ValueOutOfRange {
                value: value as u16,
                max: 0x0F,
            });
        }
        Ok(Self(value))
    }

    /// Channel carried in the low nibble of a status byte
    pub fn from_status(status: u8) -> Self {
        Self(status & 0x0F)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 + 1)
    }
}

/// A channel message forwarded by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOff {
        channel: Channel,
        note: U7,
        velocity: U7,
    },

    /// Velocity 0 is a note-off by convention but stays a `NoteOn` here
    NoteOn {
        channel: Channel,
        note: U7,
        velocity: U7,
    },

    ControlChange {
        channel: Channel,
        controller: U7,
        value: U7,
    },

    PitchBend { channel: Channel, value14: U14 },
}

impl MidiEvent {
    /// Build an event from one complete message.
    ///
    /// The status nibble must be one of the four forwarded types and the
    /// sequence must be exactly [`MESSAGE_LEN`] bytes long.
    pub fn from_bytes(message: &[u8]) -> Result<Self, MidiError> {
        let status = *message.first().ok_or(MidiError::Empty)?;
        let kind = status & 0xF0;

        if !matches!(kind, NOTE_OFF | NOTE_ON | CONTROL_CHANGE | PITCH_BEND) {
            return Err(MidiError::UnsupportedStatus(status));
        }
        if message.len() != MESSAGE_LEN {
            return Err(MidiError::Length {
                expected: MESSAGE_LEN,
                actual: message.len(),
            });
        }

        let channel = Channel::from_status(status);
        let data1 = U7::new(message[1])?;
        let data2 = U7::new(message[2])?;

        let event = match kind {
            NOTE_OFF => MidiEvent::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            },
            NOTE_ON => MidiEvent::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            },
            CONTROL_CHANGE => MidiEvent::ControlChange {
                channel,
                controller: data1,
                value: data2,
            },
            _ => MidiEvent::PitchBend {
                channel,
                value14: U14::from_lsb_msb(data1, data2),
            },
        };

        Ok(event)
    }

    /// Encode to wire bytes
    pub fn to_bytes(&self) -> [u8; MESSAGE_LEN] {
        match *self {
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => [NOTE_OFF | channel.get(), note.get(), velocity.get()],
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => [NOTE_ON | channel.get(), note.get(), velocity.get()],
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => [CONTROL_CHANGE | channel.get(), controller.get(), value.get()],
            MidiEvent::PitchBend { channel, value14 } => [
                PITCH_BEND | channel.get(),
                value14.lsb().get(),
                value14.msb().get(),
            ],
        }
    }

    pub fn channel(&self) -> Channel {
        match *self {
            MidiEvent::NoteOff { channel, .. }
            | MidiEvent::NoteOn { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => channel,
        }
    }

    /// True for Note Off and for Note On with velocity 0
    pub fn is_note_off(&self) -> bool {
        match *self {
            MidiEvent::NoteOff { .. } => true,
            MidiEvent::NoteOn { velocity, .. } => velocity == U7::MIN,
            _ => false,
        }
    }
}

/// Human-readable activity text
impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::NoteOff { channel, note, .. } => {
                write!(f, "Note Off: note {} (ch {})", note, channel)
            },
            MidiEvent::NoteOn { channel, note, .. } if self.is_note_off() => {
                write!(f, "Note Off: note {} (ch {})", note, channel)
            },
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => write!(
                f,
                "Note On: note {} (velocity {}, ch {})",
                note, velocity, channel
            ),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => write!(
                f,
                "Control Change: {} = {} (ch {})",
                controller, value, channel
            ),
            MidiEvent::PitchBend { channel, value14 } => {
                write!(f, "Pitch Bend: {} (ch {})", value14, channel)
            },
        }
    }
}

/// Translate one complete message into an event.
///
/// Anything that is not a well-formed Note On/Off, Control Change or Pitch
/// Bend yields `None`.
pub fn translate(message: &[u8]) -> Option<MidiEvent> {
    MidiEvent::from_bytes(message).ok()
}

/// Number of data bytes that follow a channel status byte
pub(crate) fn data_len_for_status(status: u8) -> usize {
    match status & 0xF0 {
        PROGRAM_CHANGE | CHANNEL_PRESSURE => 1,
        _ => 2,
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn u7(v: u8) -> U7 {
        U7::new(v).unwrap()
    }

    fn ch(v: u8) -> Channel {
        Channel::new(v).unwrap()
    }

    #[test]
    fn test_note_off() {
        assert_eq!(
            translate(&[0x80, 60, 64]),
            Some(MidiEvent::NoteOff {
                channel: ch(0),
                note: u7(60),
                velocity: u7(64),
            })
        );
    }

    #[test]
    fn test_note_on() {
        assert_eq!(
            translate(&[0x90, 60, 100]),
            Some(MidiEvent::NoteOn {
                channel: ch(0),
                note: u7(60),
                velocity: u7(100),
            })
        );
    }

    #[test]
    fn test_note_on_velocity_zero_stays_note_on() {
        let event = translate(&[0x90, 60, 0]).unwrap();

        assert_eq!(
            event,
            MidiEvent::NoteOn {
                channel: ch(0),
                note: u7(60),
                velocity: U7::MIN,
            }
        );
        assert!(event.is_note_off());
        assert_eq!(event.to_string(), "Note Off: note 60 (ch 1)");
    }

    #[test]
    fn test_control_change() {
        assert_eq!(
            translate(&[0xB2, 7, 127]),
            Some(MidiEvent::ControlChange {
                channel: ch(2),
                controller: u7(7),
                value: u7(127),
            })
        );
    }

    #[test]
    fn test_pitch_bend_boundaries() {
        let value = |bytes: [u8; 3]| match translate(&bytes) {
            Some(MidiEvent::PitchBend { value14, .. }) => value14.get(),
            other => panic!("expected pitch bend, got {:?}", other),
        };

        assert_eq!(value([0xE0, 0, 0]), 0);
        assert_eq!(value([0xE0, 127, 0]), 127);
        assert_eq!(value([0xE0, 0, 1]), 128);
        assert_eq!(value([0xE0, 0x00, 0x40]), 8192);
        assert_eq!(value([0xE0, 127, 127]), 16383);
    }

    #[test]
    fn test_seven_bit_boundaries() {
        for v in [0u8, 127] {
            assert_eq!(
                translate(&[0x80, v, v]),
                Some(MidiEvent::NoteOff {
                    channel: ch(0),
                    note: u7(v),
                    velocity: u7(v),
                })
            );
            assert_eq!(
                translate(&[0x9F, v, v]),
                Some(MidiEvent::NoteOn {
                    channel: ch(15),
                    note: u7(v),
                    velocity: u7(v),
                })
            );
            assert_eq!(
                translate(&[0xB0, v, v]),
                Some(MidiEvent::ControlChange {
                    channel: ch(0),
                    controller: u7(v),
                    value: u7(v),
                })
            );
        }
    }

    #[test]
    fn test_rejects_short_and_empty() {
        assert_eq!(translate(&[]), None);
        assert_eq!(translate(&[0x90]), None);
        assert_eq!(translate(&[0x90, 60]), None);
        assert_eq!(translate(&[0xE0, 0]), None);
        assert_eq!(
            MidiEvent::from_bytes(&[0x90, 60]),
            Err(MidiError::Length {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_rejects_overlong() {
        assert_eq!(translate(&[0x90, 60, 100, 62]), None);
    }

    #[test]
    fn test_rejects_unsupported_types() {
        for status in [0xA0u8, 0xC0, 0xD0, 0xF0, 0xF8, 0x7F, 0x00] {
            assert_eq!(translate(&[status, 1, 2]), None, "status {:02X}", status);
        }
    }

    #[test]
    fn test_rejects_data_byte_out_of_range() {
        assert_eq!(translate(&[0x90, 0x80, 10]), None);
        assert_eq!(
            MidiEvent::from_bytes(&[0xB0, 7, 0xFF]),
            Err(MidiError::ValueOutOfRange { value: 255, max: 127 })
        );
    }

    #[test]
    fn test_value_construction_errors() {
        assert!(U7::new(128).is_err());
        assert!(U14::new(16384).is_err());
        assert!(Channel::new(16).is_err());
        assert_eq!(U14::new(16383).unwrap(), U14::MAX);
    }

    #[test]
    fn test_encode_round_trip_pitch_bend() {
        let event = MidiEvent::PitchBend {
            channel: ch(3),
            value14: U14::new(0x2000).unwrap(),
        };

        assert_eq!(event.to_bytes(), [0xE3, 0x00, 0x40]);
    }

    #[test]
    fn test_activity_text() {
        assert_eq!(
            translate(&[0x90, 60, 100]).unwrap().to_string(),
            "Note On: note 60 (velocity 100, ch 1)"
        );
        assert_eq!(
            translate(&[0xB0, 7, 127]).unwrap().to_string(),
            "Control Change: 7 = 127 (ch 1)"
        );
        assert_eq!(
            translate(&[0xE0, 0, 64]).unwrap().to_string(),
            "Pitch Bend: 8192 (ch 1)"
        );
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x90, 0x3C, 0x64]), "90 3C 64");
    }

    proptest! {
        #[test]
        fn prop_pitch_bend_is_msb_times_128_plus_lsb(lsb in 0u8..=127, msb in 0u8..=127) {
            let event = translate(&[0xE0, lsb, msb]).unwrap();
            let expected = msb as u16 * 128 + lsb as u16;
            prop_assert_eq!(
                event,
                MidiEvent::PitchBend { channel: Channel::default(), value14: U14::new(expected).unwrap() }
            );
            prop_assert_eq!(event.to_bytes(), [0xE0, lsb, msb]);
        }

        #[test]
        fn prop_supported_messages_keep_their_bytes(
            kind in prop::sample::select(vec![0x80u8, 0x90, 0xB0]),
            channel in 0u8..16,
            d1 in 0u8..=127,
            d2 in 0u8..=127,
        ) {
            let bytes = [kind | channel, d1, d2];
            let event = translate(&bytes).unwrap();
            prop_assert_eq!(event.to_bytes(), bytes);
            prop_assert_eq!(event.channel().get(), channel);
        }

        #[test]
        fn prop_other_status_bytes_are_dropped(status in 0u8..=255, d1 in 0u8..=127, d2 in 0u8..=127) {
            let kind = status & 0xF0;
            prop_assume!(!matches!(kind, 0x80 | 0x90 | 0xB0 | 0xE0));
            prop_assert_eq!(translate(&[status, d1, d2]), None);
        }

        #[test]
        fn prop_short_messages_are_dropped(bytes in prop::collection::vec(any::<u8>(), 0..3)) {
            prop_assert_eq!(translate(&bytes), None);
        }
    }
}
