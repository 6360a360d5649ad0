//! Notification payload reassembly
//!
//! BLE notifications arrive in chunks that do not line up with MIDI message
//! boundaries. [`MidiReassembler`] cuts the byte stream into candidate
//! messages at status-byte boundaries; the translator decides later whether a
//! candidate is well formed.
//!
//! Running status is honoured: a data byte arriving after the open message
//! already holds all its data bytes, or with no open message at all, starts a
//! repeat of the last status byte. Data bytes before any status are dropped.

use super::data_len_for_status;

/// Running-status byte stream splitter
///
/// One instance per session. Not reentrant: drive it from a single consumer.
#[derive(Debug, Default)]
pub struct MidiReassembler {
    /// Message currently being accumulated, status byte first
    pending: Vec<u8>,
    /// Last channel status byte seen (0x80-0xEF)
    running_status: Option<u8>,
}

impl MidiReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one payload chunk.
    ///
    /// Returns a lazy iterator over the messages delimited by this chunk. A
    /// message still open at the end of the chunk is emitted as the last
    /// item. Bytes are only consumed as the iterator advances, so drain it.
    pub fn feed<'a>(&'a mut self, payload: &'a [u8]) -> Messages<'a> {
        Messages {
            reassembler: self,
            bytes: payload.iter(),
        }
    }

    /// Last status byte seen, if any
    #[cfg(test)]
    fn running_status(&self) -> Option<u8> {
        self.running_status
    }

    /// Forget the open message and the running status
    pub fn reset(&mut self) {
        self.pending.clear();
        self.running_status = None;
    }

    fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            0x80..=0xEF => {
                self.running_status = Some(byte);
                let done = self.take_pending();
                self.pending.push(byte);
                done
            },
            // System messages are not forwarded and do not break running status
            0xF0..=0xFF => None,
            _ if self.pending.is_empty() => {
                // Stray data byte: only meaningful under a running status
                let status = self.running_status?;
                self.pending.extend_from_slice(&[status, byte]);
                None
            },
            _ => {
                let status = self.pending[0];
                if self.pending.len() > data_len_for_status(status) {
                    // Current message is full, this byte opens a running-status repeat
                    Some(std::mem::replace(&mut self.pending, vec![status, byte]))
                } else {
                    self.pending.push(byte);
                    None
                }
            },
        }
    }

    fn take_pending(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Messages delimited by one [`MidiReassembler::feed`] call
pub struct Messages<'a> {
    reassembler: &'a mut MidiReassembler,
    bytes: std::slice::Iter<'a, u8>,
}

impl Iterator for Messages<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        for &byte in self.bytes.by_ref() {
            if let Some(message) = self.reassembler.push(byte) {
                return Some(message);
            }
        }
        self.reassembler.take_pending()
    }
}

impl std::iter::FusedIterator for Messages<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{translate, MidiEvent};

    fn feed(reassembler: &mut MidiReassembler, payload: &[u8]) -> Vec<Vec<u8>> {
        reassembler.feed(payload).collect()
    }

    #[test]
    fn test_back_to_back_messages() {
        let mut r = MidiReassembler::new();

        assert_eq!(
            feed(&mut r, &[0x90, 60, 100, 0x80, 60, 0]),
            vec![vec![0x90, 60, 100], vec![0x80, 60, 0]]
        );
    }

    #[test]
    fn test_status_byte_flushes_incomplete_message() {
        let mut r = MidiReassembler::new();

        let messages = feed(&mut r, &[0x90, 60, 0xB0, 7, 127]);
        assert_eq!(messages, vec![vec![0x90, 60], vec![0xB0, 7, 127]]);

        // The truncated note is dropped downstream
        let events: Vec<_> = messages.iter().filter_map(|m| translate(m)).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MidiEvent::ControlChange { .. }));
    }

    #[test]
    fn test_stray_data_bytes_without_status_are_discarded() {
        let mut r = MidiReassembler::new();

        assert_eq!(feed(&mut r, &[5, 10, 0x90, 1, 2]), vec![vec![0x90, 1, 2]]);
    }

    #[test]
    fn test_end_of_chunk_flushes_open_message() {
        let mut r = MidiReassembler::new();

        assert_eq!(feed(&mut r, &[0x90, 60]), vec![vec![0x90, 60]]);
        assert_eq!(feed(&mut r, &[0xB0, 1, 2]), vec![vec![0xB0, 1, 2]]);
    }

    #[test]
    fn test_running_status_within_chunk() {
        let mut r = MidiReassembler::new();

        assert_eq!(
            feed(&mut r, &[0x90, 60, 100, 64, 100, 67, 0]),
            vec![vec![0x90, 60, 100], vec![0x90, 64, 100], vec![0x90, 67, 0]]
        );
    }

    #[test]
    fn test_running_status_across_chunks() {
        let mut r = MidiReassembler::new();

        assert_eq!(feed(&mut r, &[0xB0, 7, 100]), vec![vec![0xB0, 7, 100]]);
        assert_eq!(feed(&mut r, &[7, 90]), vec![vec![0xB0, 7, 90]]);
        assert_eq!(r.running_status(), Some(0xB0));
    }

    #[test]
    fn test_two_byte_types_split_on_running_status() {
        let mut r = MidiReassembler::new();

        assert_eq!(
            feed(&mut r, &[0xC0, 5, 6]),
            vec![vec![0xC0, 5], vec![0xC0, 6]]
        );
    }

    #[test]
    fn test_system_bytes_are_ignored() {
        let mut r = MidiReassembler::new();

        assert_eq!(
            feed(&mut r, &[0x90, 0xF8, 60, 0xFE, 100]),
            vec![vec![0x90, 60, 100]]
        );
    }

    #[test]
    fn test_ble_header_and_timestamp_bytes_are_dropped_downstream() {
        // BLE MIDI packets start with header + timestamp bytes (high bit set)
        let mut r = MidiReassembler::new();

        let events: Vec<_> = r
            .feed(&[0x80, 0x80, 0x90, 60, 100])
            .filter_map(|m| translate(&m))
            .collect();

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MidiEvent::NoteOn { .. }));
    }

    #[test]
    fn test_iterator_is_lazy() {
        let mut r = MidiReassembler::new();
        let mut messages = r.feed(&[0x90, 60, 100, 0x80, 60, 0]);

        assert_eq!(messages.next(), Some(vec![0x90, 60, 100]));
        assert_eq!(messages.next(), Some(vec![0x80, 60, 0]));
        assert_eq!(messages.next(), None);
        assert_eq!(messages.next(), None);
    }

    #[test]
    fn test_reset() {
        let mut r = MidiReassembler::new();
        let _ = feed(&mut r, &[0x90, 60, 100]);

        r.reset();

        assert_eq!(r.running_status(), None);
        assert!(feed(&mut r, &[60, 100]).is_empty());
    }

    #[test]
    fn test_empty_chunk() {
        let mut r = MidiReassembler::new();

        assert!(feed(&mut r, &[]).is_empty());
    }
}
