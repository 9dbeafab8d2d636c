//! MIDI utilities and message types
//!
//! Provides parsing and encoding of the channel messages a control surface
//! exchanges with the state binding, plus 7-bit value conversions.

use std::fmt;

/// Largest 7-bit MIDI data value
pub const MAX_7BIT: u8 = 127;

/// MIDI channel messages understood by the binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    ///
    /// Returns `None` for system messages, running status and message types
    /// the binding does not use.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) || rest.len() < 2 {
            return None;
        }

        let channel = status & 0x0F;
        let data1 = rest[0] & 0x7F;
        let data2 = rest[1] & 0x7F;

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            }),
            // velocity 0 = Note Off
            0x90 if data2 == 0 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: 0,
            }),
            0x90 => Some(MidiMessage::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: data1,
                value: data2,
            }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
        }
    }

    /// Channel of the message (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity),
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
        }
    }
}

/// MIDI value conversion utilities
pub mod convert {
    use super::MAX_7BIT;

    /// Map a 7-bit value onto `[min, max]`: `min + (max - min) * raw / 127`
    pub fn from_7bit_range(raw: u8, min: f64, max: f64) -> f64 {
        let raw = raw.min(MAX_7BIT) as f64;
        min + (max - min) * raw / MAX_7BIT as f64
    }

    /// Inverse of [`from_7bit_range`], rounded to the nearest device unit
    ///
    /// Values outside `[min, max]` are clamped to 0/127.
    pub fn to_7bit_range(value: f64, min: f64, max: f64) -> u8 {
        let scaled = (MAX_7BIT as f64 * (value - min) / (max - min)).round();
        if scaled.is_nan() {
            return 0;
        }
        scaled.clamp(0.0, MAX_7BIT as f64) as u8
    }

    /// Threshold rule for switches: only a full-scale value is "on"
    pub fn to_bool(raw: u8) -> bool {
        raw == MAX_7BIT
    }

    pub fn from_bool(value: bool) -> u8 {
        if value {
            MAX_7BIT
        } else {
            0
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
