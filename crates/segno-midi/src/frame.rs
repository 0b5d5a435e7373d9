//! Fixed 3-byte MIDI channel-voice frames.

use serde::{Deserialize, Serialize};

/// Number of bytes in a channel-voice frame: status, data1, data2.
pub const FRAME_LEN: usize = 3;

/// One MIDI channel-voice message on the wire.
///
/// The byte layout is identical for inbound and outbound traffic. Messages
/// that carry only one data byte (program change, channel pressure) still
/// occupy a full frame with data2 set to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub const fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self([status, data1, data2])
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        let channel = channel.min(15); // MIDI channels are 0-15
        Self([0x90 | channel, note & 0x7F, velocity & 0x7F])
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        let channel = channel.min(15);
        Self([0x80 | channel, note & 0x7F, velocity & 0x7F])
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        let channel = channel.min(15);
        Self([0xB0 | channel, controller & 0x7F, value & 0x7F])
    }

    pub fn poly_key_pressure(channel: u8, note: u8, pressure: u8) -> Self {
        let channel = channel.min(15);
        Self([0xA0 | channel, note & 0x7F, pressure & 0x7F])
    }

    pub fn channel_pressure(channel: u8, pressure: u8) -> Self {
        let channel = channel.min(15);
        Self([0xD0 | channel, pressure & 0x7F, 0])
    }

    /// `value`: signed 14-bit (-8192 to 8191).
    pub fn pitch_bend(channel: u8, value: i16) -> Self {
        let channel = channel.min(15);
        let unsigned = (value + 8192).clamp(0, 16383) as u16;
        let lsb = (unsigned & 0x7F) as u8;
        let msb = ((unsigned >> 7) & 0x7F) as u8;
        Self([0xE0 | channel, lsb, msb])
    }

    pub fn status(&self) -> u8 {
        self.0[0]
    }

    pub fn data1(&self) -> u8 {
        self.0[1]
    }

    pub fn data2(&self) -> u8 {
        self.0[2]
    }

    pub fn channel(&self) -> u8 {
        self.0[0] & 0x0F
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from_status(self.0[0])
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Reads one frame from the front of `bytes`, if enough are present.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [status, data1, data2, ..] => Some(Self([*status, *data1, *data2])),
            _ => None,
        }
    }
}

impl From<[u8; FRAME_LEN]> for Frame {
    fn from(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Frame> for [u8; FRAME_LEN] {
    fn from(frame: Frame) -> Self {
        frame.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Channel-voice message classification keyed on the status high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    NoteOff,
    NoteOn,
    PolyKeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    /// System messages and anything else this layer does not interpret.
    Unknown,
}

impl MessageKind {
    pub fn from_status(status: u8) -> Self {
        match status & 0xF0 {
            0x80 => MessageKind::NoteOff,
            0x90 => MessageKind::NoteOn,
            0xA0 => MessageKind::PolyKeyPressure,
            0xB0 => MessageKind::ControlChange,
            0xC0 => MessageKind::ProgramChange,
            0xD0 => MessageKind::ChannelPressure,
            0xE0 => MessageKind::PitchBend,
            _ => MessageKind::Unknown,
        }
    }
}
