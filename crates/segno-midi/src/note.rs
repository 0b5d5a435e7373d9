//! Note and control-change value pairs.

use crate::Frame;
use serde::{Deserialize, Serialize};

/// A note number with a velocity, independent of on/off direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub number: u8,
    pub velocity: u8,
}

impl Note {
    pub fn new(number: u8, velocity: u8) -> Self {
        Self { number, velocity }
    }

    pub fn on(&self, channel: u8) -> Frame {
        Frame::note_on(channel, self.number, self.velocity)
    }

    pub fn off(&self, channel: u8) -> Frame {
        Frame::note_off(channel, self.number, self.velocity)
    }
}

/// A controller number with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChange {
    pub number: u8,
    pub value: u8,
}

impl ControlChange {
    pub fn new(number: u8, value: u8) -> Self {
        Self { number, value }
    }

    pub fn frame(&self, channel: u8) -> Frame {
        Frame::control_change(channel, self.number, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_frames() {
        let note = Note::new(60, 100);
        assert_eq!(note.on(0).as_bytes(), &[0x90, 60, 100]);
        assert_eq!(note.off(0).as_bytes(), &[0x80, 60, 100]);
    }

    #[test]
    fn test_control_change_to_frame() {
        let cc = ControlChange::new(7, 127);
        assert_eq!(cc.frame(15).as_bytes(), &[0xBF, 7, 127]);
    }
}
