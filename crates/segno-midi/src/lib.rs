//! MIDI value types shared by the segno transport layer.
//!
//! The unit of data moved over a raw transport is the fixed 3-byte
//! channel-voice [`Frame`]. This crate deliberately does no message
//! parsing beyond status-nibble classification: running status, sysex
//! framing and variable-length messages are out of scope.

mod frame;
pub use frame::{Frame, MessageKind, FRAME_LEN};

mod note;
pub use note::{ControlChange, Note};
