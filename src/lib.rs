//! # Segno - raw MIDI device access
//!
//! Umbrella crate over the segno members:
//! - **segno-midi** - frame and message value types
//! - **segno-midi-io** - the transport contract and backend adapters
//!
//! A transport is one open connection to a MIDI device. Backends with a
//! blocking native read expose [`BlockingReadable`]; backends whose native
//! layer pushes data from a service thread expose [`PushDelivered`]. The
//! write and close halves of the contract are uniform across both.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use segno::{BlockingReadable, BlockingTransport, Frame, RawMidiTransport};
//! use segno::backend::alsa::AlsaRawMidi;
//!
//! let api = Arc::new(AlsaRawMidi::new());
//! let mut device = BlockingTransport::open(api, "hw:1,0")?;
//! device.write(Frame::note_on(0, 60, 100).as_ref())?;
//! let echo = device.read_frame()?;
//! device.close()?;
//! ```
//!
//! ## Feature flags
//!
//! - `alsa` - blocking backend over ALSA rawmidi (Linux)
//! - `coremidi` - push backend over CoreMIDI (macOS)
//!
//! The in-memory [`mock`] backends are always available.

pub use segno_midi::{ControlChange, Frame, MessageKind, Note, FRAME_LEN};

pub use segno_midi_io::{
    backend, list_devices, mock, BlockingOutput, BlockingReadable, BlockingTransport, DeviceInfo,
    DeviceSpec, Direction, Error, FrameReceiver, FrameSink, HandleId, MidiService, ObjectKind,
    ObjectRef, Packet, PacketList, PushDelivered, PushTransport, RawMidiApi, RawMidiTransport,
    Result,
};
