//! Raw MIDI transport layer.
//!
//! Wraps two unrelated native MIDI subsystems behind one four-operation
//! contract: open, read-or-notify, write, close.
//!
//! - The **blocking** adapter ([`BlockingTransport`]) fronts a raw-device
//!   API in the shape of ALSA rawmidi: synchronous read/write on a device
//!   stream, the caller's thread is the one that suspends.
//! - The **push** adapter ([`PushTransport`]) fronts a service-oriented
//!   API in the shape of CoreMIDI: client/port/endpoint objects and
//!   asynchronous delivery on a native service thread.
//!
//! The two I/O models are deliberately not unified into one blocking read
//! signature; they are exposed as capability traits ([`BlockingReadable`]
//! and [`PushDelivered`]) so the calling runtime branches on what a given
//! backend provides.
//!
//! Both adapters are generic over a native seam trait ([`RawMidiApi`],
//! [`MidiService`]) with hardware implementations behind the `alsa` and
//! `coremidi` features and always-available in-memory fakes in [`mock`].

pub mod error;
pub use error::{Error, Result};

mod transport;
pub use transport::{
    BlockingReadable, Direction, FrameSink, HandleId, PushDelivered, RawMidiTransport,
};

mod release;

pub mod blocking;
pub use blocking::{BlockingOutput, BlockingTransport, FrameReceiver, RawMidiApi};

pub mod service;
pub use service::{
    list_devices, ConnectionContext, DeliveryCallback, DeviceInfo, MidiService, ObjectKind,
    ObjectRef, Packet, PacketList,
};

pub mod push;
pub use push::{DeviceSpec, PushTransport};

pub mod mock;

pub mod backend;

pub use segno_midi::{ControlChange, Frame, MessageKind, Note, FRAME_LEN};
