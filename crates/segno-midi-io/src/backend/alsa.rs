//! ALSA rawmidi binding for the blocking seam.

use crate::blocking::RawMidiApi;
use crate::transport::Direction;
use alsa::rawmidi::Rawmidi;
use std::io::{Read, Write};

/// Blocking rawmidi streams on a `hw:card[,device[,sub]]` address.
///
/// ALSA reports negative errno values; they are passed through unchanged,
/// so `-ENOENT` from an unknown address surfaces as `DeviceNotFound` in
/// the adapter.
#[derive(Debug, Default)]
pub struct AlsaRawMidi;

impl AlsaRawMidi {
    pub fn new() -> Self {
        Self
    }
}

impl RawMidiApi for AlsaRawMidi {
    type Stream = Rawmidi;

    fn open(&self, path: &str, direction: Direction) -> Result<Rawmidi, i32> {
        let dir = match direction {
            Direction::Input => alsa::Direction::Capture,
            Direction::Output => alsa::Direction::Playback,
        };
        Rawmidi::new(path, dir, false).map_err(status_of)
    }

    fn read(&self, stream: &mut Rawmidi, buf: &mut [u8]) -> Result<usize, i32> {
        let mut io = stream.io();
        io.read(buf).map_err(io_status)
    }

    fn write(&self, stream: &mut Rawmidi, buf: &[u8]) -> Result<usize, i32> {
        let mut io = stream.io();
        io.write(buf).map_err(io_status)
    }

    fn close(&self, stream: Rawmidi) -> Result<(), i32> {
        // snd_rawmidi_close runs on drop; the binding reports no status.
        drop(stream);
        Ok(())
    }
}

fn status_of(err: alsa::Error) -> i32 {
    -err.errno()
}

fn io_status(err: std::io::Error) -> i32 {
    // EIO when the binding gives us no errno to forward.
    -err.raw_os_error().unwrap_or(5)
}
