//! Blocking raw-device backend adapter.
//!
//! Fronts native APIs in the shape of ALSA rawmidi: a device path opens a
//! pair of byte streams and read/write suspend the calling thread until the
//! native layer delivers or accepts bytes. The adapter is generic over
//! [`RawMidiApi`] so tests drive it with [`crate::mock::MockRawMidi`] and
//! hardware uses [`crate::backend::alsa`].

use crate::error::{Error, Result};
use crate::release::record_failure;
use crate::transport::{check_alignment, BlockingReadable, Direction, HandleId, RawMidiTransport};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use segno_midi::{Frame, FRAME_LEN};
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Native status for "no such device node".
const ENOENT: i32 = 2;

/// The raw-device native seam.
///
/// Status codes are the native layer's own, passed through unchanged in
/// error payloads. Read blocks the calling thread until at least one byte
/// is available.
pub trait RawMidiApi: Send + Sync + 'static {
    type Stream: Send + 'static;

    fn open(&self, path: &str, direction: Direction) -> std::result::Result<Self::Stream, i32>;

    fn read(&self, stream: &mut Self::Stream, buf: &mut [u8]) -> std::result::Result<usize, i32>;

    fn write(&self, stream: &mut Self::Stream, buf: &[u8]) -> std::result::Result<usize, i32>;

    fn close(&self, stream: Self::Stream) -> std::result::Result<(), i32>;
}

/// A duplex connection to one raw MIDI device.
///
/// Cancellation note: closing this handle from another thread does NOT
/// unblock a `read_frame` that is already suspended in the native layer;
/// the read returns only when the device delivers bytes or fails. Callers
/// that need a detachable reader use [`BlockingTransport::into_frames`].
pub struct BlockingTransport<A: RawMidiApi> {
    api: Arc<A>,
    id: HandleId,
    path: String,
    input: Option<A::Stream>,
    output: Option<A::Stream>,
}

impl<A: RawMidiApi> BlockingTransport<A> {
    /// Opens the capture and playback streams for `path`.
    ///
    /// If the playback stream fails to open, the already-open capture
    /// stream is released before the error is surfaced.
    pub fn open(api: Arc<A>, path: &str) -> Result<Self> {
        let input = api
            .open(path, Direction::Input)
            .map_err(|status| classify_open(path, status))?;

        let output = match api.open(path, Direction::Output) {
            Ok(stream) => stream,
            Err(status) => {
                if let Err(rc) = api.close(input) {
                    warn!(path, status = rc, "capture stream release failed during failed open");
                }
                return Err(classify_open(path, status));
            }
        };

        let id = HandleId::next();
        debug!(path, %id, "opened raw MIDI device");
        Ok(Self {
            api,
            id,
            path: path.to_string(),
            input: Some(input),
            output: Some(output),
        })
    }

    /// Detaches the capture stream onto a reader thread that feeds a
    /// bounded frame channel, and returns the write/close half.
    ///
    /// The thread exits on the first native read error (logging it) or when
    /// the receiver is dropped, releasing the capture stream either way.
    pub fn into_frames(mut self, capacity: usize) -> Result<(FrameReceiver, BlockingOutput<A>)> {
        let stream = self.input.take().ok_or(Error::Closed)?;
        let api = Arc::clone(&self.api);
        let path = self.path.clone();
        let (tx, rx) = bounded(capacity);

        let spawned = thread::Builder::new()
            .name("segno-midi-reader".to_string())
            .spawn(move || {
                let mut stream = stream;
                loop {
                    match read_exact_frame(&*api, &mut stream) {
                        Ok(frame) => {
                            if tx.send(frame).is_err() {
                                debug!(path, "frame receiver dropped, reader stopping");
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(path, error = %err, "could not read from device, reader stopping");
                            break;
                        }
                    }
                }
                if let Err(status) = api.close(stream) {
                    warn!(path, status, "capture stream release failed after reader exit");
                }
            });
        if let Err(err) = spawned {
            // EAGAIN when the OS gives us no errno to forward.
            return Err(Error::Resource {
                stage: "spawn reader thread",
                status: -err.raw_os_error().unwrap_or(11),
            });
        }

        let output = BlockingOutput {
            api: Arc::clone(&self.api),
            id: self.id,
            path: self.path.clone(),
            output: self.output.take(),
        };
        Ok((FrameReceiver { rx }, output))
    }
}

impl<A: RawMidiApi> RawMidiTransport for BlockingTransport<A> {
    fn id(&self) -> HandleId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.input.is_some() || self.output.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let stream = self.output.as_mut().ok_or(Error::Closed)?;
        write_frames(&*self.api, stream, bytes)
    }

    fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        let mut first: Option<Error> = None;
        if let Some(stream) = self.input.take() {
            if let Err(status) = self.api.close(stream) {
                record_failure(
                    &mut first,
                    "close capture stream",
                    Error::Resource {
                        stage: "close capture stream",
                        status,
                    },
                );
            }
        }
        if let Some(stream) = self.output.take() {
            if let Err(status) = self.api.close(stream) {
                record_failure(
                    &mut first,
                    "close playback stream",
                    Error::Resource {
                        stage: "close playback stream",
                        status,
                    },
                );
            }
        }
        debug!(path = %self.path, id = %self.id, "closed raw MIDI device");
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<A: RawMidiApi> BlockingReadable for BlockingTransport<A> {
    fn read_frame(&mut self) -> Result<Frame> {
        let stream = self.input.as_mut().ok_or(Error::Closed)?;
        read_exact_frame(&*self.api, stream)
    }
}

impl<A: RawMidiApi> fmt::Debug for BlockingTransport<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTransport")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<A: RawMidiApi> Drop for BlockingTransport<A> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                debug!(error = %err, "close failure while dropping transport");
            }
        }
    }
}

/// The write/close half left behind by [`BlockingTransport::into_frames`].
pub struct BlockingOutput<A: RawMidiApi> {
    api: Arc<A>,
    id: HandleId,
    path: String,
    output: Option<A::Stream>,
}

impl<A: RawMidiApi> RawMidiTransport for BlockingOutput<A> {
    fn id(&self) -> HandleId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.output.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let stream = self.output.as_mut().ok_or(Error::Closed)?;
        write_frames(&*self.api, stream, bytes)
    }

    fn close(&mut self) -> Result<()> {
        let stream = self.output.take().ok_or(Error::Closed)?;
        self.api.close(stream).map_err(|status| Error::Resource {
            stage: "close playback stream",
            status,
        })?;
        debug!(path = %self.path, id = %self.id, "closed raw MIDI output");
        Ok(())
    }
}

impl<A: RawMidiApi> fmt::Debug for BlockingOutput<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingOutput")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl<A: RawMidiApi> Drop for BlockingOutput<A> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                debug!(error = %err, "close failure while dropping output half");
            }
        }
    }
}

/// Inbound frames from a detached reader thread.
///
/// The channel disconnects when the device fails or the output half's
/// reader exits, so iteration terminates instead of blocking forever.
pub struct FrameReceiver {
    rx: Receiver<Frame>,
}

impl FrameReceiver {
    /// Blocks until a frame arrives; `None` once the reader has stopped.
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    /// `Ok(None)` when no frame is pending, `Err` once disconnected.
    pub fn try_recv(&self) -> std::result::Result<Option<Frame>, TryRecvError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Frame> + '_ {
        self.rx.iter()
    }
}

fn classify_open(path: &str, status: i32) -> Error {
    if status == -ENOENT {
        Error::DeviceNotFound(path.to_string())
    } else {
        Error::Resource {
            stage: "open rawmidi stream",
            status,
        }
    }
}

/// Assembles one full frame, looping over short native reads.
fn read_exact_frame<A: RawMidiApi>(api: &A, stream: &mut A::Stream) -> Result<Frame> {
    let mut buf = [0u8; FRAME_LEN];
    let mut filled = 0;
    while filled < FRAME_LEN {
        match api.read(stream, &mut buf[filled..]) {
            // A zero-length read means the device went away underneath us.
            Ok(0) => {
                return Err(Error::Resource {
                    stage: "rawmidi read",
                    status: 0,
                })
            }
            Ok(n) => filled += n,
            Err(status) => {
                return Err(Error::Resource {
                    stage: "rawmidi read",
                    status,
                })
            }
        }
    }
    Ok(Frame::from(buf))
}

fn write_frames<A: RawMidiApi>(api: &A, stream: &mut A::Stream, bytes: &[u8]) -> Result<usize> {
    if bytes.is_empty() {
        return Ok(0);
    }
    check_alignment(bytes)?;
    let mut written = 0;
    while written < bytes.len() {
        match api.write(stream, &bytes[written..]) {
            Ok(0) => return Err(Error::Send { status: 0 }),
            Ok(n) => written += n,
            Err(status) => return Err(Error::Send { status }),
        }
    }
    Ok(written)
}
