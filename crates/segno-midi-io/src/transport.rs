//! The transport contract shared by both backend adapters.

use crate::error::{Error, Result};
use segno_midi::{Frame, FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Directionality of an endpoint or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Identifies one open handle in sink deliveries.
///
/// Ids are unique within the process for its lifetime, so a single sink
/// shared between several handles can route on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(u64);

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

impl HandleId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Caller-supplied sink for inbound frames under the push-delivery model.
///
/// Invoked from a native service thread outside caller control, so it must
/// not assume a particular calling thread and must not block indefinitely
/// or inbound delivery for the whole process stalls.
pub type FrameSink = Box<dyn Fn(HandleId, Frame) + Send + Sync>;

/// One open raw MIDI connection.
///
/// A handle owns every native resource acquired while opening it and is
/// either fully open or was never returned to the caller. Handles are not
/// safe for concurrent writes from multiple threads; callers serialize
/// writes per handle and quiesce in-flight work before closing.
pub trait RawMidiTransport {
    fn id(&self) -> HandleId;

    fn is_open(&self) -> bool;

    /// Submits a batch of frames to the native output path.
    ///
    /// `bytes` must be a whole number of [`FRAME_LEN`]-byte frames; anything
    /// else is rejected with [`Error::UnalignedWrite`] before touching the
    /// native layer. A platform-reported send is atomic across the batch:
    /// either every byte is accepted or an error is returned with zero
    /// bytes written. An empty buffer is accepted as a no-op.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Releases every native resource the handle owns.
    ///
    /// All release steps are attempted even if an earlier one fails; the
    /// first failure is returned and later ones are logged. Closing an
    /// already-closed handle reports [`Error::Closed`] without touching
    /// native state.
    fn close(&mut self) -> Result<()>;
}

/// Capability of backends whose native read suspends the calling thread.
pub trait BlockingReadable: RawMidiTransport {
    /// Blocks until one full frame has been read.
    ///
    /// Whether a concurrent `close` unblocks a pending read is
    /// backend-defined; see the implementing type.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Capability of backends that push inbound frames from a native thread.
pub trait PushDelivered: RawMidiTransport {
    /// Installs the sink invoked for each inbound frame.
    ///
    /// Deliveries that arrive before a sink is registered are dropped.
    /// Registering again replaces the previous sink.
    fn register_sink(&mut self, sink: FrameSink);
}

/// Rejects buffers that are not a whole number of frames.
pub(crate) fn check_alignment(bytes: &[u8]) -> Result<()> {
    if bytes.len() % FRAME_LEN != 0 {
        return Err(Error::UnalignedWrite { len: bytes.len() });
    }
    Ok(())
}
