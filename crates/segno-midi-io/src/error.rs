//! Error types for the raw MIDI transport layer.
//!
//! Native platform status codes are passed through unchanged as error
//! payloads; nothing here renumbers or wraps them. Every error is terminal
//! for the call that produced it — retry policy belongs to the caller.

use crate::transport::Direction;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The device identifier did not resolve to a native endpoint.
    #[error("MIDI device not found: {0}")]
    DeviceNotFound(String),

    /// The identifier resolved, but to an object of the wrong directionality.
    #[error("'{identifier}' is not a MIDI {expected} endpoint")]
    DeviceTypeMismatch {
        identifier: String,
        expected: Direction,
    },

    /// Native client/port/stream acquisition or release failed.
    #[error("{stage} failed (native status {status})")]
    Resource { stage: &'static str, status: i32 },

    /// The encoded packet list exceeds the native buffer-size limit.
    #[error("packet list needs {required} bytes, native limit is {limit}")]
    BufferEncoding { required: usize, limit: usize },

    /// The native output path rejected the submit; zero bytes were written.
    #[error("native send rejected (native status {status})")]
    Send { status: i32 },

    /// Write buffers must be a whole number of 3-byte frames.
    #[error("write of {len} bytes is not a whole number of 3-byte frames")]
    UnalignedWrite { len: usize },

    /// The handle was already closed.
    #[error("transport is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
