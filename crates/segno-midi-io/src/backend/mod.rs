//! Hardware implementations of the native seams.
//!
//! Each binding is gated on its feature and platform; everything above it
//! is portable and runs against [`crate::mock`] elsewhere.

#[cfg(all(feature = "alsa", target_os = "linux"))]
pub mod alsa;

#[cfg(all(feature = "coremidi", target_os = "macos"))]
pub mod coremidi;
