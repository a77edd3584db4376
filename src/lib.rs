//! Vidcap: continuous raw-frame capture from V4L2 devices.
//!
//! The library negotiates device capabilities and formats, maps a
//! kernel buffer ring, and runs a blocking capture loop that starts and
//! stops deterministically. A lifecycle coordinator owns the capture
//! and signal-manager threads and translates a termination signal into
//! the cooperative stop flag the loop polls.
//!
//! Capture backends implement the [`engine::CaptureEngine`] trait;
//! production code uses [`engine::V4l2CaptureEngine`], tests substitute
//! a mock with identical lifecycle semantics.

pub mod driver;
pub mod engine;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod ring;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use driver::{DeviceCapability, V4l2Driver};
pub use engine::{CaptureEngine, CaptureState, V4l2CaptureEngine};
pub use error::{CaptureError, Result};
pub use format::{FourCC, PixelEncoding, RawFrame, VideoFormat};
pub use lifecycle::{Coordinator, StopFlag, ThreadRole};
pub use ring::{BufferRing, RING_CAPACITY};
