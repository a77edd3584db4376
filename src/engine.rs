//! Capture engine lifecycle state machine.

use tracing::{debug, error, info};

use crate::driver::V4l2Driver;
use crate::error::{CaptureError, Result};
use crate::format::{RawFrame, VideoFormat};
use crate::lifecycle::StopFlag;

/// How often the capture loop emits a per-frame debug event.
const LOG_EVERY_N_FRAMES: u64 = 30;

/// Lifecycle states of a capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No driver constructed yet.
    Uninitialized,
    /// Driver constructed, device untouched.
    Initialized,
    /// Device open, ring mapped, kernel streaming.
    Streaming,
    /// Streaming ended; the engine can restart or be released.
    Stopped,
}

/// Capability set of a capture backend.
///
/// One production implementation drives real hardware
/// ([`V4l2CaptureEngine`]); tests substitute a synthetic backend with
/// identical lifecycle semantics.
pub trait CaptureEngine {
    /// Construct the backend for the given format.
    ///
    /// Calling this on an already-initialized engine releases the
    /// previous backend first.
    fn init(&mut self, format: VideoFormat) -> Result<()>;

    /// Release the backend and any held frame storage.
    fn uninit(&mut self) -> Result<()>;

    /// Acquire the device and start streaming. On failure the engine
    /// stays in its previous state with no resources retained.
    fn start_capture(&mut self) -> Result<()>;

    /// Stop streaming and release device resources. Idempotent once the
    /// engine has been initialized.
    fn stop_capture(&mut self) -> Result<()>;

    /// Capture frames until the stop flag is raised or a dequeue fails
    /// non-transiently. The flag is polled at least once per dequeue
    /// cycle.
    fn run_capture_loop(&mut self, stop: &StopFlag) -> Result<()>;

    /// True iff the engine is streaming.
    fn is_capturing(&self) -> bool;

    /// Current lifecycle state.
    fn state(&self) -> CaptureState;

    /// Hand a completed frame to the engine's delivery sink. The
    /// previously delivered frame is released first; the engine retains
    /// at most one frame.
    fn deliver_video_data(&mut self, frame: RawFrame) -> Result<()>;

    /// Most recently delivered frame, if any.
    fn last_frame(&self) -> Option<&RawFrame>;
}

/// Capture engine backed by a V4L2 device.
pub struct V4l2CaptureEngine {
    state: CaptureState,
    driver: Option<V4l2Driver>,
    current_frame: Option<RawFrame>,
}

impl Default for V4l2CaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2CaptureEngine {
    /// Create an engine in the [`CaptureState::Uninitialized`] state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: CaptureState::Uninitialized,
            driver: None,
            current_frame: None,
        }
    }

    fn driver_mut(&mut self) -> Result<&mut V4l2Driver> {
        self.driver
            .as_mut()
            .ok_or_else(|| CaptureError::initialization("engine has no device driver"))
    }
}

impl CaptureEngine for V4l2CaptureEngine {
    fn init(&mut self, format: VideoFormat) -> Result<()> {
        if format.device.as_os_str().is_empty() {
            return Err(CaptureError::initialization("no capture device supplied"));
        }
        if format.encoding.fourcc().is_none() {
            return Err(CaptureError::initialization(format!(
                "pixel encoding {} cannot be captured",
                format.encoding
            )));
        }

        if self.driver.take().is_some() {
            debug!("releasing previous driver instance before re-init");
            self.current_frame = None;
        }

        info!(%format, "capture engine initialized");
        self.driver = Some(V4l2Driver::new(format));
        self.state = CaptureState::Initialized;
        Ok(())
    }

    fn uninit(&mut self) -> Result<()> {
        if self.state == CaptureState::Streaming {
            return Err(CaptureError::initialization(
                "stop capture before releasing the engine",
            ));
        }
        self.driver = None;
        self.current_frame = None;
        self.state = CaptureState::Uninitialized;
        debug!("capture engine released");
        Ok(())
    }

    fn start_capture(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Initialized | CaptureState::Stopped => {}
            CaptureState::Streaming => {
                return Err(CaptureError::initialization("capture already running"))
            }
            CaptureState::Uninitialized => {
                return Err(CaptureError::initialization(
                    "initialize the engine before starting capture",
                ))
            }
        }

        self.driver_mut()?.start()?;
        self.state = CaptureState::Streaming;
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Uninitialized => Err(CaptureError::initialization(
                "engine was never initialized",
            )),
            CaptureState::Initialized | CaptureState::Stopped => Ok(()),
            CaptureState::Streaming => {
                let result = self.driver_mut()?.stop();
                // The device is gone even if a teardown step failed.
                self.state = CaptureState::Stopped;
                info!("capture stopped");
                result
            }
        }
    }

    fn run_capture_loop(&mut self, stop: &StopFlag) -> Result<()> {
        if self.state != CaptureState::Streaming {
            return Err(CaptureError::initialization(
                "capture loop requires a streaming engine",
            ));
        }

        info!("capture loop running");
        let mut frames: u64 = 0;
        loop {
            if stop.is_requested() {
                info!(frames, "capture loop observed stop request");
                return Ok(());
            }

            // Release the previous frame before the next copy so at
            // most one frame allocation is ever live.
            self.current_frame = None;
            let frame = match self.driver_mut()?.dequeue_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    error!(error = %err, frames, "capture loop aborting on dequeue failure");
                    return Err(err);
                }
            };

            frames += 1;
            if frames % LOG_EVERY_N_FRAMES == 0 {
                debug!(frames, bytes = frame.len(), "frames captured");
            }
            self.deliver_video_data(frame)?;
        }
    }

    fn is_capturing(&self) -> bool {
        self.state == CaptureState::Streaming
    }

    fn state(&self) -> CaptureState {
        self.state
    }

    fn deliver_video_data(&mut self, frame: RawFrame) -> Result<()> {
        self.current_frame.take();
        self.current_frame = Some(frame);
        Ok(())
    }

    fn last_frame(&self) -> Option<&RawFrame> {
        self.current_frame.as_ref()
    }
}
