//! V4L2 device driver layer: translates capture intent into kernel
//! device operations.

use std::fs;
use std::os::unix::fs::FileTypeExt;

use tracing::{debug, info, warn};
use v4l::capability::Flags;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::error::{CaptureError, Result};
use crate::format::{FourCC, RawFrame, VideoFormat};
use crate::ring::BufferRing;

/// Read-only snapshot of the device's capability query.
#[derive(Debug, Clone)]
pub struct DeviceCapability {
    /// Kernel driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Raw capability bitmask as reported by the kernel.
    pub raw_flags: u32,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming I/O.
    pub can_stream: bool,
}

/// Drives one capture device through open, negotiation, buffer mapping
/// and streaming.
///
/// The device descriptor and the buffer ring are held only while the
/// driver is streaming; a failed start releases every partially
/// acquired resource before the error is returned, and [`Self::stop`]
/// always attempts every teardown step.
pub struct V4l2Driver {
    requested: VideoFormat,
    granted: VideoFormat,
    device: Option<Device>,
    capability: Option<DeviceCapability>,
    ring: Option<BufferRing>,
}

impl V4l2Driver {
    /// Create a driver for the given capture format. No device state is
    /// touched until [`Self::start`].
    #[must_use]
    pub fn new(requested: VideoFormat) -> Self {
        let granted = requested.clone();
        Self {
            requested,
            granted,
            device: None,
            capability: None,
            ring: None,
        }
    }

    /// Run the ordered start sequence: open, query capability, negotiate
    /// format and frame rate, map the buffer ring, stream on.
    ///
    /// Each step may fail independently; on failure everything acquired
    /// so far is released and the driver is left exactly as before the
    /// call.
    pub fn start(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Err(CaptureError::initialization(
                "driver is already streaming",
            ));
        }

        let device = self.open_device()?;
        let capability = self.query_capability(&device)?;
        let granted = self.negotiate_format(&device)?;
        let mut ring = BufferRing::map(&device)?;
        ring.stream_on()?;

        info!(
            device = %self.requested.device.display(),
            driver = %capability.driver,
            "capture stream started"
        );
        self.granted = granted;
        self.capability = Some(capability);
        self.ring = Some(ring);
        self.device = Some(device);
        Ok(())
    }

    /// Block until the next filled slot and copy it out as a frame.
    pub fn dequeue_frame(&mut self) -> Result<RawFrame> {
        let ring = self
            .ring
            .as_mut()
            .ok_or_else(|| CaptureError::initialization("dequeue without an active stream"))?;
        ring.dequeue_frame(&self.granted)
    }

    /// Stop streaming and release the ring and the device descriptor.
    ///
    /// Every teardown step is attempted even if an earlier one fails;
    /// the first failure is returned. Calling this on a driver that is
    /// not streaming is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let mut first_error = None;

        if let Some(ring) = self.ring.as_mut() {
            if ring.is_streaming() {
                if let Err(err) = ring.stream_off() {
                    warn!(error = %err, "stream-off failed during teardown");
                    first_error = Some(err);
                }
            }
        }
        // Unmap the ring, then close the descriptor, regardless of the
        // stream-off outcome.
        self.ring = None;
        self.capability = None;
        if self.device.take().is_some() {
            debug!(device = %self.requested.device.display(), "capture device closed");
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Capability snapshot taken at start, while streaming.
    #[must_use]
    pub const fn capability(&self) -> Option<&DeviceCapability> {
        self.capability.as_ref()
    }

    /// Format the device actually granted (valid while streaming).
    #[must_use]
    pub const fn granted_format(&self) -> &VideoFormat {
        &self.granted
    }

    /// Whether the driver currently holds a streaming device.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.ring.as_ref().is_some_and(BufferRing::is_streaming)
    }

    fn open_device(&self) -> Result<Device> {
        let path = &self.requested.device;
        let unavailable = |reason: String| CaptureError::DeviceUnavailable {
            path: path.clone(),
            reason,
        };

        let metadata =
            fs::metadata(path).map_err(|err| unavailable(format!("cannot stat: {err}")))?;
        if !metadata.file_type().is_char_device() {
            return Err(unavailable("not a character device".to_owned()));
        }

        let device =
            Device::with_path(path).map_err(|err| unavailable(format!("open failed: {err}")))?;
        debug!(device = %path.display(), "capture device opened");
        Ok(device)
    }

    fn query_capability(&self, device: &Device) -> Result<DeviceCapability> {
        let caps = device.query_caps().map_err(|source| CaptureError::Ioctl {
            op: "VIDIOC_QUERYCAP",
            source,
        })?;

        let capability = DeviceCapability {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            raw_flags: caps.capabilities.bits(),
            can_capture: caps.capabilities.contains(Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(Flags::STREAMING),
        };
        info!(
            driver = %capability.driver,
            card = %capability.card,
            bus = %capability.bus_info,
            "queried device capabilities"
        );

        let reject = |missing: &str| CaptureError::UnsupportedDevice {
            path: self.requested.device.clone(),
            missing: missing.to_owned(),
        };
        if !capability.can_capture {
            return Err(reject("video capture capability"));
        }
        if !capability.can_stream {
            return Err(reject("streaming I/O capability"));
        }
        Ok(capability)
    }

    fn negotiate_format(&self, device: &Device) -> Result<VideoFormat> {
        let fourcc = self.requested.encoding.fourcc().ok_or_else(|| {
            CaptureError::initialization(format!(
                "pixel encoding {} cannot be negotiated",
                self.requested.encoding
            ))
        })?;

        // Read the device's active format descriptor and overlay the
        // requested geometry and encoding on it.
        let mut fmt = device.format().map_err(|source| CaptureError::Ioctl {
            op: "VIDIOC_G_FMT",
            source,
        })?;
        debug!(active = ?fmt, "active device format");

        fmt.width = self.requested.width;
        fmt.height = self.requested.height;
        fmt.fourcc = fourcc.into();
        let fmt = device.set_format(&fmt).map_err(|source| CaptureError::Ioctl {
            op: "VIDIOC_S_FMT",
            source,
        })?;

        if FourCC::from(fmt.fourcc) != fourcc {
            return Err(CaptureError::UnsupportedDevice {
                path: self.requested.device.clone(),
                missing: format!("pixel format {}", self.requested.encoding),
            });
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let fps = self.requested.frame_rate.round().max(1.0) as u32;
        let params = device
            .set_params(&Parameters::with_fps(fps))
            .map_err(|source| CaptureError::Ioctl {
                op: "VIDIOC_S_PARM",
                source,
            })?;
        debug!(params = ?params, "frame interval negotiated");

        let granted = VideoFormat {
            encoding: self.requested.encoding,
            width: fmt.width,
            height: fmt.height,
            frame_rate: self.requested.frame_rate,
            device: self.requested.device.clone(),
        };
        info!(
            width = granted.width,
            height = granted.height,
            fourcc = %FourCC::from(fmt.fourcc),
            fps,
            "format negotiated"
        );
        if granted.width != self.requested.width || granted.height != self.requested.height {
            warn!(
                requested_width = self.requested.width,
                requested_height = self.requested.height,
                "device adjusted the requested geometry"
            );
        }
        Ok(granted)
    }
}
