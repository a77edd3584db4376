//! Kernel-mapped buffer ring used to exchange frames with the driver.

use std::io;

use tracing::debug;
use v4l::buffer::Type;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::MmapStream;
use v4l::Device;

use crate::error::{CaptureError, Result};
use crate::format::{RawFrame, VideoFormat};

/// Number of slots in the kernel buffer ring. Decided at map time and
/// never resized.
pub const RING_CAPACITY: u32 = 4;

/// Fixed set of memory regions shared with the kernel driver.
///
/// The regions are requested and mapped as a unit at construction and
/// unmapped as a unit on drop; partial mapping states exist only inside
/// the rollback path of a failed construction. Slots never escape this
/// type: [`BufferRing::dequeue_frame`] copies a slot's bytes into a
/// fresh [`RawFrame`] and the slot returns to the kernel on the next
/// dequeue cycle.
pub struct BufferRing {
    stream: MmapStream<'static>,
    streaming: bool,
}

impl BufferRing {
    /// Request [`RING_CAPACITY`] kernel buffers and map each one into
    /// process space.
    ///
    /// On failure everything mapped so far is unmapped before the error
    /// is returned.
    pub fn map(device: &Device) -> Result<Self> {
        let stream = MmapStream::with_buffers(device, Type::VideoCapture, RING_CAPACITY)
            .map_err(|source| CaptureError::BufferAllocation { source })?;
        debug!(slots = RING_CAPACITY, "buffer ring mapped");
        Ok(Self {
            stream,
            streaming: false,
        })
    }

    /// Enqueue every slot and switch the kernel into streaming mode.
    pub fn stream_on(&mut self) -> Result<()> {
        retry_interrupted(|| self.stream.start()).map_err(|source| CaptureError::Ioctl {
            op: "VIDIOC_STREAMON",
            source,
        })?;
        self.streaming = true;
        debug!("streaming on");
        Ok(())
    }

    /// Switch the kernel out of streaming mode, abandoning in-flight
    /// slots.
    pub fn stream_off(&mut self) -> Result<()> {
        retry_interrupted(|| self.stream.stop()).map_err(|source| CaptureError::Ioctl {
            op: "VIDIOC_STREAMOFF",
            source,
        })?;
        self.streaming = false;
        debug!("streaming off");
        Ok(())
    }

    /// Whether the ring is currently streaming.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Block until the driver hands back a filled slot, then copy the
    /// reported number of bytes into a fresh [`RawFrame`].
    ///
    /// A dequeue interrupted by a signal is retried transparently; any
    /// other failure propagates. The slot itself is re-enqueued before
    /// the next dequeue on the same ring.
    pub fn dequeue_frame(&mut self, format: &VideoFormat) -> Result<RawFrame> {
        loop {
            match self.stream.next() {
                Ok((slot, meta)) => {
                    let len = (meta.bytesused as usize).min(slot.len());
                    let data = slot.get(..len).unwrap_or(slot).to_vec();
                    return Ok(RawFrame {
                        format: format.clone(),
                        data,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => {
                    return Err(CaptureError::Ioctl {
                        op: "VIDIOC_DQBUF",
                        source,
                    })
                }
            }
        }
    }
}

/// Retry a kernel call while it reports interruption by a signal.
fn retry_interrupted<T, F>(mut call: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    loop {
        match call() {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}
