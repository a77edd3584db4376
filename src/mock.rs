//! Mock capture engine for testing without hardware.

use std::thread;
use std::time::Duration;

use crate::engine::{CaptureEngine, CaptureState};
use crate::error::{CaptureError, Result};
use crate::format::{PixelEncoding, RawFrame, VideoFormat};
use crate::lifecycle::StopFlag;

/// Test pattern types for synthetic frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with the given Y, U, V values.
    Solid(u8, u8, u8),
}

/// Capture engine that synthesizes YUYV test-pattern frames.
///
/// Follows the same lifecycle state machine as the hardware engine so
/// lifecycle and coordinator tests can run without a device.
pub struct MockCaptureEngine {
    state: CaptureState,
    format: Option<VideoFormat>,
    pattern: TestPattern,
    current_frame: Option<RawFrame>,
    frames_generated: u64,
    fail_start: bool,
}

impl Default for MockCaptureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCaptureEngine {
    /// Create a mock engine rendering color bars.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: CaptureState::Uninitialized,
            format: None,
            pattern: TestPattern::ColorBars,
            current_frame: None,
            frames_generated: 0,
            fail_start: false,
        }
    }

    /// Select the generated test pattern.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Make `start_capture` fail, for exercising start-failure paths.
    #[must_use]
    pub const fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Total frames generated across capture runs.
    #[must_use]
    pub const fn frames_generated(&self) -> u64 {
        self.frames_generated
    }

    fn frame_interval(&self) -> Duration {
        let rate = self
            .format
            .as_ref()
            .map_or(30.0, |format| format.frame_rate)
            .max(1.0);
        Duration::from_secs_f32(1.0 / rate)
    }
}

impl CaptureEngine for MockCaptureEngine {
    fn init(&mut self, format: VideoFormat) -> Result<()> {
        if format.device.as_os_str().is_empty() {
            return Err(CaptureError::initialization("no capture device supplied"));
        }
        if format.encoding != PixelEncoding::Yuyv {
            return Err(CaptureError::initialization(format!(
                "mock engine only synthesizes YUYV, not {}",
                format.encoding
            )));
        }

        self.format = Some(format);
        self.current_frame = None;
        self.frames_generated = 0;
        self.state = CaptureState::Initialized;
        Ok(())
    }

    fn uninit(&mut self) -> Result<()> {
        if self.state == CaptureState::Streaming {
            return Err(CaptureError::initialization(
                "stop capture before releasing the engine",
            ));
        }
        self.format = None;
        self.current_frame = None;
        self.state = CaptureState::Uninitialized;
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

        if self.fail_start {
            let path = self
                .format
                .as_ref()
                .map(|format| format.device.clone())
                .unwrap_or_default();
            return Err(CaptureError::DeviceUnavailable {
                path,
                reason: "mock start failure".to_owned(),
            });
        }
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
                self.state = CaptureState::Stopped;
                Ok(())
            }
        }
    }

    fn run_capture_loop(&mut self, stop: &StopFlag) -> Result<()> {
        if self.state != CaptureState::Streaming {
            return Err(CaptureError::initialization(
                "capture loop requires a streaming engine",
            ));
        }
        let format = self
            .format
            .clone()
            .ok_or_else(|| CaptureError::initialization("engine has no format"))?;
        let interval = self.frame_interval();

        loop {
            if stop.is_requested() {
                return Ok(());
            }
            thread::sleep(interval);

            self.current_frame = None;
            let frame = generate_frame(&format, self.pattern);
            self.frames_generated += 1;
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

/// Synthesize one YUYV frame of the given pattern.
#[must_use]
pub fn generate_frame(format: &VideoFormat, pattern: TestPattern) -> RawFrame {
    let width = format.width.max(2);
    let size = (width * format.height * 2) as usize;
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => fill_color_bars(&mut data, width),
        TestPattern::Gradient => fill_gradient(&mut data, width),
        TestPattern::Solid(y, u, v) => fill_solid(&mut data, y, u, v),
    }

    RawFrame {
        format: format.clone(),
        data,
    }
}

/// YUV values for the 8 SMPTE bars: White, Yellow, Cyan, Green,
/// Magenta, Red, Blue, Black.
const BAR_YUV: [(u8, u8, u8); 8] = [
    (235, 128, 128),
    (210, 16, 146),
    (170, 166, 16),
    (145, 54, 34),
    (106, 202, 222),
    (81, 90, 240),
    (41, 240, 110),
    (16, 128, 128),
];

#[allow(clippy::cast_possible_truncation)]
fn fill_color_bars(data: &mut [u8], width: u32) {
    let bar_width = (width / 8).max(1);
    for (pair, quad) in data.chunks_exact_mut(4).enumerate() {
        let x = (pair as u32 * 2) % width;
        let (y, u, v) = BAR_YUV[((x / bar_width).min(7)) as usize];
        quad.copy_from_slice(&[y, u, y, v]);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn fill_gradient(data: &mut [u8], width: u32) {
    for (pair, quad) in data.chunks_exact_mut(4).enumerate() {
        let x = (pair as u32 * 2) % width;
        let y = ((x * 255) / width) as u8;
        quad.copy_from_slice(&[y, 128, y, 128]);
    }
}

fn fill_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for quad in data.chunks_exact_mut(4) {
        quad.copy_from_slice(&[y, u, y, v]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_format() -> VideoFormat {
        VideoFormat::new(PixelEncoding::Yuyv, 640, 480, 30.0, "mock:0")
    }

    #[test]
    fn mock_engine_walks_the_lifecycle() {
        let mut engine = MockCaptureEngine::new();
        assert_eq!(engine.state(), CaptureState::Uninitialized);

        engine.init(mock_format()).expect("init");
        assert_eq!(engine.state(), CaptureState::Initialized);

        engine.start_capture().expect("start");
        assert!(engine.is_capturing());

        engine.stop_capture().expect("stop");
        assert_eq!(engine.state(), CaptureState::Stopped);

        // A stopped engine can restart.
        engine.start_capture().expect("restart");
        engine.stop_capture().expect("stop again");
        engine.uninit().expect("uninit");
        assert_eq!(engine.state(), CaptureState::Uninitialized);
    }

    #[test]
    fn mock_engine_rejects_non_yuyv_formats() {
        let mut engine = MockCaptureEngine::new();
        let format = VideoFormat::new(PixelEncoding::I420, 640, 480, 30.0, "mock:0");
        assert!(engine.init(format).is_err());
    }

    #[test]
    fn capture_loop_generates_frames_until_stopped() {
        let mut engine = MockCaptureEngine::new();
        engine
            .init(VideoFormat::new(
                PixelEncoding::Yuyv,
                64,
                48,
                200.0,
                "mock:0",
            ))
            .expect("init");
        engine.start_capture().expect("start");

        let stop = StopFlag::new();
        let loop_stop = stop.clone();
        let worker = thread::spawn(move || {
            engine
                .run_capture_loop(&loop_stop)
                .expect("loop exits cleanly");
            engine
        });

        thread::sleep(Duration::from_millis(60));
        stop.request_stop();
        let mut engine = worker.join().expect("worker joins");

        assert!(engine.frames_generated() > 0);
        let frame = engine.last_frame().expect("a frame was delivered");
        assert_eq!(frame.len(), 64 * 48 * 2);

        engine.stop_capture().expect("stop");
        engine.uninit().expect("uninit");
    }

    #[test]
    fn color_bars_start_white() {
        let frame = generate_frame(&mock_format(), TestPattern::ColorBars);
        assert_eq!(frame.len(), 640 * 480 * 2);
        assert_eq!(frame.data.first().copied(), Some(235));
    }

    #[test]
    fn gradient_brightens_left_to_right() {
        let frame = generate_frame(&mock_format(), TestPattern::Gradient);
        let first = frame.data.first().copied().expect("data");
        let last_pair = frame.data.get(638 * 2).copied().expect("data");
        assert!(first < 10);
        assert!(last_pair > 200);
    }

    #[test]
    fn solid_fills_every_pair() {
        let format = VideoFormat::new(PixelEncoding::Yuyv, 64, 64, 30.0, "mock:0");
        let frame = generate_frame(&format, TestPattern::Solid(128, 64, 192));
        for quad in frame.data.chunks_exact(4) {
            assert_eq!(quad, &[128, 64, 128, 192]);
        }
    }
}
