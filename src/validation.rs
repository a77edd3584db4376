//! Frame validation utilities for test pattern verification.
//!
//! These helpers check that delivered frames have the geometry their
//! format promises and, for synthetic sources, that they contain the
//! expected test pattern. Validation failures are plain strings; they
//! are diagnostics for tests, not capture errors.

use crate::format::{PixelEncoding, RawFrame, VideoFormat};

/// Expected RGB values for SMPTE color bars (8 bars), as they come out
/// of the YUV-to-RGB conversion of the generator's YUV values.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue,
/// Black.
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 11),
    (12, 236, 237),
    (13, 237, 13),
    (237, 13, 237),
    (238, 14, 13),
    (15, 15, 239),
    (16, 16, 16),
];

/// Tolerance for RGB color matching (absorbs YUV->RGB rounding).
const COLOR_TOLERANCE: u32 = 15;

/// Byte length one frame of the given format must have, `None` when the
/// encoding has no fixed layout.
#[must_use]
pub fn expected_frame_len(format: &VideoFormat) -> Option<usize> {
    let bits = format.encoding.bits_per_pixel()?;
    Some(format.width as usize * format.height as usize * bits as usize / 8)
}

/// Check that a frame's byte length matches its format.
pub fn validate_frame_len(frame: &RawFrame) -> Result<(), String> {
    let Some(expected) = expected_frame_len(&frame.format) else {
        return Err(format!(
            "encoding {} has no fixed frame length",
            frame.format.encoding
        ));
    };
    if frame.len() < expected {
        return Err(format!(
            "frame too small: {} bytes, expected {expected}",
            frame.len()
        ));
    }
    Ok(())
}

/// Check that a YUYV frame contains the SMPTE color bar pattern.
///
/// Samples the center of each of the 8 vertical bars and compares
/// against the expected colors within [`COLOR_TOLERANCE`].
pub fn validate_color_bars(frame: &RawFrame) -> Result<(), String> {
    require_yuyv(frame)?;
    let width = frame.format.width;
    let bar_width = (width / 8).max(1);
    let center_y = frame.format.height / 2;

    for (bar_idx, expected) in SMPTE_COLOR_BARS.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let sample_x = (bar_idx as u32 * bar_width) + (bar_width / 2);

        let actual = frame
            .pixel_at(sample_x, center_y)
            .ok_or_else(|| format!("no pixel at ({sample_x}, {center_y})"))?;

        if !colors_match(actual, *expected, COLOR_TOLERANCE) {
            return Err(format!(
                "color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected:?}, got RGB{actual:?}"
            ));
        }
    }
    Ok(())
}

/// Check that a YUYV frame contains a horizontal gradient.
///
/// Luminance along the center row must increase monotonically (within
/// rounding) and span a significant range overall.
pub fn validate_gradient(frame: &RawFrame) -> Result<(), String> {
    require_yuyv(frame)?;
    let width = frame.format.width;
    let center_y = frame.format.height / 2;

    let mut first = None;
    let mut prev: Option<f32> = None;
    let mut last = None;

    for x in (0..width).step_by(10) {
        let (r, g, b) = frame
            .pixel_at(x, center_y)
            .ok_or_else(|| format!("no pixel at ({x}, {center_y})"))?;

        // Rec. 601 luma.
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        if first.is_none() {
            first = Some(luminance);
        }
        if let Some(prev) = prev {
            if luminance < prev - 1.0 {
                return Err(format!(
                    "gradient not monotonically increasing at x={x}: \
                     luminance {luminance} < previous {prev}"
                ));
            }
        }
        prev = Some(luminance);
        last = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first, last) {
        let change = last - first;
        if change < 50.0 {
            return Err(format!(
                "insufficient luminance change for a gradient: {change} (expected at least 50)"
            ));
        }
    }
    Ok(())
}

fn require_yuyv(frame: &RawFrame) -> Result<(), String> {
    if frame.format.encoding == PixelEncoding::Yuyv {
        Ok(())
    } else {
        Err(format!(
            "pattern validation needs YUYV, frame is {}",
            frame.format.encoding
        ))
    }
}

/// Whether two RGB colors match within a per-channel tolerance.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u32) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    u32::from(ar).abs_diff(u32::from(er)) <= tolerance
        && u32::from(ag).abs_diff(u32::from(eg)) <= tolerance
        && u32::from(ab).abs_diff(u32::from(eb)) <= tolerance
}
