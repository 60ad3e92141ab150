//! Raw frame representation handed from a [`ScreenSource`](super::ScreenSource)
//! to the rest of the pipeline.

use std::time::Instant;

use image::RgbImage;

use crate::error::SpanError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a raw capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Blue, Green, Red, Alpha (GDI / DXGI default).
    Bgra8,
    Rgba8,
    Rgb8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

// ── RawScreenFrame ───────────────────────────────────────────────

/// An uncompressed screen grab.
///
/// `data` holds `height` rows of `stride` bytes; `stride` may exceed
/// `width * bytes_per_pixel` when the source pads rows.
#[derive(Debug, Clone)]
pub struct RawScreenFrame {
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub captured_at: Instant,
}

impl RawScreenFrame {
    /// Tightly packed frame (`stride == width * bpp`).
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel() as u32,
            format,
            data,
            captured_at: Instant::now(),
        }
    }

    /// Bytes of visible pixels in one row (no padding).
    pub fn row_len(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Visible pixel bytes of row `y`, or `None` past the buffer end.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let start = y as usize * self.stride as usize;
        self.data.get(start..start + self.row_len())
    }

    /// Check that the buffer covers `height` rows of visible pixels.
    pub fn validate(&self) -> Result<(), SpanError> {
        if self.width == 0 || self.height == 0 {
            return Err(SpanError::CaptureUnavailable("empty capture".into()));
        }
        if (self.stride as usize) < self.row_len() {
            return Err(SpanError::Encoding(format!(
                "stride {} shorter than row of {} bytes",
                self.stride,
                self.row_len()
            )));
        }
        if self.row(self.height - 1).is_none() {
            return Err(SpanError::Encoding(format!(
                "capture buffer of {} bytes too small for {}x{}",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Convert to a packed RGB image (JPEG has no alpha).
    pub fn to_rgb_image(&self) -> Result<RgbImage, SpanError> {
        self.validate()?;
        let bpp = self.format.bytes_per_pixel();
        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);

        for y in 0..self.height {
            let row = self.row(y).unwrap_or_default();
            for px in row.chunks_exact(bpp) {
                match self.format {
                    PixelFormat::Bgra8 => rgb.extend_from_slice(&[px[2], px[1], px[0]]),
                    PixelFormat::Rgba8 | PixelFormat::Rgb8 => rgb.extend_from_slice(&px[..3]),
                }
            }
        }

        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| SpanError::Encoding("RGB buffer size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_converts_to_rgb() {
        let raw = RawScreenFrame::packed(1, 1, PixelFormat::Bgra8, vec![10, 20, 30, 255]);
        let img = raw.to_rgb_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn padded_rows_are_skipped() {
        // 1x2 RGBA with 8-byte stride (4 padding bytes per row).
        let data = vec![1, 2, 3, 0, 9, 9, 9, 9, 4, 5, 6, 0, 9, 9, 9, 9];
        let raw = RawScreenFrame {
            width: 1,
            height: 2,
            stride: 8,
            format: PixelFormat::Rgba8,
            data,
            captured_at: Instant::now(),
        };
        let img = raw.to_rgb_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(img.get_pixel(0, 1).0, [4, 5, 6]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let raw = RawScreenFrame::packed(4, 4, PixelFormat::Bgra8, vec![0; 10]);
        assert!(matches!(raw.validate(), Err(SpanError::Encoding(_))));
    }
}
