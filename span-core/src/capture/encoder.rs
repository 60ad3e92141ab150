//! Downscale + JPEG encode.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::ColorType;

use crate::capture::types::RawScreenFrame;
use crate::error::SpanError;

/// An encoded image ready to publish.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Lossy frame encoder with a fixed target resolution.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    target_width: u32,
    target_height: u32,
    quality: u8,
}

impl FrameEncoder {
    /// `quality` is clamped to `1..=100`.
    pub fn new(target_width: u32, target_height: u32, quality: u8) -> Self {
        Self {
            target_width: target_width.max(1),
            target_height: target_height.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Output dimensions for a source of `width × height`.
    ///
    /// Sources larger than the target in either axis are scaled to exactly
    /// the target; smaller sources are sent at native size.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        if width > self.target_width || height > self.target_height {
            (self.target_width, self.target_height)
        } else {
            (width, height)
        }
    }

    pub fn encode(&self, raw: &RawScreenFrame) -> Result<EncodedImage, SpanError> {
        let rgb = raw.to_rgb_image()?;
        let (width, height) = self.output_size(raw.width, raw.height);
        let rgb = if (width, height) != (raw.width, raw.height) {
            imageops::resize(&rgb, width, height, FilterType::Triangle)
        } else {
            rgb
        };

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality).encode(
            rgb.as_raw(),
            width,
            height,
            ColorType::Rgb8,
        )?;

        Ok(EncodedImage {
            data,
            width,
            height,
        })
    }
}
