//! Procedural decoder
//!
//! Produces solid frames with fixed durations. Each frame's pixels carry a
//! marker derived from its index so a consumer can tell frames apart.

use crate::decoder::{AnimationInfo, DecodedFrame, FrameDecoder, PixelBuffer, PixelFormat};
use crate::renderer::Color;
use crate::utils::error::{AnimError, Result};

/// Decoder that renders one solid frame per configured duration
#[derive(Debug, Clone)]
pub struct SyntheticDecoder {
    width: u32,
    height: u32,
    durations: Vec<u32>,
    loop_count: u32,
    background_color: Color,
    has_alpha: bool,

    /// Index of the next frame within the current iteration
    cursor: usize,
}

impl SyntheticDecoder {
    /// Create a decoder for `durations.len()` frames, looping forever
    pub fn new(width: u32, height: u32, durations: Vec<u32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AnimError::invalid_input(format!(
                "Animation size {}x{} must be non-zero",
                width, height
            )));
        }

        Ok(Self {
            width,
            height,
            durations,
            loop_count: 0,
            background_color: Color::TRANSPARENT,
            has_alpha: true,
            cursor: 0,
        })
    }

    pub fn with_loop_count(mut self, loop_count: u32) -> Self {
        self.loop_count = loop_count;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background_color = color;
        self
    }

    pub fn with_alpha(mut self, has_alpha: bool) -> Self {
        self.has_alpha = has_alpha;
        self
    }

    /// Pixel value written for the frame at `index`
    pub fn frame_marker(index: usize) -> u32 {
        0xFF00_0000 | ((index as u32).wrapping_add(1) & 0x00FF_FFFF)
    }
}

impl FrameDecoder for SyntheticDecoder {
    fn info(&self) -> AnimationInfo {
        AnimationInfo {
            width: self.width,
            height: self.height,
            loop_count: self.loop_count,
            background_color: self.background_color,
            has_alpha: self.has_alpha,
            frame_count: self.durations.len() as u32,
            format: PixelFormat::Rgba8888,
        }
    }

    fn has_next_frame(&self) -> bool {
        self.cursor < self.durations.len()
    }

    fn decode_next_frame(&mut self, reuse: &mut Option<PixelBuffer>) -> Option<DecodedFrame> {
        let duration_ms = *self.durations.get(self.cursor)?;

        let mut buffer = match reuse.take() {
            Some(buffer) if buffer.matches(self.width, self.height, PixelFormat::Rgba8888) => buffer,
            other => {
                *reuse = other;
                PixelBuffer::new(self.width, self.height, PixelFormat::Rgba8888)
            }
        };

        buffer.pixels_mut().fill(Self::frame_marker(self.cursor));
        self.cursor += 1;
        Some(DecodedFrame::new(buffer, duration_ms))
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}
