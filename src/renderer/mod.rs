//! Renderer module for animplayer
//!
//! The actual rendering surface belongs to the host. The pipeline talks to it
//! through two seams:
//! - [`Canvas`], handed to every render callback, receives the pixels;
//! - [`Invalidator`], shared with background tasks, asks the host for
//!   render callbacks now or at a given instant.

pub mod headless;

pub use headless::{ChannelInvalidator, HeadlessCanvas, RenderLoop, RenderRequest};

use crate::decoder::PixelBuffer;
use std::time::Instant;

/// Draw-time target for one render callback
pub trait Canvas {
    /// Fill the whole target with a color
    fn fill(&mut self, color: Color);

    /// Composite a pixel buffer into `dst`
    ///
    /// The buffer is only borrowed for the call; the surface must not keep
    /// references to its pixels beyond what the release policy allows.
    fn draw_buffer(&mut self, buffer: &PixelBuffer, dst: Bounds, paint: &Paint);
}

/// Render-callback scheduling facility of the host surface
pub trait Invalidator: Send + Sync {
    /// Request a render callback as soon as possible
    fn invalidate(&self);

    /// Request a render callback at `at`, replacing any earlier request
    fn schedule_invalidate(&self, at: Instant);

    /// Drop a callback requested through `schedule_invalidate`
    fn cancel_scheduled(&self);
}

/// 32-bit ARGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0x0000_0000);
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const WHITE: Color = Color(0xFFFF_FFFF);

    pub fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color(u32::from_be_bytes([a, r, g, b]))
    }

    pub fn alpha(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    pub fn is_transparent(self) -> bool {
        self.alpha() == 0
    }
}

/// Destination rectangle in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Compositing properties applied when a frame is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paint {
    /// Global opacity, 255 = opaque
    pub alpha: u8,

    /// Filter when scaling the buffer into its bounds
    pub filter_bitmap: bool,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            alpha: 255,
            filter_bitmap: true,
        }
    }
}
