//! Decoder module for animplayer
//!
//! The pixel-level decoding engine is an external collaborator; this module
//! defines the contract the playback pipeline consumes, the background
//! producer that drives it, and the single-slot channel frames travel
//! through.

mod buffer_pool;
mod frame_channel;
mod producer;
mod synthetic;

pub use buffer_pool::{
    BufferId, BufferPool, PixelBuffer, PixelFormat, PoolStats, PooledBuffers, SharedPool,
};
pub use frame_channel::{FrameChannel, RecvError, SendError, TryRecvError};
pub use producer::{FrameProducer, ProducerSettings};
pub use synthetic::SyntheticDecoder;

use crate::renderer::Color;

/// Decoder trait defining the interface for sequential frame decoding
///
/// One caller at a time; no thread affinity beyond that.
pub trait FrameDecoder: Send {
    /// Animation metadata. Must not change for the lifetime of the decoder.
    fn info(&self) -> AnimationInfo;

    /// Whether another frame can be decoded in the current loop iteration
    fn has_next_frame(&self) -> bool;

    /// Decode the next frame
    ///
    /// `reuse` may hold a pooled buffer. The decoder takes it out only when
    /// it writes the frame into it; a buffer of the wrong shape must be left
    /// in place. On failure the hint must be left (or put back) as well.
    ///
    /// # Returns
    ///
    /// The decoded frame, or `None` on decode failure or stream exhaustion
    fn decode_next_frame(&mut self, reuse: &mut Option<PixelBuffer>) -> Option<DecodedFrame>;

    /// Rewind to the first frame for a new loop iteration
    fn reset(&mut self);
}

/// Animation metadata, fixed for a decoder's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationInfo {
    /// Canvas width
    pub width: u32,

    /// Canvas height
    pub height: u32,

    /// Number of loop iterations, 0 = infinite
    pub loop_count: u32,

    /// Background color the animation asks for
    pub background_color: Color,

    /// Whether frames carry an alpha channel
    pub has_alpha: bool,

    /// Frames per loop iteration
    pub frame_count: u32,

    /// Layout of decoded pixels
    pub format: PixelFormat,
}

/// One decoded image plus its display duration
#[derive(Debug)]
pub struct DecodedFrame {
    pub buffer: PixelBuffer,
    pub duration_ms: u32,
}

impl DecodedFrame {
    pub fn new(buffer: PixelBuffer, duration_ms: u32) -> Self {
        Self { buffer, duration_ms }
    }
}
