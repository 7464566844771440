//! animplayer - animated image playback pipeline
//!
//! A decoder runs on a background producer thread and hands frames one at a
//! time to a playback controller that lives on the host's render thread.
//! Pixel buffers are pooled, and callback scheduling compensates for the
//! host's observed render latency.

pub mod decoder;
pub mod player;
pub mod renderer;
pub mod utils;

pub use decoder::{AnimationInfo, DecodedFrame, FrameDecoder, PixelBuffer, SharedPool};
pub use player::{PlaybackController, PlaybackControllerBuilder, PlaybackEvent, PlaybackState};
pub use renderer::{Canvas, Invalidator};
pub use utils::{AnimError, Config, Result};
