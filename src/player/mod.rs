//! Playback module for animplayer
//!
//! This module owns the consumer side of the pipeline: the controller that
//! reacts to render callbacks, the session it runs, and the delay estimator
//! that keeps frame cadence honest.

mod controller;
mod delay;

pub use controller::{PlaybackController, PlaybackControllerBuilder};
pub use delay::{next_frame_delay, QueueDelayEstimator, DELAY_WINDOW, INITIAL_DELAY_MS, MAX_DELAY_MS};

use serde::Serialize;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    /// No session
    Idle,

    /// Session active: producer live, channel open
    Running,
}

/// Opacity hint for the host's compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Opacity {
    /// Every pixel is opaque
    Opaque,

    /// Frames may contain transparent pixels
    Translucent,
}

/// State transitions reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A session started
    Started,

    /// The host stopped the session
    Stopped,

    /// The animation ran out of frames
    Finished,
}

/// Player event handler trait
pub trait PlaybackEventHandler: Send {
    /// Handle playback event
    fn handle_event(&mut self, event: PlaybackEvent);
}

impl<F: FnMut(PlaybackEvent) + Send> PlaybackEventHandler for F {
    fn handle_event(&mut self, event: PlaybackEvent) {
        self(event)
    }
}

/// Playback statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackStats {
    /// Sessions started
    pub sessions: u64,

    /// New frames presented
    pub frames_rendered: u64,

    /// Callbacks that repainted the frame already on screen
    pub redraws: u64,

    /// Asynchronous waits for a late frame
    pub frame_waits: u64,

    /// Current queue delay estimate in milliseconds
    pub queue_delay_ms: u32,
}
