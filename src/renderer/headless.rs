//! Headless rendering surface
//!
//! A canvas that only records what it was asked to draw, an invalidator
//! that forwards requests over a channel, and the loop that turns those
//! requests into render callbacks on the calling thread.

use crate::decoder::{BufferId, PixelBuffer};
use crate::player::PlaybackController;
use crate::renderer::{Bounds, Canvas, Color, Invalidator, Paint};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::trace;
use std::time::Instant;

/// Render request forwarded from an [`Invalidator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderRequest {
    /// Render as soon as possible
    Now,
    /// Render at the given instant
    At(Instant),
    /// Forget the pending `At` request
    Cancel,
}

/// Invalidator that sends every request down a channel
#[derive(Debug, Clone)]
pub struct ChannelInvalidator {
    requests: Sender<RenderRequest>,
}

impl ChannelInvalidator {
    /// Create an invalidator and the loop that services it
    pub fn channel() -> (Self, RenderLoop) {
        let (requests, receiver) = crossbeam_channel::unbounded();
        (
            Self { requests },
            RenderLoop {
                requests: receiver,
                deadline: None,
                callbacks: 0,
            },
        )
    }

    fn send(&self, request: RenderRequest) {
        // The loop being gone just means nobody renders anymore.
        let _ = self.requests.send(request);
    }
}

impl Invalidator for ChannelInvalidator {
    fn invalidate(&self) {
        self.send(RenderRequest::Now);
    }

    fn schedule_invalidate(&self, at: Instant) {
        self.send(RenderRequest::At(at));
    }

    fn cancel_scheduled(&self) {
        self.send(RenderRequest::Cancel);
    }
}

/// Single-threaded render loop servicing a [`ChannelInvalidator`]
pub struct RenderLoop {
    requests: Receiver<RenderRequest>,
    deadline: Option<Instant>,
    callbacks: u64,
}

impl RenderLoop {
    /// Render callbacks issued so far
    pub fn callbacks(&self) -> u64 {
        self.callbacks
    }

    /// Issue render callbacks until playback goes idle or `until` passes
    ///
    /// # Returns
    ///
    /// `true` if playback went idle, `false` if `until` was reached first
    pub fn run(
        &mut self,
        controller: &mut PlaybackController,
        canvas: &mut dyn Canvas,
        until: Option<Instant>,
    ) -> bool {
        loop {
            if !controller.is_running() {
                return true;
            }

            let wake = match (self.deadline, until) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let request = match wake {
                Some(at) => self.requests.recv_deadline(at),
                None => self.requests.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match request {
                Ok(RenderRequest::Now) => self.fire(controller, canvas),
                Ok(RenderRequest::At(at)) => self.deadline = Some(at),
                Ok(RenderRequest::Cancel) => self.deadline = None,
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    if self.deadline.is_some_and(|at| now >= at) {
                        self.deadline = None;
                        self.fire(controller, canvas);
                    } else if until.is_some_and(|at| now >= at) {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return !controller.is_running(),
            }
        }
    }

    fn fire(&mut self, controller: &mut PlaybackController, canvas: &mut dyn Canvas) {
        self.callbacks += 1;
        controller.on_render_callback(canvas, Instant::now());
    }
}

/// Canvas that keeps a tally of draw calls
#[derive(Debug, Default)]
pub struct HeadlessCanvas {
    /// Buffers composited, in order, with their first pixel
    pub draws: Vec<(BufferId, u32)>,

    /// Background fills
    pub fills: Vec<Color>,
}

impl HeadlessCanvas {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Canvas for HeadlessCanvas {
    fn fill(&mut self, color: Color) {
        self.fills.push(color);
    }

    fn draw_buffer(&mut self, buffer: &PixelBuffer, dst: Bounds, paint: &Paint) {
        let first = buffer.pixels().first().copied().unwrap_or_default();
        trace!(
            "Drawing buffer {:?} into {:?} (alpha {})",
            buffer.id(),
            dst,
            paint.alpha
        );
        self.draws.push((buffer.id(), first));
    }
}
