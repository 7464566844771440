//! Playback controller implementation for animplayer
//!
//! The controller lives on the host's render thread. Every render callback
//! either repaints the frame on screen or advances to the next decoded frame
//! and schedules the callback after it. Frames come from a producer thread
//! through a single-slot channel; when the next frame is late, a tokio task
//! waits for it and asks the host for another callback, leaving the frame in
//! a slot the render thread picks up.

use crate::decoder::{
    AnimationInfo, DecodedFrame, FrameChannel, FrameDecoder, FrameProducer, PixelBuffer,
    PooledBuffers, ProducerSettings, RecvError, SharedPool,
};
use crate::player::delay::{next_frame_delay, QueueDelayEstimator};
use crate::player::{Opacity, PlaybackEvent, PlaybackEventHandler, PlaybackState, PlaybackStats};
use crate::renderer::{Bounds, Canvas, Invalidator, Paint};
use crate::utils::config::{PlaybackConfig, ReleasePolicy};
use crate::utils::duration_to_ms;
use crate::utils::error::{AnimError, IntoAnimError, Result};

use log::{debug, error, info, trace};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tokio::runtime::Handle;

type WaitOutcome = std::result::Result<DecodedFrame, RecvError>;

/// Builder for [`PlaybackController`]
pub struct PlaybackControllerBuilder {
    config: PlaybackConfig,
    pool: Option<SharedPool>,
    runtime: Option<Handle>,
    event_handler: Option<Box<dyn PlaybackEventHandler>>,
}

impl Default for PlaybackControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackControllerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: PlaybackConfig::default(),
            pool: None,
            runtime: None,
            event_handler: None,
        }
    }

    /// Set playback configuration
    pub fn with_config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing buffer pool instead of creating one
    pub fn with_pool(mut self, pool: SharedPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Runtime that hosts the frame-wait task (defaults to the current one)
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Receive state transitions
    pub fn with_event_handler(mut self, handler: Box<dyn PlaybackEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the controller. Decoder metadata is read once, here.
    pub fn build(
        self,
        decoder: Box<dyn FrameDecoder>,
        invalidator: Arc<dyn Invalidator>,
    ) -> Result<PlaybackController> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|_| AnimError::invalid_input("No tokio runtime; call with_runtime()"))?,
        };

        let info = decoder.info();
        if info.width == 0 || info.height == 0 {
            return Err(AnimError::invalid_input(format!(
                "Animation size {}x{} must be non-zero",
                info.width, info.height
            )));
        }

        let pool = self
            .pool
            .unwrap_or_else(|| SharedPool::new(PooledBuffers::new(self.config.pool_capacity)));

        debug!(
            "Animation {}x{}, {} frames, loop count {}, alpha {}",
            info.width, info.height, info.frame_count, info.loop_count, info.has_alpha
        );

        Ok(PlaybackController {
            info,
            estimator: QueueDelayEstimator::new(self.config.delay),
            config: self.config,
            decoder: Some(decoder),
            decoder_fresh: true,
            pool,
            invalidator,
            runtime,
            session: None,
            displayed: None,
            retired: Vec::new(),
            paint: Paint::default(),
            bounds: Bounds::from_size(info.width, info.height),
            stats: PlaybackStats::default(),
            event_handler: self.event_handler,
        })
    }
}

/// Result slot filled by the frame-wait task, stamped with when it arrived
///
/// Once closed, offers are refused and the offering task disposes of the
/// frame itself, so a frame is released exactly once whichever side wins.
#[derive(Default)]
struct PendingSlot {
    state: Mutex<PendingState>,
}

#[derive(Default)]
struct PendingState {
    outcome: Option<(WaitOutcome, Instant)>,
    closed: bool,
}

impl PendingSlot {
    fn offer(
        &self,
        outcome: WaitOutcome,
        resolved_at: Instant,
    ) -> std::result::Result<(), WaitOutcome> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(outcome);
        }
        state.outcome = Some((outcome, resolved_at));
        Ok(())
    }

    fn take(&self) -> Option<(WaitOutcome, Instant)> {
        self.state.lock().outcome.take()
    }

    /// Refuse further offers, returning a frame that was never consumed
    fn close(&self) -> Option<DecodedFrame> {
        let mut state = self.state.lock();
        state.closed = true;
        state.outcome.take().and_then(|(outcome, _)| outcome.ok())
    }
}

/// One start()..stop() run
struct PlaybackSession {
    channel: Arc<FrameChannel<DecodedFrame>>,
    cancelled: Arc<AtomicBool>,
    producer: Option<thread::JoinHandle<Box<dyn FrameDecoder>>>,
    pending: Arc<PendingSlot>,
    wait: Option<tokio::task::JoinHandle<()>>,

    /// The next callback should advance to a new frame
    frame_due: bool,

    /// When the current frame's display time runs out
    due_at: Option<Instant>,
}

/// What a render callback should do
enum Step {
    Redraw,
    Present(DecodedFrame),
    Starved,
}

/// Playback controller driving one animation
pub struct PlaybackController {
    info: AnimationInfo,
    config: PlaybackConfig,

    /// Parked here between sessions; lent to the producer while running
    decoder: Option<Box<dyn FrameDecoder>>,
    decoder_fresh: bool,

    pool: SharedPool,
    invalidator: Arc<dyn Invalidator>,
    runtime: Handle,

    session: Option<PlaybackSession>,

    /// Frame on screen
    displayed: Option<DecodedFrame>,

    /// Buffers replaced on screen, released on the next callback or when the
    /// session ends
    retired: Vec<PixelBuffer>,

    estimator: QueueDelayEstimator,
    paint: Paint,
    bounds: Bounds,
    stats: PlaybackStats,
    event_handler: Option<Box<dyn PlaybackEventHandler>>,
}

impl PlaybackController {
    /// Start a playback session. No-op while running.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            trace!("start() while running; ignoring");
            return Ok(());
        }

        let decoder = self.decoder.take().ok_or_else(|| {
            AnimError::DecoderUnavailable("decoder was lost by an earlier session".to_string())
        })?;

        let channel = {
            let pool = self.pool.clone();
            Arc::new(FrameChannel::new(move |frame: DecodedFrame| pool.release(frame.buffer)))
        };
        let cancelled = Arc::new(AtomicBool::new(false));
        let settings = ProducerSettings {
            loop_count: self.info.loop_count,
            width: self.info.width,
            height: self.info.height,
            format: self.info.format,
            skip_initial_reset: self.decoder_fresh && !self.config.reset_before_first_loop,
        };

        let producer = FrameProducer::new(
            decoder,
            self.pool.clone(),
            Arc::clone(&channel),
            Arc::clone(&cancelled),
            settings,
        )
        .spawn()
        .spawn_err("Launching frame producer")?;

        self.decoder_fresh = false;
        self.session = Some(PlaybackSession {
            channel,
            cancelled,
            producer: Some(producer),
            pending: Arc::new(PendingSlot::default()),
            wait: None,
            frame_due: true,
            due_at: None,
        });
        self.stats.sessions += 1;

        info!(
            "Playback started ({}x{}, loop count {})",
            self.info.width, self.info.height, self.info.loop_count
        );
        self.emit(PlaybackEvent::Started);
        self.invalidator.invalidate();
        Ok(())
    }

    /// Stop the session. No-op while idle.
    pub fn stop(&mut self) {
        let ended = self.end_session();
        self.flush_retired();
        if ended {
            info!("Playback stopped");
            self.emit(PlaybackEvent::Stopped);
        }
    }

    /// Whether a session is active
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> PlaybackState {
        if self.is_running() {
            PlaybackState::Running
        } else {
            PlaybackState::Idle
        }
    }

    /// Render callback entry point, called on the host's render thread
    pub fn on_render_callback(&mut self, canvas: &mut dyn Canvas, now: Instant) {
        self.flush_retired();

        match self.poll_frame(now) {
            Step::Redraw => self.redraw(canvas),
            Step::Present(frame) => self.present(canvas, frame, now),
            Step::Starved => self.starve(canvas),
        }
    }

    fn poll_frame(&mut self, now: Instant) -> Step {
        let Some(session) = self.session.as_mut() else {
            return Step::Redraw;
        };

        if let Some(at) = session.due_at.filter(|at| now >= *at) {
            let late = duration_to_ms(now.duration_since(at));
            trace!("Callback {}ms after due time", late);
            self.estimator.observe(u64::from(late));
            session.due_at = None;
            session.frame_due = true;
        }

        if let Some((outcome, resolved_at)) = session.pending.take() {
            // The frame was due the moment the wait resolved
            if let Some(late) = now.checked_duration_since(resolved_at) {
                self.estimator.observe(u64::from(duration_to_ms(late)));
            }
            session.wait = None;
            session.frame_due = false;
            return match outcome {
                Ok(frame) => Step::Present(frame),
                Err(RecvError) => Step::Starved,
            };
        }

        if !session.frame_due {
            // Early or foreign callback: keep the scheduled one armed
            if let Some(at) = session.due_at {
                self.invalidator.schedule_invalidate(at);
            }
            return Step::Redraw;
        }

        session.frame_due = false;
        if session.wait.is_some() {
            // The in-flight wait delivers the next frame.
            return Step::Redraw;
        }

        match session.channel.try_recv() {
            Ok(frame) => Step::Present(frame),
            Err(_) => Step::Starved,
        }
    }

    fn present(&mut self, canvas: &mut dyn Canvas, frame: DecodedFrame, now: Instant) {
        debug!(
            "Presenting frame {} ({}ms)",
            self.stats.frames_rendered + 1,
            frame.duration_ms
        );
        self.draw(canvas, &frame.buffer);
        let duration_ms = frame.duration_ms;

        if let Some(previous) = self.displayed.replace(frame) {
            self.retire(previous.buffer);
        }
        self.stats.frames_rendered += 1;

        let drained = self
            .session
            .as_ref()
            .map_or(true, |session| session.channel.is_drained());
        if drained {
            self.finish();
            return;
        }

        let estimate = self.estimator.current_estimate();
        let at = now + next_frame_delay(duration_ms, estimate);
        trace!(
            "Next frame in {}ms ({}ms - {}ms estimate)",
            duration_ms.saturating_sub(estimate),
            duration_ms,
            estimate
        );

        if let Some(session) = self.session.as_mut() {
            session.due_at = Some(at);
        }
        self.invalidator.schedule_invalidate(at);
    }

    fn starve(&mut self, canvas: &mut dyn Canvas) {
        self.redraw(canvas);

        let drained = self
            .session
            .as_ref()
            .map_or(true, |session| session.channel.is_drained());
        if drained {
            self.finish();
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.wait.is_none() {
            debug!("Next frame not decoded yet; waiting for it");
            let channel = Arc::clone(&session.channel);
            let pending = Arc::clone(&session.pending);
            let invalidator = Arc::clone(&self.invalidator);

            session.wait = Some(self.runtime.spawn(async move {
                let outcome = channel.recv().await;
                if let Err(refused) = pending.offer(outcome, Instant::now()) {
                    if let Ok(frame) = refused {
                        channel.dispose(frame);
                    }
                    return;
                }
                invalidator.invalidate();
            }));
            self.stats.frame_waits += 1;
        }
    }

    /// Natural end of the animation
    fn finish(&mut self) {
        let ended = self.end_session();
        self.flush_retired();
        if ended {
            info!("Playback finished after {} frames", self.stats.frames_rendered);
            self.emit(PlaybackEvent::Finished);
        }
    }

    /// Tear the session down; returns false if there was none
    fn end_session(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };

        session.cancelled.store(true, Ordering::SeqCst);
        session.channel.close();
        if let Some(wait) = session.wait.take() {
            wait.abort();
        }
        if let Some(frame) = session.pending.close() {
            self.pool.release(frame.buffer);
        }
        self.invalidator.cancel_scheduled();

        if let Some(producer) = session.producer.take() {
            match producer.join() {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(_) => error!("Frame producer panicked; decoder is gone"),
            }
        }
        true
    }

    fn draw(&self, canvas: &mut dyn Canvas, buffer: &PixelBuffer) {
        let background = self.info.background_color;
        if self.config.draw_background && !background.is_transparent() {
            canvas.fill(background);
        }
        canvas.draw_buffer(buffer, self.bounds, &self.paint);
    }

    fn redraw(&mut self, canvas: &mut dyn Canvas) {
        if let Some(frame) = self.displayed.as_ref() {
            self.draw(canvas, &frame.buffer);
            self.stats.redraws += 1;
        }
    }

    fn retire(&mut self, buffer: PixelBuffer) {
        match self.config.release_policy {
            ReleasePolicy::Immediate => self.pool.release(buffer),
            ReleasePolicy::Deferred => self.retired.push(buffer),
        }
    }

    fn flush_retired(&mut self) {
        for buffer in self.retired.drain(..) {
            self.pool.release(buffer);
        }
    }

    fn emit(&mut self, event: PlaybackEvent) {
        if let Some(handler) = self.event_handler.as_mut() {
            handler.handle_event(event);
        }
    }

    /// Animation metadata read at construction
    pub fn info(&self) -> &AnimationInfo {
        &self.info
    }

    pub fn intrinsic_width(&self) -> u32 {
        self.info.width
    }

    pub fn intrinsic_height(&self) -> u32 {
        self.info.height
    }

    pub fn opacity(&self) -> Opacity {
        if self.info.has_alpha {
            Opacity::Translucent
        } else {
            Opacity::Opaque
        }
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        self.paint.alpha = alpha;
    }

    pub fn alpha(&self) -> u8 {
        self.paint.alpha
    }

    pub fn set_filter_bitmap(&mut self, filter: bool) {
        self.paint.filter_bitmap = filter;
    }

    /// Destination rectangle for drawn frames
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Frame on screen, if any
    pub fn current_frame(&self) -> Option<&DecodedFrame> {
        self.displayed.as_ref()
    }

    /// Frames waiting in the channel slot (0 or 1)
    pub fn queued_frames(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |session| session.channel.len())
    }

    pub fn queue_delay_estimate(&self) -> u32 {
        self.estimator.current_estimate()
    }

    /// Get playback statistics
    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            queue_delay_ms: self.estimator.current_estimate(),
            ..self.stats
        }
    }

    pub fn set_event_handler(&mut self, handler: Box<dyn PlaybackEventHandler>) {
        self.event_handler = Some(handler);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.end_session();
        self.flush_retired();
        if let Some(frame) = self.displayed.take() {
            self.pool.release(frame.buffer);
        }
    }
}
