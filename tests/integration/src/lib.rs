//! Integration test utilities for animplayer
//!
//! This module provides the doubles the scenario tests drive the pipeline
//! with:
//! - A scripted decoder with failure injection and call counters
//! - A buffer pool that keeps a ledger of every buffer it hands out
//! - A canvas and an invalidator that record what they were asked to do
//! - A harness that owns the runtime and feeds render callbacks at chosen
//!   instants

use animplayer::decoder::{
    AnimationInfo, BufferId, BufferPool, DecodedFrame, FrameDecoder, PixelBuffer, PixelFormat,
    SharedPool, SyntheticDecoder,
};
use animplayer::player::{PlaybackController, PlaybackControllerBuilder, PlaybackEvent};
use animplayer::renderer::{Bounds, Canvas, Color, Invalidator, Paint};
use animplayer::utils::PlaybackConfig;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Counters shared between a [`ScriptedDecoder`] and the test
#[derive(Debug, Clone, Default)]
pub struct DecoderProbe {
    resets: Arc<AtomicUsize>,
    decodes: Arc<AtomicUsize>,
}

impl DecoderProbe {
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Successful decodes
    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

/// Decoder with scripted durations and optional failure
pub struct ScriptedDecoder {
    width: u32,
    height: u32,
    durations: Vec<u32>,
    loop_count: u32,
    background: Color,
    fail_at: Option<usize>,
    panic_at: Option<usize>,
    decode_delay: Duration,
    cursor: usize,
    probe: DecoderProbe,
}

impl ScriptedDecoder {
    pub fn new(durations: &[u32], loop_count: u32) -> Self {
        Self {
            width: 8,
            height: 8,
            durations: durations.to_vec(),
            loop_count,
            background: Color::TRANSPARENT,
            fail_at: None,
            panic_at: None,
            decode_delay: Duration::ZERO,
            cursor: 0,
            probe: DecoderProbe::default(),
        }
    }

    /// Fail every decode of the frame at `index`
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Panic once `count` frames have been decoded in total
    pub fn panicking_after(mut self, count: usize) -> Self {
        self.panic_at = Some(count);
        self
    }

    /// Sleep this long inside every decode
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    pub fn probe(&self) -> DecoderProbe {
        self.probe.clone()
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn info(&self) -> AnimationInfo {
        AnimationInfo {
            width: self.width,
            height: self.height,
            loop_count: self.loop_count,
            background_color: self.background,
            has_alpha: true,
            frame_count: self.durations.len() as u32,
            format: PixelFormat::Rgba8888,
        }
    }

    fn has_next_frame(&self) -> bool {
        self.cursor < self.durations.len()
    }

    fn decode_next_frame(&mut self, reuse: &mut Option<PixelBuffer>) -> Option<DecodedFrame> {
        if self.fail_at == Some(self.cursor) {
            return None;
        }
        if self.panic_at == Some(self.probe.decodes()) {
            panic!("scripted decoder panic after {} frames", self.probe.decodes());
        }
        let duration_ms = *self.durations.get(self.cursor)?;
        if !self.decode_delay.is_zero() {
            thread::sleep(self.decode_delay);
        }

        let mut buffer = match reuse.take() {
            Some(buffer) if buffer.matches(self.width, self.height, PixelFormat::Rgba8888) => buffer,
            other => {
                *reuse = other;
                PixelBuffer::new(self.width, self.height, PixelFormat::Rgba8888)
            }
        };
        buffer.pixels_mut().fill(SyntheticDecoder::frame_marker(self.cursor));

        self.cursor += 1;
        self.probe.decodes.fetch_add(1, Ordering::SeqCst);
        Some(DecodedFrame::new(buffer, duration_ms))
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct PoolLedger {
    wrong_shape: bool,
    misfits: Vec<BufferId>,
    acquired: u64,
    created: u64,
    released: u64,
    double_releases: u64,
    free: Vec<PixelBuffer>,
    free_ids: HashSet<BufferId>,
    release_log: Vec<BufferId>,
}

/// Unbounded pool that records every hand-out and return
///
/// `acquire` always succeeds, so every frame buffer in a test run originates
/// here and `outstanding()` is the number of buffers alive outside the pool.
#[derive(Debug, Clone, Default)]
pub struct CountingPool {
    ledger: Arc<Mutex<PoolLedger>>,
}

impl CountingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool whose every buffer is 1x1, so no decoder can reuse it
    pub fn wrong_shape() -> Self {
        let pool = Self::default();
        pool.ledger.lock().wrong_shape = true;
        pool
    }

    /// Wrong-shaped buffers handed out so far
    pub fn misfits(&self) -> Vec<BufferId> {
        self.ledger.lock().misfits.clone()
    }

    /// How many times `id` came back
    pub fn release_count(&self, id: BufferId) -> usize {
        self.ledger.lock().release_log.iter().filter(|&&r| r == id).count()
    }

    pub fn acquired(&self) -> u64 {
        self.ledger.lock().acquired
    }

    /// Buffers allocated because none was free
    pub fn created(&self) -> u64 {
        self.ledger.lock().created
    }

    pub fn released(&self) -> u64 {
        self.ledger.lock().released
    }

    pub fn double_releases(&self) -> u64 {
        self.ledger.lock().double_releases
    }

    /// Pool buffers alive outside the pool; only meaningful while the pool
    /// hands out buffers the decoder can use
    pub fn outstanding(&self) -> u64 {
        let ledger = self.ledger.lock();
        ledger.acquired - ledger.released
    }

    pub fn was_released(&self, id: BufferId) -> bool {
        self.ledger.lock().release_log.contains(&id)
    }
}

impl BufferPool for CountingPool {
    fn acquire(&mut self, width: u32, height: u32, format: PixelFormat) -> Option<PixelBuffer> {
        let mut ledger = self.ledger.lock();
        ledger.acquired += 1;

        if ledger.wrong_shape {
            let buffer = PixelBuffer::new(1, 1, format);
            ledger.misfits.push(buffer.id());
            ledger.created += 1;
            return Some(buffer);
        }

        if let Some(pos) = ledger.free.iter().position(|b| b.matches(width, height, format)) {
            let buffer = ledger.free.swap_remove(pos);
            ledger.free_ids.remove(&buffer.id());
            return Some(buffer);
        }
        ledger.created += 1;
        Some(PixelBuffer::new(width, height, format))
    }

    fn release(&mut self, buffer: PixelBuffer) {
        let mut ledger = self.ledger.lock();
        if !ledger.free_ids.insert(buffer.id()) {
            ledger.double_releases += 1;
        }
        ledger.released += 1;
        ledger.release_log.push(buffer.id());
        ledger.free.push(buffer);
    }
}

/// Canvas recording buffer ids and the marker pixel of every draw
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    pub draws: Vec<(BufferId, u32)>,
    pub fills: Vec<Color>,
    pub alphas: Vec<u8>,
}

impl RecordingCanvas {
    /// Marker pixels of the draws, consecutive repeats collapsed
    pub fn distinct_markers(&self) -> Vec<u32> {
        let mut markers: Vec<u32> = self.draws.iter().map(|&(_, marker)| marker).collect();
        markers.dedup();
        markers
    }
}

impl Canvas for RecordingCanvas {
    fn fill(&mut self, color: Color) {
        self.fills.push(color);
    }

    fn draw_buffer(&mut self, buffer: &PixelBuffer, _dst: Bounds, paint: &Paint) {
        let marker = buffer.pixels().first().copied().unwrap_or_default();
        self.draws.push((buffer.id(), marker));
        self.alphas.push(paint.alpha);
    }
}

/// Calls made on a [`RecordingInvalidator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidatorCall {
    Invalidate,
    Schedule(Instant),
    Cancel,
}

/// Invalidator that logs calls and signals every immediate request
pub struct RecordingInvalidator {
    calls: Mutex<Vec<InvalidatorCall>>,
    wakes: Sender<()>,
}

impl RecordingInvalidator {
    pub fn channel() -> (Arc<Self>, Receiver<()>) {
        let (wakes, receiver) = crossbeam_channel::unbounded();
        (
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                wakes,
            }),
            receiver,
        )
    }

    pub fn calls(&self) -> Vec<InvalidatorCall> {
        self.calls.lock().clone()
    }

    /// Most recent scheduled instant
    pub fn last_schedule(&self) -> Option<Instant> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            InvalidatorCall::Schedule(at) => Some(*at),
            _ => None,
        })
    }

    pub fn schedule_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, InvalidatorCall::Schedule(_)))
            .count()
    }

    fn record(&self, call: InvalidatorCall) {
        self.calls.lock().push(call);
    }
}

impl Invalidator for RecordingInvalidator {
    fn invalidate(&self) {
        self.record(InvalidatorCall::Invalidate);
        let _ = self.wakes.send(());
    }

    fn schedule_invalidate(&self, at: Instant) {
        self.record(InvalidatorCall::Schedule(at));
    }

    fn cancel_scheduled(&self) {
        self.record(InvalidatorCall::Cancel);
    }
}

/// Build a runtime for the frame-wait task
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?)
}

/// A controller wired to recording doubles
///
/// Callbacks are issued explicitly with chosen timestamps, so scheduling can
/// be checked against virtual time while the producer runs for real.
pub struct Harness {
    pub controller: PlaybackController,
    pub canvas: RecordingCanvas,
    pub invalidator: Arc<RecordingInvalidator>,
    pub wakes: Receiver<()>,
    pub pool: CountingPool,
    pub events: Arc<Mutex<Vec<PlaybackEvent>>>,
    pub probe: DecoderProbe,
    // Declared last so the controller goes first on drop.
    _runtime: tokio::runtime::Runtime,
}

impl Harness {
    pub fn new(decoder: ScriptedDecoder, config: PlaybackConfig) -> Result<Self> {
        Self::with_pool(decoder, config, CountingPool::new())
    }

    pub fn with_pool(
        decoder: ScriptedDecoder,
        config: PlaybackConfig,
        pool: CountingPool,
    ) -> Result<Self> {
        let runtime = runtime()?;
        let (invalidator, wakes) = RecordingInvalidator::channel();
        let events = Arc::new(Mutex::new(Vec::new()));
        let probe = decoder.probe();

        let sink = Arc::clone(&events);
        let controller = PlaybackControllerBuilder::new()
            .with_config(config)
            .with_pool(SharedPool::new(pool.clone()))
            .with_runtime(runtime.handle().clone())
            .with_event_handler(Box::new(move |event: PlaybackEvent| sink.lock().push(event)))
            .build(Box::new(decoder), invalidator.clone())?;

        Ok(Self {
            controller,
            canvas: RecordingCanvas::default(),
            invalidator,
            wakes,
            pool,
            events,
            probe,
            _runtime: runtime,
        })
    }

    /// Issue one render callback at `now`
    pub fn callback(&mut self, now: Instant) {
        self.controller.on_render_callback(&mut self.canvas, now);
    }

    /// Wait (in real time) until the producer has a frame queued
    pub fn wait_for_queued(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.controller.queued_frames() > 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// Wait for the next immediate render request
    pub fn wait_for_wake(&self, timeout: Duration) -> bool {
        self.wakes.recv_timeout(timeout).is_ok()
    }

    /// Throw away immediate render requests seen so far
    pub fn drain_wakes(&self) {
        while self.wakes.try_recv().is_ok() {}
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().clone()
    }

    /// Serve callbacks in real time until playback goes idle
    pub fn run_to_end(&mut self, timeout: Duration) -> bool {
        self.run_until(timeout, |controller| !controller.is_running())
    }

    /// Serve callbacks in real time until `done` holds or playback goes idle
    ///
    /// A callback is issued whenever the last scheduled instant has passed
    /// or an immediate request came in.
    pub fn run_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&PlaybackController) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done(&self.controller) {
                return true;
            }
            if !self.controller.is_running() {
                return false;
            }

            let now = Instant::now();
            let due = self.invalidator.last_schedule().map_or(true, |at| now >= at);
            if self.wakes.try_recv().is_ok() || due {
                self.callback(now);
            }
            thread::sleep(Duration::from_millis(1));
        }
        done(&self.controller)
    }
}
