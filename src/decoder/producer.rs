//! Background frame producer
//!
//! Drives a [`FrameDecoder`] across loop iterations on a dedicated thread and
//! pushes each frame into the session's [`FrameChannel`]. The blocking send is
//! the backpressure point: at most one decoded frame waits ahead of the
//! consumer. The decoder is handed back through the join handle when the
//! producer exits so the next session can reuse it.

use crate::decoder::{DecodedFrame, FrameChannel, FrameDecoder, PixelFormat, SharedPool};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Per-session producer parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSettings {
    /// Loop iterations to run, 0 = until cancelled
    pub loop_count: u32,

    /// Frame shape requested from the pool
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,

    /// Skip `reset()` before the first iteration (decoder is known to be fresh)
    pub skip_initial_reset: bool,
}

/// Seals the channel when the producer exits, including by unwinding, so
/// the consumer always observes end of stream
struct SealOnExit(Arc<FrameChannel<DecodedFrame>>);

impl Drop for SealOnExit {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("Producer panicked; sealing frame channel");
        }
        self.0.seal();
    }
}

/// Frame producer task for one playback session
pub struct FrameProducer {
    decoder: Box<dyn FrameDecoder>,
    pool: SharedPool,
    channel: Arc<FrameChannel<DecodedFrame>>,
    cancelled: Arc<AtomicBool>,
    settings: ProducerSettings,
}

impl FrameProducer {
    pub fn new(
        decoder: Box<dyn FrameDecoder>,
        pool: SharedPool,
        channel: Arc<FrameChannel<DecodedFrame>>,
        cancelled: Arc<AtomicBool>,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            decoder,
            pool,
            channel,
            cancelled,
            settings,
        }
    }

    /// Run on a named background thread
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<Box<dyn FrameDecoder>>> {
        thread::Builder::new()
            .name("anim-producer".to_string())
            .spawn(move || self.run())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Decode and hand off frames until the loop budget is spent, the stream
    /// stops yielding frames, or the session is cancelled
    pub fn run(mut self) -> Box<dyn FrameDecoder> {
        let _seal = SealOnExit(Arc::clone(&self.channel));
        let loop_count = self.settings.loop_count;
        let mut iteration: u32 = 0;

        while loop_count == 0 || iteration < loop_count {
            if self.is_cancelled() {
                debug!("Producer cancelled before iteration {}", iteration);
                return self.decoder;
            }
            if iteration > 0 || !self.settings.skip_initial_reset {
                self.decoder.reset();
            }

            let final_pass = loop_count != 0 && iteration + 1 == loop_count;
            let mut produced = 0usize;

            while !self.is_cancelled() && self.decoder.has_next_frame() {
                let Some(frame) = self.decode_one() else {
                    debug!("Decode failed after {} frames; ending iteration {}", produced, iteration);
                    break;
                };
                produced += 1;

                let last = final_pass && !self.decoder.has_next_frame();
                let sent = if last {
                    self.channel.send_last(frame)
                } else {
                    self.channel.send(frame)
                };

                if let Err(rejected) = sent {
                    trace!("Channel closed during send; returning buffer to pool");
                    self.pool.release(rejected.0.buffer);
                    return self.decoder;
                }
            }

            if produced == 0 && !self.is_cancelled() {
                warn!("Iteration {} produced no frames; ending playback", iteration);
                break;
            }
            iteration = iteration.saturating_add(1);
        }

        debug!("Producer finished after {} iterations", iteration);
        self.decoder
    }

    /// One decode step with a pooled buffer as the reuse hint
    fn decode_one(&mut self) -> Option<DecodedFrame> {
        let ProducerSettings { width, height, format, .. } = self.settings;
        let mut hint = self.pool.acquire(width, height, format);
        let decoded = self.decoder.decode_next_frame(&mut hint);

        // Unused hint: wrong shape, or the decode failed
        if let Some(unused) = hint.take() {
            self.pool.release(unused);
        }
        decoded
    }
}
