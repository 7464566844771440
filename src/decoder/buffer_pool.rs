//! Pixel buffers and the pool they are recycled through
//!
//! Buffers are move-only: whoever holds a `PixelBuffer` owns it, so a buffer
//! can be handed back to the pool at most once.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a pixel buffer, stable across reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Packed 32-bit pixel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8 bits per channel, R first in memory
    Rgba8888,

    /// 8 bits per channel, B first in memory
    Bgra8888,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// A fixed-size pixel buffer
#[derive(Debug)]
pub struct PixelBuffer {
    id: BufferId,
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer with a fresh identity
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let id = BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            width,
            height,
            format,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Whether this buffer can hold a frame of the given shape
    pub fn matches(&self, width: u32, height: u32, format: PixelFormat) -> bool {
        self.width == width && self.height == height && self.format == format
    }

    /// Packed pixels, row-major
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Raw bytes in memory order
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Size in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.len() * self.format.bytes_per_pixel()
    }
}

/// Buffer pool contract
///
/// Implementations are not assumed thread-safe; the pipeline always goes
/// through [`SharedPool`], which serializes calls.
pub trait BufferPool: Send {
    /// Best-effort reuse. `None` means the caller allocates fresh.
    fn acquire(&mut self, width: u32, height: u32, format: PixelFormat) -> Option<PixelBuffer>;

    /// Hand a buffer back for future reuse
    fn release(&mut self, buffer: PixelBuffer);
}

/// Mutex-guarded pool handle shared by the producer and the render thread
#[derive(Clone)]
pub struct SharedPool {
    inner: Arc<Mutex<Box<dyn BufferPool>>>,
}

impl SharedPool {
    pub fn new(pool: impl BufferPool + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(pool))),
        }
    }

    pub fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> Option<PixelBuffer> {
        self.inner.lock().acquire(width, height, format)
    }

    pub fn release(&self, buffer: PixelBuffer) {
        log::trace!("Releasing buffer {:?} to pool", buffer.id());
        self.inner.lock().release(buffer);
    }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquire calls answered with a cached buffer
    pub hits: u64,

    /// Acquire calls answered with `None`
    pub misses: u64,

    /// Buffers handed back
    pub released: u64,

    /// Buffers dropped because the pool was full
    pub evicted: u64,
}

/// Bounded pool keeping buffers of any shape, handing out exact matches
pub struct PooledBuffers {
    /// Cached buffers, oldest first
    buffers: Vec<PixelBuffer>,

    /// Maximum number of cached buffers
    capacity: usize,

    stats: PoolStats,
}

impl PooledBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Vec::with_capacity(capacity),
            capacity,
            stats: PoolStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

impl BufferPool for PooledBuffers {
    fn acquire(&mut self, width: u32, height: u32, format: PixelFormat) -> Option<PixelBuffer> {
        match self.buffers.iter().rposition(|b| b.matches(width, height, format)) {
            Some(index) => {
                self.stats.hits += 1;
                Some(self.buffers.remove(index))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn release(&mut self, buffer: PixelBuffer) {
        self.stats.released += 1;
        if self.capacity == 0 {
            self.stats.evicted += 1;
            return;
        }
        if self.buffers.len() >= self.capacity {
            self.buffers.remove(0);
            self.stats.evicted += 1;
        }
        self.buffers.push(buffer);
    }
}
