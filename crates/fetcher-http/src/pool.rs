//! Reusable request body buffers.
//!
//! A [`PooledBuffer`] is checked out from a [`BufferPool`] and goes back to
//! it when dropped, so a body attached to a request is released on every
//! path out of dispatch without any explicit call.

use bytes::BytesMut;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Idle buffers kept by the global pool.
const DEFAULT_MAX_IDLE: usize = 32;

/// Buffers larger than this are dropped instead of kept idle.
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

static GLOBAL: Lazy<BufferPool> = Lazy::new(|| BufferPool::new(DEFAULT_MAX_IDLE));

struct PoolInner {
    idle: Mutex<Vec<BytesMut>>,
    max_idle: usize,
    checkouts: AtomicU64,
    checkins: AtomicU64,
}

/// A pool of byte buffers for request bodies.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool that keeps at most `max_idle` buffers around.
    pub fn new(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
                checkouts: AtomicU64::new(0),
                checkins: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide pool used by [`RequestOptions::json`](crate::RequestOptions::json).
    pub fn global() -> &'static BufferPool {
        &GLOBAL
    }

    /// Take an empty buffer from the pool.
    pub fn checkout(&self) -> PooledBuffer {
        let buf = self.inner.idle.lock().pop().unwrap_or_default();
        self.inner.checkouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(capacity = buf.capacity(), "buffer checked out");
        PooledBuffer {
            buf,
            pool: self.clone(),
        }
    }

    fn checkin(&self, mut buf: BytesMut) {
        self.inner.checkins.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(capacity = buf.capacity(), "buffer checked in");

        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();

        let mut idle = self.inner.idle.lock();
        if idle.len() < self.inner.max_idle {
            idle.push(buf);
        }
    }

    /// Total buffers handed out so far.
    pub fn checkouts(&self) -> u64 {
        self.inner.checkouts.load(Ordering::Relaxed)
    }

    /// Total buffers returned so far.
    pub fn checkins(&self) -> u64 {
        self.inner.checkins.load(Ordering::Relaxed)
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.checkouts().saturating_sub(self.checkins())
    }

    /// Buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("max_idle", &self.inner.max_idle)
            .field("checkouts", &self.checkouts())
            .field("checkins", &self.checkins())
            .finish()
    }
}

/// A buffer on loan from a [`BufferPool`]; returned on drop.
pub struct PooledBuffer {
    buf: BytesMut,
    pool: BufferPool,
}

impl PooledBuffer {
    /// The pool this buffer returns to.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl io::Write for PooledBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.checkin(std::mem::take(&mut self.buf));
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .finish()
    }
}
