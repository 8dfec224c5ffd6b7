//! Pooled scratch buffers for typed-value staging.
//!
//! A writer borrows one buffer per typed write call through [`scratch`].
//! The returned [`PooledBuffer`] hands the allocation back to the calling
//! thread's pool when dropped, so every exit path releases it, including
//! early returns through `?`.
//!
//! Buffers are sorted into a few fixed capacity buckets. Each bucket keeps
//! at most [`MAX_PER_BUCKET`] idle buffers; anything beyond that, or
//! smaller than the smallest bucket, is simply freed.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// Capacities of the pool buckets, smallest first.
pub const BUCKET_CAPACITIES: [usize; 3] = [128, 2048, 16 * 1024];

/// Idle buffers kept per bucket.
pub const MAX_PER_BUCKET: usize = 4;

/// A pool of reusable `String` buffers.
#[derive(Debug, Default)]
pub struct BufferPool {
    buckets: [Vec<String>; BUCKET_CAPACITIES.len()],
}

impl BufferPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a cleared buffer with at least `min_capacity` bytes of
    /// capacity, allocating if the matching bucket is empty.
    pub fn acquire(&mut self, min_capacity: usize) -> String {
        let start = BUCKET_CAPACITIES
            .iter()
            .position(|&cap| cap >= min_capacity);
        if let Some(start) = start {
            for bucket in &mut self.buckets[start..] {
                if let Some(buf) = bucket.pop() {
                    return buf;
                }
            }
            return String::with_capacity(BUCKET_CAPACITIES[start]);
        }
        String::with_capacity(min_capacity)
    }

    /// Returns a buffer to the pool.
    pub fn release(&mut self, mut buf: String) {
        let Some(index) = BUCKET_CAPACITIES
            .iter()
            .rposition(|&cap| cap <= buf.capacity())
        else {
            return;
        };
        let bucket = &mut self.buckets[index];
        if bucket.len() < MAX_PER_BUCKET {
            buf.clear();
            bucket.push(buf);
        }
    }

    /// Number of idle buffers across all buckets.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

thread_local! {
    static POOL: RefCell<BufferPool> = RefCell::new(BufferPool::new());
}

/// A buffer on loan from the thread's pool.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: String,
}

impl Deref for PooledBuffer {
    type Target = String;

    fn deref(&self) -> &String {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        // The pool may already be gone during thread teardown.
        let _ = POOL.try_with(|pool| {
            if let Ok(mut pool) = pool.try_borrow_mut() {
                pool.release(buf);
            }
        });
    }
}

/// Borrows a cleared scratch buffer from the calling thread's pool.
#[must_use]
pub fn scratch(min_capacity: usize) -> PooledBuffer {
    let buf = POOL
        .try_with(|pool| {
            pool.try_borrow_mut()
                .map(|mut pool| pool.acquire(min_capacity))
                .ok()
        })
        .ok()
        .flatten()
        .unwrap_or_else(|| String::with_capacity(min_capacity));
    PooledBuffer { buf }
}

/// Number of idle buffers in the calling thread's pool.
#[must_use]
pub fn idle_buffers() -> usize {
    POOL.try_with(|pool| pool.try_borrow().map_or(0, |pool| pool.idle()))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_picks_smallest_fitting_bucket() {
        let mut pool = BufferPool::new();
        let buf = pool.acquire(10);
        assert!(buf.capacity() >= 128);
        let big = pool.acquire(100_000);
        assert!(big.capacity() >= 100_000);
    }

    #[test]
    fn test_release_and_reuse() {
        let mut pool = BufferPool::new();
        let mut buf = pool.acquire(10);
        buf.push_str("leftover");
        pool.release(buf);
        assert_eq!(pool.idle(), 1);
        let reused = pool.acquire(10);
        assert!(reused.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_bucket_limit() {
        let mut pool = BufferPool::new();
        for _ in 0..(MAX_PER_BUCKET + 2) {
            pool.release(String::with_capacity(BUCKET_CAPACITIES[0]));
        }
        assert_eq!(pool.idle(), MAX_PER_BUCKET);
        pool.release(String::with_capacity(4));
        assert_eq!(pool.idle(), MAX_PER_BUCKET);
    }

    #[test]
    fn test_scratch_returns_on_drop() {
        {
            let mut buf = scratch(16);
            buf.push_str("123");
            assert_eq!(buf.as_str(), "123");
        }
        assert!(idle_buffers() >= 1);
        let again = scratch(16);
        assert!(again.is_empty());
    }
}
