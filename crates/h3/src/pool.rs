//! Segment pool backing the buffered DATA writer
//!
//! [`BufferPool::rent`] hands out [`PooledBuffer`]s, RAII handles that give their
//! segment back when dropped. The pool keeps a bounded free list of cleared
//! segments and counts the capacity currently rented out, so leaks show up as a
//! non-zero [`BufferPool::outstanding_bytes`].
//!
//! The free list lock is only held to push or pop one segment, never across an
//! await point.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::BytesMut;
use tracing::warn;

pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024;
const DEFAULT_MAX_IDLE: usize = 64;

#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    segment_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<BytesMut>>,
    outstanding_bytes: AtomicUsize,
    outstanding_segments: AtomicUsize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_SIZE)
    }
}

impl BufferPool {
    pub fn new(segment_size: usize) -> Self {
        Self::with_max_idle(segment_size, DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(segment_size: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                segment_size: segment_size.max(1),
                max_idle,
                idle: Mutex::new(Vec::new()),
                outstanding_bytes: AtomicUsize::new(0),
                outstanding_segments: AtomicUsize::new(0),
            }),
        }
    }

    pub fn segment_size(&self) -> usize {
        self.inner.segment_size
    }

    /// Rents an empty segment with room for at least `min_capacity` bytes.
    ///
    /// Requests above the segment size get a dedicated allocation that is dropped
    /// instead of pooled on return.
    pub fn rent(&self, min_capacity: usize) -> PooledBuffer {
        let buf = if min_capacity <= self.inner.segment_size {
            self.pop_idle().unwrap_or_else(|| BytesMut::with_capacity(self.inner.segment_size))
        } else {
            BytesMut::with_capacity(min_capacity)
        };

        let rented = buf.capacity();
        self.inner.outstanding_bytes.fetch_add(rented, Ordering::AcqRel);
        self.inner.outstanding_segments.fetch_add(1, Ordering::AcqRel);
        PooledBuffer { buf: Some(buf), rented, pool: self.clone() }
    }

    /// Capacity currently held by rented segments.
    pub fn outstanding_bytes(&self) -> usize {
        self.inner.outstanding_bytes.load(Ordering::Acquire)
    }

    pub fn outstanding_segments(&self) -> usize {
        self.inner.outstanding_segments.load(Ordering::Acquire)
    }

    pub fn idle_segments(&self) -> usize {
        self.idle().len()
    }

    fn pop_idle(&self) -> Option<BytesMut> {
        self.idle().pop()
    }

    // the free list only ever holds cleared segments, so a poisoned lock is still usable
    fn idle(&self) -> MutexGuard<'_, Vec<BytesMut>> {
        self.inner.idle.lock().unwrap_or_else(|poisoned| {
            warn!("buffer pool free list lock poisoned, recovering it");
            self.inner.idle.clear_poison();
            poisoned.into_inner()
        })
    }

    fn give_back(&self, mut buf: BytesMut, rented_capacity: usize) {
        self.inner.outstanding_bytes.fetch_sub(rented_capacity, Ordering::AcqRel);
        self.inner.outstanding_segments.fetch_sub(1, Ordering::AcqRel);

        // grown or oversized segments are not worth keeping
        if buf.capacity() != self.inner.segment_size {
            return;
        }

        buf.clear();
        let mut idle = self.idle();
        if idle.len() < self.inner.max_idle {
            idle.push(buf);
        }
    }
}

/// A rented segment. Dereferences to the underlying [`BytesMut`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<BytesMut>,
    rented: usize,
    pool: BufferPool,
}

impl PooledBuffer {
    /// Bytes that can still be written without reallocating.
    pub fn remaining_capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, |buf| buf.capacity() - buf.len())
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        // only None inside drop
        self.buf.as_ref().unwrap_or_else(|| unreachable!("pooled buffer used after return"))
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_mut().unwrap_or_else(|| unreachable!("pooled buffer used after return"))
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf, self.rented);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_and_return() {
        let pool = BufferPool::new(1024);
        assert_eq!(pool.outstanding_bytes(), 0);

        let mut a = pool.rent(10);
        a.extend_from_slice(b"hello");
        let b = pool.rent(1024);
        assert_eq!(pool.outstanding_bytes(), 2048);
        assert_eq!(pool.outstanding_segments(), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.outstanding_bytes(), 0);
        assert_eq!(pool.idle_segments(), 2);

        // reused segments come back empty
        let c = pool.rent(1);
        assert!(c.is_empty());
        assert_eq!(c.capacity(), 1024);
        assert_eq!(pool.idle_segments(), 1);
    }

    #[test]
    fn oversized_rent_is_not_pooled() {
        let pool = BufferPool::new(64);
        let big = pool.rent(1000);
        assert!(big.capacity() >= 1000);
        assert_eq!(pool.outstanding_bytes(), big.capacity());

        drop(big);
        assert_eq!(pool.outstanding_bytes(), 0);
        assert_eq!(pool.idle_segments(), 0);
    }

    #[test]
    fn idle_list_is_bounded() {
        let pool = BufferPool::with_max_idle(32, 1);
        let a = pool.rent(1);
        let b = pool.rent(1);
        drop(a);
        drop(b);
        assert_eq!(pool.idle_segments(), 1);
    }

    #[test]
    fn shared_across_threads() {
        let pool = BufferPool::new(128);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buf = pool.rent(64);
                        buf.extend_from_slice(&[1; 64]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.outstanding_bytes(), 0);
    }

    #[test]
    fn poisoned_free_list_is_recovered() {
        let pool = BufferPool::new(64);
        drop(pool.rent(8));
        assert_eq!(pool.idle_segments(), 1);

        let poisoner = pool.clone();
        std::thread::spawn(move || {
            let _idle = poisoner.inner.idle.lock().unwrap();
            panic!("poison the free list");
        })
        .join()
        .unwrap_err();
        assert!(pool.inner.idle.is_poisoned());

        assert_eq!(pool.idle_segments(), 1);
        assert!(!pool.inner.idle.is_poisoned());

        let reused = pool.rent(8);
        assert_eq!(pool.idle_segments(), 0);
        drop(reused);
        assert_eq!(pool.idle_segments(), 1);
    }
}
