//! Admission control and buffer reuse.
//!
//! [`ConnectionPool`] is the only process-wide mutable state in the core: a
//! single atomic counter bounding concurrent connections. [`BufferPool`]
//! recycles fixed-size read buffers through a bounded lock-free free-list.

use crossbeam::queue::ArrayQueue;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::warn;

/// Atomic counter-based admission under `max_connections`.
///
/// `0 <= active <= max` holds at every observation point; each successful
/// [`ConnectionPool::try_acquire`] is balanced by exactly one release when
/// the returned permit drops.
#[derive(Debug)]
pub struct ConnectionPool {
    active: AtomicUsize,
    max: usize,
}

impl ConnectionPool {
    pub fn new(max_connections: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max: max_connections,
        }
    }

    /// Claims one admission slot, or fails when the pool is saturated.
    ///
    /// Lock-free CAS loop; contention retries with the freshly observed
    /// count.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        let mut current = self.active.load(Ordering::Acquire);

        loop {
            if current >= self.max {
                return None;
            }

            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(ConnectionPermit {
                        pool: Arc::clone(self),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Currently admitted connections.
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        self.max
    }

    #[inline]
    fn release(&self) {
        self.active.fetch_sub(1, Ordering::Release);
    }
}

/// One unit of the admission budget, released exactly once on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    pool: Arc<ConnectionPool>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// Bounded set of fixed-size buffers with usage accounting.
///
/// Not on the per-request hot path: the driver leases one scratch chunk per
/// connection and falls back to a fresh allocation when the pool runs dry.
#[derive(Debug)]
pub struct BufferPool {
    slots: ArrayQueue<Box<[u8]>>,
    slot_size: usize,
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

impl BufferPool {
    /// Creates a pool pre-filled with `max_buffers` zeroed slots of
    /// `slot_size` bytes.
    pub fn new(max_buffers: usize, slot_size: usize) -> Self {
        let slots = ArrayQueue::new(max_buffers.max(1));
        for _ in 0..max_buffers {
            let _ = slots.push(vec![0; slot_size].into_boxed_slice());
        }

        Self {
            slots,
            slot_size,
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Takes a buffer from the free-list, or `None` when exhausted.
    pub fn acquire(&self) -> Option<Box<[u8]>> {
        let buffer = self.slots.pop()?;

        let now = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);

        Some(buffer)
    }

    /// Returns a buffer to the free-list.
    ///
    /// Rejects buffers of the wrong size and releases into an already-full
    /// pool (both indicate a bookkeeping bug in the caller).
    pub fn release(&self, buffer: Box<[u8]>) -> bool {
        if buffer.len() != self.slot_size {
            warn!(
                got = buffer.len(),
                expected = self.slot_size,
                "foreign buffer released into pool"
            );
            return false;
        }

        match self.slots.push(buffer) {
            Ok(()) => {
                self.in_use.fetch_sub(1, Ordering::Release);
                true
            }
            Err(_) => {
                warn!("buffer released into a full pool");
                false
            }
        }
    }

    /// Buffers currently handed out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// High-water mark of simultaneous leases.
    #[inline]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    #[inline]
    pub const fn slot_size(&self) -> usize {
        self.slot_size
    }
}

#[cfg(test)]
mod connection_pool {
    use super::*;

    #[test]
    fn admission_ceiling() {
        let pool = Arc::new(ConnectionPool::new(2));

        let first = pool.try_acquire().unwrap();
        let second = pool.try_acquire().unwrap();
        assert_eq!(pool.active(), 2);

        // Third concurrent accept: rejected, counter untouched.
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.active(), 2);

        drop(second);
        assert_eq!(pool.active(), 1);
        let _third = pool.try_acquire().unwrap();
        assert_eq!(pool.active(), 2);

        drop(first);
        drop(_third);
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn conservation() {
        let pool = Arc::new(ConnectionPool::new(8));
        let before = pool.active();

        {
            let _permits: Vec<_> = (0..5).map(|_| pool.try_acquire().unwrap()).collect();
            assert_eq!(pool.active(), 5);
        }

        assert_eq!(pool.active(), before);
    }

    #[test]
    fn contended_never_exceeds_max() {
        let pool = Arc::new(ConnectionPool::new(4));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let pool = Arc::clone(&pool);
                scope.spawn(move || {
                    for _ in 0..200 {
                        if let Some(permit) = pool.try_acquire() {
                            assert!(pool.active() <= pool.capacity());
                            drop(permit);
                        }
                    }
                });
            }
        });

        assert_eq!(pool.active(), 0);
    }
}
