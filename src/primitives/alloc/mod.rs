#![forbid(unsafe_code)]

//! Raw page-buffer allocation.
//!
//! The transaction core never calls the global allocator directly for page
//! buffers; every copy-on-write buffer comes from a [`PageAllocator`] and is
//! handed back to the same allocator when the transaction drains it. That keeps
//! allocation failure an ordinary error and lets tests observe that every
//! buffer is released exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::{Result, TxnError};

/// Source of owned, page-sized buffers.
pub trait PageAllocator: Send + Sync {
    /// Returns a zeroed buffer of exactly `bytes` bytes.
    fn allocate(&self, bytes: usize) -> Result<Box<[u8]>>;
    /// Takes back a buffer previously returned by [`PageAllocator::allocate`].
    fn release(&self, buf: Box<[u8]>);
}

/// Allocator backed by the process heap.
///
/// Reservation is fallible, so exhaustion surfaces as
/// [`TxnError::OutOfMemory`] instead of aborting the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl PageAllocator for HeapAllocator {
    fn allocate(&self, bytes: usize) -> Result<Box<[u8]>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes)
            .map_err(|_| TxnError::OutOfMemory { bytes })?;
        buf.resize(bytes, 0);
        Ok(buf.into_boxed_slice())
    }

    fn release(&self, buf: Box<[u8]>) {
        drop(buf);
    }
}

/// Snapshot of a [`CountingAllocator`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AllocStats {
    /// Successful allocations.
    pub allocations: u64,
    /// Buffers handed back.
    pub releases: u64,
    /// Allocations refused, injected or real.
    pub failures: u64,
    /// Bytes currently outstanding.
    pub live_bytes: u64,
}

impl AllocStats {
    /// Buffers allocated but not yet released.
    pub fn outstanding(&self) -> u64 {
        self.allocations - self.releases
    }
}

/// Leak-detection wrapper that counts every allocate/release pair.
///
/// It can also be armed to refuse allocations after a given number of
/// successes, which is how tests drive the out-of-memory paths.
pub struct CountingAllocator {
    inner: Arc<dyn PageAllocator>,
    allocations: AtomicU64,
    releases: AtomicU64,
    failures: AtomicU64,
    live_bytes: AtomicU64,
    fail_after: AtomicU64,
}

const NEVER_FAIL: u64 = u64::MAX;

impl CountingAllocator {
    /// Counts allocations served by [`HeapAllocator`].
    pub fn new() -> Self {
        Self::wrap(Arc::new(HeapAllocator))
    }

    /// Counts allocations served by `inner`.
    pub fn wrap(inner: Arc<dyn PageAllocator>) -> Self {
        Self {
            inner,
            allocations: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            live_bytes: AtomicU64::new(0),
            fail_after: AtomicU64::new(NEVER_FAIL),
        }
    }

    /// Refuses every allocation once `successes` more have been served.
    pub fn fail_after(&self, successes: u64) {
        let limit = self
            .allocations
            .load(Ordering::Relaxed)
            .saturating_add(successes);
        self.fail_after.store(limit, Ordering::Relaxed);
    }

    /// Clears any armed failure.
    pub fn disarm(&self) {
        self.fail_after.store(NEVER_FAIL, Ordering::Relaxed);
    }

    /// Current counters.
    pub fn stats(&self) -> AllocStats {
        AllocStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
        }
    }
}

impl Default for CountingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAllocator for CountingAllocator {
    fn allocate(&self, bytes: usize) -> Result<Box<[u8]>> {
        if self.allocations.load(Ordering::Relaxed) >= self.fail_after.load(Ordering::Relaxed) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(TxnError::OutOfMemory { bytes });
        }
        match self.inner.allocate(bytes) {
            Ok(buf) => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                self.live_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
                Ok(buf)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    fn release(&self, buf: Box<[u8]>) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.live_bytes
            .fetch_sub(buf.len() as u64, Ordering::Relaxed);
        self.inner.release(buf);
    }
}
