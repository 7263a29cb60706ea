//! Test utilities and mock types for Motley development.
//!
//! Provides element fixtures implementing the [`Payload`] interface (see
//! [`fixtures`]) and instrumented [`MemoryResource`] implementations for
//! observing and breaking arena acquisition.

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{Aligned64, Blob, CloneBudget, Counted, DropCounter, FlakyClone, Payload};

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use motley_arena::{GlobalResource, MemoryResource};

/// Resource that records every request made of it.
///
/// Counts are independent of the container's own metrics, so tests can
/// cross-check what the container reports against what it actually did.
#[derive(Debug, Default)]
pub struct CountingResource<R = GlobalResource> {
    inner: R,
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    bytes_allocated: AtomicUsize,
    bytes_outstanding: AtomicUsize,
}

impl CountingResource<GlobalResource> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: MemoryResource> CountingResource<R> {
    pub fn with_inner(inner: R) -> Self {
        Self {
            inner,
            allocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            bytes_allocated: AtomicUsize::new(0),
            bytes_outstanding: AtomicUsize::new(0),
        }
    }

    /// Successful `allocate` calls.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::SeqCst)
    }

    /// Total bytes ever handed out.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.load(Ordering::SeqCst)
    }

    /// Bytes handed out and not yet returned.
    pub fn bytes_outstanding(&self) -> usize {
        self.bytes_outstanding.load(Ordering::SeqCst)
    }
}

impl<R: MemoryResource> MemoryResource for CountingResource<R> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.inner.allocate(layout)?;
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.bytes_allocated.fetch_add(layout.size(), Ordering::SeqCst);
        self.bytes_outstanding.fetch_add(layout.size(), Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations.fetch_add(1, Ordering::SeqCst);
        self.bytes_outstanding.fetch_sub(layout.size(), Ordering::SeqCst);
        // SAFETY: forwarded from the caller's contract; `ptr` came from
        // `inner` through `allocate`.
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}

/// Resource that succeeds a fixed number of times, then refuses every
/// request.
///
/// Useful for testing allocation-failure paths at a precise point.
#[derive(Debug)]
pub struct FailingResource {
    succeed_count: usize,
    calls: AtomicUsize,
}

impl FailingResource {
    /// Create a resource that serves `succeed_count` allocations.
    pub fn new(succeed_count: usize) -> Self {
        Self {
            succeed_count,
            calls: AtomicUsize::new(0),
        }
    }

    /// Allocation attempts so far, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MemoryResource for FailingResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.succeed_count {
            return None;
        }
        GlobalResource.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded; successful allocations come from the global
        // resource.
        unsafe { GlobalResource.deallocate(ptr, layout) }
    }
}
