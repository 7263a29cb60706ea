//! Memory resources: the raw byte providers behind every arena.
//!
//! A container never talks to the allocator directly. It asks its
//! [`MemoryResource`] for one buffer per arena and hands the buffer back
//! once every element has been moved out of it.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Supplier of raw, aligned byte buffers.
///
/// Requests always have a non-zero size.
pub trait MemoryResource {
    /// Allocate a buffer for `layout`, or `None` if the resource is
    /// exhausted.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return a buffer to the resource.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`MemoryResource::allocate`] on this
    /// resource with the same `layout`, and must not have been deallocated
    /// already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process-wide global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalResource;

impl MemoryResource for GlobalResource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0, "zero-sized arena request");
        // SAFETY: layout has a non-zero size (arenas are never zero-sized).
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// A resource that refuses to hand out more than `limit` bytes at once.
///
/// Useful for hard memory ceilings and for exercising the
/// allocation-failure paths of the growth engine.
#[derive(Debug)]
pub struct BoundedResource<R = GlobalResource> {
    inner: R,
    limit: usize,
    in_use: AtomicUsize,
}

impl BoundedResource<GlobalResource> {
    /// Bound the global allocator to `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self::with_inner(GlobalResource, limit)
    }
}

impl<R: MemoryResource> BoundedResource<R> {
    /// Bound an arbitrary resource to `limit` bytes.
    pub fn with_inner(inner: R, limit: usize) -> Self {
        Self {
            inner,
            limit,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Bytes currently handed out.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// The byte ceiling.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<R: MemoryResource> MemoryResource for BoundedResource<R> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let size = layout.size();
        self.in_use
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                used.checked_add(size).filter(|&total| total <= self.limit)
            })
            .ok()?;
        let ptr = self.inner.allocate(layout);
        if ptr.is_none() {
            self.in_use.fetch_sub(size, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.inner.deallocate(ptr, layout) };
        self.in_use.fetch_sub(layout.size(), Ordering::Relaxed);
    }
}

impl<R: MemoryResource + ?Sized> MemoryResource for &R {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

impl<R: MemoryResource + ?Sized> MemoryResource for Arc<R> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { (**self).deallocate(ptr, layout) }
    }
}
