//! The contiguous byte buffer currently backing a container.
//!
//! An [`Arena`] is one buffer obtained from a [`MemoryResource`] with a
//! bump cursor. Only the resource it came from may take it back. Elements are placed at increasing, suitably aligned
//! offsets. Arenas never grow in place: the growth engine acquires a
//! larger one and relocates every element into it.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;

use motley_core::StoreError;

use crate::resource::MemoryResource;

/// Round `offset` up to a multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
pub fn align_up(offset: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    offset
        .checked_add(align - 1)
        .map(|padded| padded & !(align - 1))
}

/// A single contiguous buffer with bump placement.
///
/// An arena does not release itself on drop; its owner must hand it back
/// through [`Arena::release`] with the resource it came from.
#[derive(Debug)]
pub struct Arena {
    /// Start of the buffer. Dangling when `capacity == 0`.
    base: NonNull<u8>,
    /// Buffer size in bytes.
    capacity: usize,
    /// Alignment the buffer was allocated with.
    align: usize,
    /// Bump cursor: end of the last placed element.
    used: usize,
}

// SAFETY: an arena is an untyped, uniquely owned byte buffer. Whatever
// objects live inside it are owned by the container, whose own auto traits
// follow the element interface.
unsafe impl Send for Arena {}
// SAFETY: shared access only reads the buffer bounds.
unsafe impl Sync for Arena {}

impl Arena {
    /// An arena with no buffer behind it.
    pub fn empty() -> Self {
        Self {
            base: NonNull::dangling(),
            capacity: 0,
            align: 1,
            used: 0,
        }
    }

    /// Obtain a buffer of `capacity` bytes aligned to `align`.
    ///
    /// A zero capacity yields [`Arena::empty`] without touching the
    /// resource.
    pub fn acquire<R: MemoryResource + ?Sized>(
        resource: &R,
        capacity: usize,
        align: usize,
    ) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Ok(Self::empty());
        }
        let failure = StoreError::AllocationFailure {
            requested: capacity,
            align,
        };
        let layout = Layout::from_size_align(capacity, align).map_err(|_| failure.clone())?;
        let base = resource.allocate(layout).ok_or(failure)?;
        Ok(Self {
            base,
            capacity,
            align,
            used: 0,
        })
    }

    /// Hand the buffer back to `resource`.
    ///
    /// Returns whether a buffer was actually released.
    ///
    /// # Safety
    ///
    /// `resource` must be the resource this arena was acquired from, and no
    /// live element may remain in the buffer.
    pub unsafe fn release<R: MemoryResource + ?Sized>(self, resource: &R) -> bool {
        if self.capacity == 0 {
            return false;
        }
        // SAFETY: capacity/align were validated by `Layout::from_size_align`
        // in `acquire`, and the caller guarantees `base` came from
        // `resource.allocate` with that layout. `self` is consumed, so this
        // runs at most once.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.capacity, self.align);
            resource.deallocate(self.base, layout);
        }
        true
    }

    /// Whether a buffer backs this arena.
    pub fn is_allocated(&self) -> bool {
        self.capacity > 0
    }

    /// Buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes up to the end of the last placed element.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available after the cursor.
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Alignment of the buffer.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Offset at which `layout` would be placed, if it fits.
    ///
    /// A layout fits when the arena is allocated, its alignment does not
    /// exceed the buffer alignment, and the aligned range ends within
    /// capacity.
    pub fn fit(&self, layout: Layout) -> Option<usize> {
        if !self.is_allocated() || layout.align() > self.align {
            return None;
        }
        let offset = align_up(self.used, layout.align())?;
        let end = offset.checked_add(layout.size())?;
        (end <= self.capacity).then_some(offset)
    }

    /// Place `layout` at the cursor and advance past it.
    pub fn bump(&mut self, layout: Layout) -> Option<usize> {
        let offset = self.fit(layout)?;
        self.used = offset + layout.size();
        Some(offset)
    }

    /// Move the cursor, after compaction shrank the occupied prefix.
    pub(crate) fn set_used(&mut self, used: usize) {
        debug_assert!(used <= self.capacity);
        self.used = used;
    }

    /// Address of `offset` within the buffer.
    ///
    /// `offset` must not exceed the capacity.
    pub(crate) fn ptr_at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.capacity);
        // SAFETY: offset is within (or one past) the allocation.
        unsafe { self.base.as_ptr().add(offset) }
    }
}
