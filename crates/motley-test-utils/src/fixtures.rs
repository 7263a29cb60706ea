//! Reusable element fixtures.
//!
//! Every fixture implements [`Payload`], the interface the integration
//! tests store through:
//!
//! - [`Blob`] is a plain byte block of exactly `N` bytes (alignment 1).
//! - [`Aligned64`] forces a 64-byte alignment.
//! - [`Counted`] reports its destruction to a [`DropCounter`].
//! - [`FlakyClone`] clones successfully until a shared [`CloneBudget`]
//!   runs out, then fails.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use motley_arena::{upcast, Upcast};
use motley_core::{RelocationError, TryClone};

/// Interface shared by every fixture.
pub trait Payload {
    /// Caller-chosen value identifying the element.
    fn tag(&self) -> u64;

    /// Overwrite the tag.
    fn set_tag(&mut self, tag: u64);

    /// Short human-readable description.
    fn describe(&self) -> String {
        format!("payload #{}", self.tag())
    }
}

/// A block of exactly `N` bytes whose leading bytes hold the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Blob<const N: usize>(pub [u8; N]);

impl<const N: usize> Blob<N> {
    pub fn new(tag: u64) -> Self {
        let mut blob = Self([0; N]);
        blob.set_tag(tag);
        blob
    }
}

impl<const N: usize> Payload for Blob<N> {
    fn tag(&self) -> u64 {
        let mut bytes = [0u8; 8];
        let len = N.min(8);
        bytes[..len].copy_from_slice(&self.0[..len]);
        u64::from_le_bytes(bytes)
    }

    fn set_tag(&mut self, tag: u64) {
        let len = N.min(8);
        self.0[..len].copy_from_slice(&tag.to_le_bytes()[..len]);
    }

    fn describe(&self) -> String {
        format!("blob<{N}> #{}", self.tag())
    }
}

// SAFETY: both methods return `this` through an unsizing coercion.
unsafe impl<const N: usize> Upcast<dyn Payload> for Blob<N> {
    fn upcast(this: *const Self) -> *const dyn Payload {
        this
    }

    fn upcast_mut(this: *mut Self) -> *mut dyn Payload {
        this
    }
}

// SAFETY: as above; `Blob` is `Send + Sync`.
unsafe impl<const N: usize> Upcast<dyn Payload + Send + Sync> for Blob<N> {
    fn upcast(this: *const Self) -> *const (dyn Payload + Send + Sync) {
        this
    }

    fn upcast_mut(this: *mut Self) -> *mut (dyn Payload + Send + Sync) {
        this
    }
}

/// An element that must sit on a 64-byte boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(align(64))]
pub struct Aligned64 {
    pub tag: u64,
}

impl Aligned64 {
    pub fn new(tag: u64) -> Self {
        Self { tag }
    }
}

impl Payload for Aligned64 {
    fn tag(&self) -> u64 {
        self.tag
    }

    fn set_tag(&mut self, tag: u64) {
        self.tag = tag;
    }
}

/// Shared tally of live fixture instances.
///
/// Incremented whenever a tracked fixture is created (including clones) and
/// decremented on drop, so `live() == 0` after a container is dropped proves
/// every element was destroyed exactly once.
#[derive(Clone, Debug, Default)]
pub struct DropCounter {
    live: Arc<AtomicI64>,
    drops: Arc<AtomicUsize>,
}

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances currently alive.
    pub fn live(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Destructor runs observed so far.
    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    fn created(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    fn dropped(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A cloneable element that reports its lifetime to a [`DropCounter`].
#[derive(Debug)]
pub struct Counted {
    pub tag: u64,
    counter: DropCounter,
}

impl Counted {
    pub fn new(tag: u64, counter: &DropCounter) -> Self {
        counter.created();
        Self {
            tag,
            counter: counter.clone(),
        }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.counter.dropped();
    }
}

impl TryClone for Counted {
    fn try_clone(&self) -> Result<Self, RelocationError> {
        Ok(Self::new(self.tag, &self.counter))
    }
}

impl Payload for Counted {
    fn tag(&self) -> u64 {
        self.tag
    }

    fn set_tag(&mut self, tag: u64) {
        self.tag = tag;
    }
}

/// Number of clones a group of [`FlakyClone`] elements may still perform.
#[derive(Clone, Debug)]
pub struct CloneBudget {
    remaining: Arc<AtomicUsize>,
}

impl CloneBudget {
    pub fn new(clones: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(clones)),
        }
    }

    /// An effectively unlimited budget.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Replace the remaining budget.
    pub fn set(&self, clones: usize) {
        self.remaining.store(clones, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

/// Clones until its [`CloneBudget`] is exhausted, then fails.
///
/// Useful for testing rollback of growth and erase compaction.
#[derive(Debug)]
pub struct FlakyClone {
    pub tag: u64,
    budget: CloneBudget,
    counter: DropCounter,
}

impl FlakyClone {
    pub fn new(tag: u64, budget: &CloneBudget, counter: &DropCounter) -> Self {
        counter.created();
        Self {
            tag,
            budget: budget.clone(),
            counter: counter.clone(),
        }
    }
}

impl Drop for FlakyClone {
    fn drop(&mut self) {
        self.counter.dropped();
    }
}

impl TryClone for FlakyClone {
    fn try_clone(&self) -> Result<Self, RelocationError> {
        if !self.budget.take() {
            return Err(RelocationError::new(format!(
                "clone budget exhausted copying #{}",
                self.tag
            )));
        }
        Ok(Self::new(self.tag, &self.budget, &self.counter))
    }
}

impl Payload for FlakyClone {
    fn tag(&self) -> u64 {
        self.tag
    }

    fn set_tag(&mut self, tag: u64) {
        self.tag = tag;
    }
}

upcast!(dyn Payload => Aligned64, Counted, FlakyClone);
upcast!(dyn Payload + Send + Sync => Aligned64, Counted, FlakyClone);
