//! Growth engine: sizing and bulk relocation between arenas.
//!
//! Growth happens in three phases so that a failure at any point leaves
//! the container exactly as it was:
//!
//! 1. [`plan`] sizes the new arena from the current capacity, the growth
//!    factor and the average element size including the pending insert.
//! 2. [`stage`] relocates every live element, in logical order, into the
//!    freshly acquired arena. Moves are bitwise copies whose originals stay
//!    authoritative; clones create independent copies. If any clone fails,
//!    the copies made so far are destroyed, the new arena is released and
//!    the error is surfaced.
//! 3. [`commit`] repoints every record into the new arena, then destroys
//!    the originals that were cloned and releases the old arena.
//!
//! [`relocate`] runs the three phases and keeps the metrics.

#![allow(unsafe_code)]

use std::alloc::Layout;

use motley_core::{CloningPolicyKind, Operation, StoreConfig, StoreError, StoreMetrics};
use tracing::{debug, warn};

use crate::arena::Arena;
use crate::directory::Directory;
use crate::policy::Capability;
use crate::resource::MemoryResource;

/// Size and alignment of the next arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrowthPlan {
    /// Arena size in bytes.
    pub capacity: usize,
    /// Arena alignment.
    pub align: usize,
}

/// Size the arena that replaces `arena` so that it holds every live
/// element plus `incoming`.
///
/// The byte target is
/// `max(capacity * growth_factor, (count + 1) * new_average)`, raised to the
/// padded length actually needed and to the configured minimum, where
/// `new_average = (total_bytes + incoming) / (count + 1)`.
pub fn plan<I: ?Sized>(
    config: &StoreConfig,
    arena: &Arena,
    directory: &Directory<I>,
    incoming: Option<Layout>,
) -> Result<GrowthPlan, StoreError> {
    let align = config
        .base_align
        .max(arena.align())
        .max(directory.max_align())
        .max(incoming.map_or(1, |layout| layout.align()));

    let count = directory.len() + usize::from(incoming.is_some());
    let bytes = directory.total_bytes() + incoming.map_or(0, |layout| layout.size());
    let new_average = if count == 0 {
        0.0
    } else {
        bytes as f64 / count as f64
    };

    // Float-to-int casts saturate, so huge factors clamp to usize::MAX and
    // fail cleanly at acquisition.
    let geometric = (arena.capacity() as f64 * config.growth_factor) as usize;
    let average_driven = (count as f64 * new_average).ceil() as usize;
    let required = directory
        .packed_len(incoming)
        .ok_or(StoreError::AllocationFailure {
            requested: usize::MAX,
            align,
        })?;

    let capacity = geometric
        .max(average_driven)
        .max(required)
        .max(config.min_arena_bytes);
    Ok(GrowthPlan { capacity, align })
}

/// Refuse an operation that would relocate elements `from..` (except
/// `skip`) when any of them is pinned.
pub fn ensure_relocatable<I: ?Sized>(
    config: &StoreConfig,
    directory: &Directory<I>,
    operation: Operation,
    from: usize,
    skip: Option<usize>,
) -> Result<(), StoreError> {
    let movers = directory.len().saturating_sub(from) - usize::from(skip.is_some_and(|s| s >= from));
    if movers == 0 {
        return Ok(());
    }
    let pinned = match config.policy {
        CloningPolicyKind::NoCloning => true,
        CloningPolicyKind::Delegate => directory
            .iter()
            .enumerate()
            .skip(from)
            .any(|(index, record)| Some(index) != skip && !record.policy().is_relocatable()),
    };
    if pinned {
        warn!(%operation, movers, "refusing to relocate pinned elements");
        return Err(StoreError::CloningUnsupported { operation });
    }
    Ok(())
}

/// Elements relocated into a new arena but not yet committed.
pub(crate) struct Staged {
    arena: Arena,
    /// New offset of every surviving record, in logical order.
    offsets: Vec<usize>,
    /// Object bytes relocated.
    bytes: usize,
}

/// Relocate every record except `skip` from `from` into `to`.
///
/// On failure every clone already made in `to` is destroyed, `to` is
/// released, and `from` and `directory` are untouched.
pub(crate) fn stage<I: ?Sized, R: MemoryResource + ?Sized>(
    resource: &R,
    directory: &Directory<I>,
    from: &Arena,
    mut to: Arena,
    skip: Option<usize>,
) -> Result<Staged, StoreError> {
    let mut offsets = Vec::with_capacity(directory.len());
    let mut bytes = 0usize;
    for (index, record) in directory.iter().enumerate() {
        if skip == Some(index) {
            continue;
        }
        let policy = record.policy();
        let outcome = match to.bump(policy.layout()) {
            // SAFETY: the record's object is live at its offset in `from`.
            // `offset` was just reserved in `to` for this layout, so it is
            // aligned, in bounds and disjoint from `from`.
            Some(offset) => unsafe { policy.clone_or_move(from.ptr_at(record.offset()), to.ptr_at(offset)) }
                .map(|()| offset)
                .map_err(|source| StoreError::RelocationFailure {
                    index,
                    type_name: policy.type_name(),
                    source,
                }),
            None => Err(StoreError::AllocationFailure {
                requested: to.capacity(),
                align: to.align(),
            }),
        };
        match outcome {
            Ok(offset) => {
                offsets.push(offset);
                bytes += policy.size();
            }
            Err(err) => {
                let retired = Retired { resource, arena: to };
                rollback(directory, &retired.arena, &offsets, skip);
                return Err(err);
            }
        }
    }
    Ok(Staged {
        arena: to,
        offsets,
        bytes,
    })
}

/// Destroy the clones made by a partial [`stage`].
///
/// Moved elements need nothing: their originals in the old arena still own
/// the values and the bitwise copies are simply forgotten.
fn rollback<I: ?Sized>(directory: &Directory<I>, to: &Arena, offsets: &[usize], skip: Option<usize>) {
    let survivors = directory
        .iter()
        .enumerate()
        .filter(|(index, _)| Some(*index) != skip)
        .map(|(_, record)| record);
    for (record, &offset) in survivors.zip(offsets) {
        if record.policy().capability() == Capability::Clone {
            // SAFETY: `stage` cloned this record into `to` at `offset`, and
            // the copy is not referenced anywhere else.
            unsafe { record.policy().destroy(to.ptr_at(offset)) };
        }
    }
}

/// Adopt a staged arena.
///
/// The directory is brought up to date first: the record at `skip` is
/// removed and every survivor is repointed into the staged arena, which
/// replaces `arena`. Only then are the superseded originals (cloned
/// elements and the skipped one) destroyed in the old buffer, so a
/// panicking destructor can leak but never leaves a record pointing at a
/// destroyed object.
pub(crate) fn commit<I: ?Sized, R: MemoryResource + ?Sized>(
    resource: &R,
    arena: &mut Arena,
    directory: &mut Directory<I>,
    staged: Staged,
    skip: Option<usize>,
) {
    let superseded: Vec<_> = directory
        .iter()
        .enumerate()
        .filter(|(index, record)| skip == Some(*index) || record.policy().capability() == Capability::Clone)
        .map(|(_, record)| (*record.policy(), record.offset()))
        .collect();
    if let Some(index) = skip {
        directory.remove(index);
    }
    for (record, offset) in directory.iter_mut().zip(staged.offsets) {
        record.offset = offset;
    }

    let retired = Retired {
        resource,
        arena: std::mem::replace(arena, staged.arena),
    };
    for (policy, offset) in superseded {
        // SAFETY: the original is live in the retired arena and no record
        // refers to it any more: it was cloned into the new arena or it is
        // the removed element.
        unsafe { policy.destroy(retired.arena.ptr_at(offset)) };
    }
}

/// An arena no record points into. Released on drop, also while
/// unwinding out of a destructor.
struct Retired<'a, R: MemoryResource + ?Sized> {
    resource: &'a R,
    arena: Arena,
}

impl<R: MemoryResource + ?Sized> Drop for Retired<'_, R> {
    fn drop(&mut self) {
        let arena = std::mem::replace(&mut self.arena, Arena::empty());
        // SAFETY: the arena came from `resource` and holds no live record.
        unsafe { arena.release(self.resource) };
    }
}

/// Acquire an arena per `plan` and move every element except `skip` into
/// it, removing the record at `skip` from the directory.
///
/// On success `arena` is replaced and the old buffer released; on failure
/// nothing observable changes except the rollback counter.
pub(crate) fn relocate<I: ?Sized, R: MemoryResource + ?Sized>(
    resource: &R,
    arena: &mut Arena,
    directory: &mut Directory<I>,
    metrics: &mut StoreMetrics,
    plan: GrowthPlan,
    skip: Option<usize>,
) -> Result<(), StoreError> {
    let target = Arena::acquire(resource, plan.capacity, plan.align)?;
    metrics.arena_acquisitions += 1;

    let staged = match stage(resource, directory, arena, target, skip) {
        Ok(staged) => staged,
        Err(err) => {
            metrics.arena_releases += 1;
            metrics.relocation_rollbacks += 1;
            warn!(error = %err, "relocation rolled back");
            return Err(err);
        }
    };

    let moved = staged.offsets.len() as u64;
    let old_capacity = arena.capacity();
    let new_capacity = staged.arena.capacity();
    if old_capacity > 0 {
        metrics.arena_releases += 1;
    }
    metrics.elements_relocated += moved;
    metrics.bytes_relocated += staged.bytes as u64;
    metrics.peak_arena_bytes = metrics.peak_arena_bytes.max(new_capacity);
    debug!(
        from_bytes = old_capacity,
        to_bytes = new_capacity,
        align = plan.align,
        elements = moved,
        "arena relocated"
    );
    commit(resource, arena, directory, staged, skip);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ElementRecord;
    use crate::policy::{ElementPolicy, Upcast};
    use crate::resource::{BoundedResource, GlobalResource};
    use crate::upcast;
    use motley_core::{RelocationError, TryClone};
    use std::cell::Cell;
    use std::ptr;
    use std::rc::Rc;

    trait Value {
        fn value(&self) -> u64;
    }

    struct Plain(u64);

    struct Fragile {
        value: u64,
        clones_left: Rc<Cell<u32>>,
        live: Rc<Cell<i32>>,
    }

    impl Value for Plain {
        fn value(&self) -> u64 {
            self.0
        }
    }

    impl Value for Fragile {
        fn value(&self) -> u64 {
            self.value
        }
    }

    impl TryClone for Fragile {
        fn try_clone(&self) -> Result<Self, RelocationError> {
            let left = self.clones_left.get();
            if left == 0 {
                return Err(RelocationError::new("clone budget exhausted"));
            }
            self.clones_left.set(left - 1);
            self.live.set(self.live.get() + 1);
            Ok(Self {
                value: self.value,
                clones_left: Rc::clone(&self.clones_left),
                live: Rc::clone(&self.live),
            })
        }
    }

    impl Drop for Fragile {
        fn drop(&mut self) {
            self.live.set(self.live.get() - 1);
        }
    }

    upcast!(dyn Value => Plain, Fragile);

    fn push<T: Upcast<dyn Value> + 'static>(
        arena: &mut Arena,
        dir: &mut Directory<dyn Value>,
        value: T,
        policy: ElementPolicy<dyn Value>,
    ) {
        let offset = arena.bump(policy.layout()).unwrap();
        unsafe { ptr::write(arena.ptr_at(offset) as *mut T, value) };
        dir.append(ElementRecord::new(offset, policy));
    }

    fn values(arena: &Arena, dir: &Directory<dyn Value>) -> Vec<u64> {
        dir.iter()
            .map(|r| unsafe { (*r.policy().view(arena.ptr_at(r.offset()))).value() })
            .collect()
    }

    fn destroy_all(arena: Arena, dir: &Directory<dyn Value>) {
        for r in dir.iter() {
            unsafe { r.policy().destroy(arena.ptr_at(r.offset())) };
        }
        unsafe { arena.release(&GlobalResource) };
    }

    #[test]
    fn plan_uses_minimum_for_first_insert() {
        let config = StoreConfig::default();
        let dir = Directory::<dyn Value>::new();
        let plan = plan(&config, &Arena::empty(), &dir, Some(Layout::new::<u64>())).unwrap();
        assert_eq!(plan.capacity, StoreConfig::DEFAULT_MIN_ARENA_BYTES);
        assert_eq!(plan.align, StoreConfig::DEFAULT_BASE_ALIGN);
    }

    #[test]
    fn plan_grows_geometrically() {
        let config = StoreConfig::default();
        let mut arena = Arena::acquire(&GlobalResource, 256, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        for i in 0..32 {
            push(&mut arena, &mut dir, Plain(i), ElementPolicy::movable::<Plain>());
        }
        let plan = plan(&config, &arena, &dir, Some(Layout::new::<Plain>())).unwrap();
        assert_eq!(plan.capacity, 512);
        destroy_all(arena, &dir);
    }

    #[test]
    fn plan_follows_average_for_large_incoming() {
        let config = StoreConfig {
            min_arena_bytes: 1,
            ..StoreConfig::default()
        };
        let mut arena = Arena::acquire(&GlobalResource, 16, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        push(&mut arena, &mut dir, Plain(1), ElementPolicy::movable::<Plain>());
        // new_average = (8 + 1000) / 2 = 504 -> 2 * 504 = 1008 > 16 * 2.
        let incoming = Layout::from_size_align(1000, 8).unwrap();
        let plan = plan(&config, &arena, &dir, Some(incoming)).unwrap();
        assert_eq!(plan.capacity, 1008);
        destroy_all(arena, &dir);
    }

    #[test]
    fn plan_raises_alignment() {
        let config = StoreConfig::default();
        let dir = Directory::<dyn Value>::new();
        let incoming = Layout::from_size_align(64, 64).unwrap();
        let plan = plan(&config, &Arena::empty(), &dir, Some(incoming)).unwrap();
        assert_eq!(plan.align, 64);
    }

    #[test]
    fn relocate_moves_everything_in_order() {
        let mut arena = Arena::acquire(&GlobalResource, 64, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        for i in 0..8 {
            push(&mut arena, &mut dir, Plain(i * 10), ElementPolicy::movable::<Plain>());
        }
        let mut metrics = StoreMetrics::default();
        let plan = GrowthPlan {
            capacity: 256,
            align: 16,
        };
        relocate(&GlobalResource, &mut arena, &mut dir, &mut metrics, plan, None).unwrap();
        assert_eq!(arena.capacity(), 256);
        assert_eq!(values(&arena, &dir), vec![0, 10, 20, 30, 40, 50, 60, 70]);
        assert_eq!(metrics.elements_relocated, 8);
        assert_eq!(metrics.bytes_relocated, 64);
        assert_eq!(metrics.arena_releases, 1);
        destroy_all(arena, &dir);
    }

    #[test]
    fn failed_clone_rolls_back() {
        let clones_left = Rc::new(Cell::new(2));
        let live = Rc::new(Cell::new(0));
        let bounded = BoundedResource::new(1 << 16);
        let mut arena = Arena::acquire(&bounded, 128, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        for i in 0..4 {
            live.set(live.get() + 1);
            let fragile = Fragile {
                value: i,
                clones_left: Rc::clone(&clones_left),
                live: Rc::clone(&live),
            };
            push(&mut arena, &mut dir, fragile, ElementPolicy::cloning::<Fragile>());
        }
        let mut metrics = StoreMetrics::default();
        let plan = GrowthPlan {
            capacity: 512,
            align: 16,
        };
        let err = relocate(&bounded, &mut arena, &mut dir, &mut metrics, plan, None).unwrap_err();
        assert!(matches!(err, StoreError::RelocationFailure { index: 2, .. }));
        // Two clones were made and destroyed again; the originals survive.
        assert_eq!(live.get(), 4);
        assert_eq!(arena.capacity(), 128);
        assert_eq!(bounded.in_use(), 128);
        assert_eq!(values(&arena, &dir), vec![0, 1, 2, 3]);
        assert_eq!(metrics.relocation_rollbacks, 1);

        for r in dir.iter() {
            unsafe { r.policy().destroy(arena.ptr_at(r.offset())) };
        }
        unsafe { arena.release(&bounded) };
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn successful_clone_destroys_originals() {
        let clones_left = Rc::new(Cell::new(100));
        let live = Rc::new(Cell::new(0));
        let mut arena = Arena::acquire(&GlobalResource, 128, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        for i in 0..3 {
            live.set(live.get() + 1);
            let fragile = Fragile {
                value: i,
                clones_left: Rc::clone(&clones_left),
                live: Rc::clone(&live),
            };
            push(&mut arena, &mut dir, fragile, ElementPolicy::cloning::<Fragile>());
        }
        let mut metrics = StoreMetrics::default();
        let plan = GrowthPlan {
            capacity: 256,
            align: 16,
        };
        relocate(&GlobalResource, &mut arena, &mut dir, &mut metrics, plan, None).unwrap();
        assert_eq!(live.get(), 3);
        assert_eq!(values(&arena, &dir), vec![0, 1, 2]);
        destroy_all(arena, &dir);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn skipped_record_is_destroyed_on_commit() {
        let clones_left = Rc::new(Cell::new(100));
        let live = Rc::new(Cell::new(0));
        let mut arena = Arena::acquire(&GlobalResource, 128, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        for i in 0..3 {
            live.set(live.get() + 1);
            let fragile = Fragile {
                value: i,
                clones_left: Rc::clone(&clones_left),
                live: Rc::clone(&live),
            };
            push(&mut arena, &mut dir, fragile, ElementPolicy::cloning::<Fragile>());
        }
        let mut metrics = StoreMetrics::default();
        let plan = GrowthPlan {
            capacity: 128,
            align: 16,
        };
        relocate(&GlobalResource, &mut arena, &mut dir, &mut metrics, plan, Some(1)).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(live.get(), 2);
        assert_eq!(values(&arena, &dir), vec![0, 2]);
        destroy_all(arena, &dir);
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn acquisition_failure_leaves_state() {
        let bounded = BoundedResource::new(200);
        let mut arena = Arena::acquire(&bounded, 128, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        push(&mut arena, &mut dir, Plain(7), ElementPolicy::movable::<Plain>());
        let mut metrics = StoreMetrics::default();
        let plan = GrowthPlan {
            capacity: 256,
            align: 16,
        };
        let err = relocate(&bounded, &mut arena, &mut dir, &mut metrics, plan, None).unwrap_err();
        assert!(matches!(err, StoreError::AllocationFailure { requested: 256, .. }));
        assert_eq!(metrics, StoreMetrics::default());
        assert_eq!(values(&arena, &dir), vec![7]);
        dir.iter().for_each(|r| unsafe { r.policy().destroy(arena.ptr_at(r.offset())) });
        unsafe { arena.release(&bounded) };
    }

    #[test]
    fn pinned_records_block_relocation() {
        let config = StoreConfig::default();
        let mut arena = Arena::acquire(&GlobalResource, 64, 16).unwrap();
        let mut dir = Directory::<dyn Value>::new();
        push(&mut arena, &mut dir, Plain(1), ElementPolicy::movable::<Plain>());
        push(&mut arena, &mut dir, Plain(2), ElementPolicy::pinned::<Plain>());
        assert!(ensure_relocatable(&config, &dir, Operation::Insert, 0, None).is_err());
        assert!(ensure_relocatable(&config, &dir, Operation::Erase, 0, Some(1)).is_ok());
        assert!(ensure_relocatable(&config, &dir, Operation::Erase, 2, None).is_ok());
        let pinned = StoreConfig::pinned();
        assert_eq!(
            ensure_relocatable(&pinned, &dir, Operation::Reserve, 0, None),
            Err(StoreError::CloningUnsupported {
                operation: Operation::Reserve
            })
        );
        destroy_all(arena, &dir);
    }
}
