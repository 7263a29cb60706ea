//! The container façade.
//!
//! [`MotleyVec`] composes the arena, the directory, the element policies
//! and the growth engine into a vector-like container of heterogeneous
//! objects viewed through one interface `I` (typically a trait object).
//!
//! # Insertion
//!
//! Every typed insert binds a policy for the concrete type, reserves a
//! directory slot, grows the arena if the object does not fit (in space or
//! alignment), writes the value at the bump cursor and appends its record.
//! Any failure drops the value and leaves the container untouched.
//!
//! # Erase
//!
//! Erase shifts every following element one slot to the left, keeping the
//! storage contiguous and the order intact. Tails made only of movable
//! elements are compacted in place; tails containing cloned elements are
//! rebuilt into a fresh arena of the same size so a clone failure can roll
//! back.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::ptr;

use motley_core::{
    CloningPolicyKind, ContainerId, Operation, StoreConfig, StoreError, StoreMetrics, TryClone,
};
use tracing::{debug, trace, warn};

use crate::arena::{align_up, Arena};
use crate::directory::{Directory, ElementRecord};
use crate::growth::{self, GrowthPlan};
use crate::handle::ElementHandle;
use crate::iter::{Handles, Iter, IterMut};
use crate::policy::{Capability, ElementPolicy, Upcast};
use crate::resource::{GlobalResource, MemoryResource};

/// Contiguous storage for objects of different concrete types sharing the
/// interface `I`.
///
/// ```
/// use motley_arena::{upcast, MotleyVec};
///
/// trait Animal {
///     fn name(&self) -> String;
/// }
///
/// struct Cat;
/// struct Snake {
///     length: u32,
/// }
///
/// impl Animal for Cat {
///     fn name(&self) -> String {
///         "cat".into()
///     }
/// }
///
/// impl Animal for Snake {
///     fn name(&self) -> String {
///         format!("snake ({}cm)", self.length)
///     }
/// }
///
/// upcast!(dyn Animal => Cat, Snake);
///
/// let mut zoo: MotleyVec<dyn Animal> = MotleyVec::new();
/// let cat = zoo.insert(Cat).unwrap();
/// zoo.insert(Snake { length: 120 }).unwrap();
///
/// let names: Vec<String> = zoo.iter().map(|a| a.name()).collect();
/// assert_eq!(names, ["cat", "snake (120cm)"]);
/// assert_eq!(zoo[cat].name(), "cat");
/// ```
pub struct MotleyVec<I: ?Sized, R: MemoryResource = GlobalResource> {
    id: ContainerId,
    config: StoreConfig,
    resource: R,
    arena: Arena,
    directory: Directory<I>,
    /// Average-size hint from the last `reserve`, used while empty.
    size_hint: Option<f64>,
    metrics: StoreMetrics,
    _owns: PhantomData<Box<I>>,
}

impl<I: ?Sized> MotleyVec<I, GlobalResource> {
    /// An empty container on the global allocator with the default
    /// configuration. Acquires nothing until the first insert.
    pub fn new() -> Self {
        Self::from_parts(GlobalResource, StoreConfig::default())
    }

    /// An empty container on the global allocator.
    pub fn with_config(config: StoreConfig) -> Result<Self, StoreError> {
        Self::with_resource(GlobalResource, config)
    }
}

impl<I: ?Sized> Default for MotleyVec<I, GlobalResource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized, R: MemoryResource> MotleyVec<I, R> {
    /// An empty container drawing its arenas from `resource`.
    pub fn with_resource(resource: R, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self::from_parts(resource, config))
    }

    fn from_parts(resource: R, config: StoreConfig) -> Self {
        Self {
            id: ContainerId::next(),
            config,
            resource,
            arena: Arena::empty(),
            directory: Directory::new(),
            size_hint: None,
            metrics: StoreMetrics::default(),
            _owns: PhantomData,
        }
    }

    // ── Insertion ──────────────────────────────────────────────

    /// Append `value`, relocatable by bitwise move.
    ///
    /// In a [`CloningPolicyKind::NoCloning`] container the element is
    /// pinned instead.
    pub fn insert<T: Upcast<I> + 'static>(&mut self, value: T) -> Result<ElementHandle, StoreError> {
        let policy = self.bind(ElementPolicy::movable::<T>());
        self.place(value, policy)
    }

    /// Append `value`, relocatable only through [`TryClone`].
    ///
    /// Growth clones the element into the new arena and destroys the
    /// original once every element has been relocated; a failed clone
    /// rolls the whole growth back.
    pub fn insert_cloning<T: Upcast<I> + TryClone + 'static>(
        &mut self,
        value: T,
    ) -> Result<ElementHandle, StoreError> {
        let policy = self.bind(ElementPolicy::cloning::<T>());
        self.place(value, policy)
    }

    /// Append `value`, which must never change address.
    ///
    /// Once a pinned element is stored, growth and erase compaction that
    /// would relocate it fail with [`StoreError::CloningUnsupported`].
    pub fn insert_pinned<T: Upcast<I> + 'static>(&mut self, value: T) -> Result<ElementHandle, StoreError> {
        self.place(value, ElementPolicy::pinned::<T>())
    }

    fn bind(&self, policy: ElementPolicy<I>) -> ElementPolicy<I> {
        match self.config.policy {
            CloningPolicyKind::Delegate => policy,
            CloningPolicyKind::NoCloning => policy.into_pinned(),
        }
    }

    fn place<T: Upcast<I>>(&mut self, value: T, policy: ElementPolicy<I>) -> Result<ElementHandle, StoreError> {
        let layout = policy.layout();
        self.directory.try_reserve(1)?;
        if self.arena.fit(layout).is_none() {
            self.grow(layout)?;
        }
        let offset = self.arena.bump(layout).ok_or(StoreError::AllocationFailure {
            requested: layout.size(),
            align: layout.align(),
        })?;
        // SAFETY: `offset` was just reserved for `T`'s layout inside the
        // arena's buffer, and the arena alignment is at least `T`'s.
        unsafe { ptr::write(self.arena.ptr_at(offset).cast::<T>(), value) };
        let element = self.directory.append(ElementRecord::new(offset, policy));
        trace!(
            container = %self.id,
            %element,
            offset,
            size = layout.size(),
            "inserted"
        );
        Ok(ElementHandle::new(self.id, element))
    }

    fn grow(&mut self, incoming: Layout) -> Result<(), StoreError> {
        growth::ensure_relocatable(&self.config, &self.directory, Operation::Insert, 0, None)?;
        let plan = growth::plan(&self.config, &self.arena, &self.directory, Some(incoming))?;
        self.relocate(plan, None)
    }

    fn relocate(&mut self, plan: GrowthPlan, skip: Option<usize>) -> Result<(), StoreError> {
        growth::relocate(
            &self.resource,
            &mut self.arena,
            &mut self.directory,
            &mut self.metrics,
            plan,
            skip,
        )?;
        if skip.is_none() {
            self.metrics.growth_events += 1;
        }
        Ok(())
    }

    // ── Erase ──────────────────────────────────────────────────

    /// Destroy the element named by `handle` and close the gap.
    pub fn erase(&mut self, handle: ElementHandle) -> Result<(), StoreError> {
        let index = self.index_of(handle)?;
        self.erase_at(index)
    }

    /// Destroy the element at `index` and shift every later element one
    /// slot to the left.
    ///
    /// Handles of later elements stay valid and now report `index - 1`
    /// positions; the erased element's handle becomes invalid.
    pub fn erase_at(&mut self, index: usize) -> Result<(), StoreError> {
        let len = self.len();
        if index >= len {
            return Err(StoreError::OutOfRange { index, len });
        }
        if self.config.policy == CloningPolicyKind::NoCloning {
            warn!(container = %self.id, index, "erase refused by no-cloning policy");
            return Err(StoreError::CloningUnsupported {
                operation: Operation::Erase,
            });
        }
        growth::ensure_relocatable(&self.config, &self.directory, Operation::Erase, index + 1, None)?;

        if self.directory.find_capability(index + 1, Capability::Clone).is_some() {
            self.rebuild_without(index)
        } else {
            self.compact_in_place(index);
            Ok(())
        }
    }

    /// Remove the record at `index`, destroy its element and shift the
    /// movable tail left over it.
    fn compact_in_place(&mut self, index: usize) {
        let Some((_, erased)) = self.directory.remove(index) else {
            return;
        };
        let mut cursor = erased.offset();
        // SAFETY: the element is live and its record is already detached,
        // so nothing reaches it again even if its destructor unwinds.
        unsafe { erased.policy().destroy(self.arena.ptr_at(erased.offset())) };

        let mut moved = 0u64;
        let mut bytes = 0u64;
        for record in self.directory.iter_mut().skip(index) {
            let layout = record.policy.layout();
            let offset = align_up(cursor, layout.align()).unwrap_or(record.offset);
            if offset != record.offset {
                // SAFETY: the element is live at `record.offset`; the
                // destination lies below it inside the same buffer and is
                // aligned for the layout. Moves tolerate overlap.
                let shifted = unsafe {
                    record
                        .policy
                        .clone_or_move(self.arena.ptr_at(record.offset), self.arena.ptr_at(offset))
                };
                debug_assert!(shifted.is_ok(), "in-place compaction only moves");
                record.offset = offset;
                moved += 1;
                bytes += layout.size() as u64;
            }
            cursor = offset + layout.size();
        }
        self.arena.set_used(cursor);

        if moved > 0 {
            self.metrics.erase_compactions += 1;
            self.metrics.elements_relocated += moved;
            self.metrics.bytes_relocated += bytes;
        }
        trace!(container = %self.id, index, moved, "erase compacted in place");
    }

    /// Relocate every element except `index` into a fresh arena of the same
    /// size, dropping the record at `index`.
    fn rebuild_without(&mut self, index: usize) -> Result<(), StoreError> {
        growth::ensure_relocatable(&self.config, &self.directory, Operation::Erase, 0, Some(index))?;
        let plan = GrowthPlan {
            capacity: self.arena.capacity(),
            align: self.arena.align(),
        };
        self.relocate(plan, Some(index))?;
        self.metrics.erase_compactions += 1;
        trace!(container = %self.id, index, "erase compacted by rebuild");
        Ok(())
    }

    /// Destroy every element, in order. The arena is kept for reuse.
    pub fn clear(&mut self) {
        self.destroy_all();
        self.arena.set_used(0);
    }

    /// Detach every record, then destroy the elements they named.
    ///
    /// If a destructor unwinds, the elements after it are leaked.
    fn destroy_all(&mut self) {
        let records = self.directory.take();
        for record in records.values() {
            // SAFETY: every record names a live element and is no longer in
            // the directory, so each element is destroyed at most once.
            unsafe { record.policy().destroy(self.arena.ptr_at(record.offset())) };
        }
    }

    // ── Capacity ───────────────────────────────────────────────

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    /// Whether the container holds no elements.
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Estimated number of objects the current arena can hold.
    ///
    /// Computed as arena bytes divided by the average element size. While
    /// empty the hint given to [`reserve`](Self::reserve) stands in for the
    /// average; with neither available the capacity is 0. A population of
    /// zero-sized objects reports `usize::MAX`.
    pub fn capacity(&self) -> usize {
        let bytes = self.arena.capacity();
        let average = if self.is_empty() {
            match self.size_hint {
                Some(hint) => hint,
                None => return 0,
            }
        } else {
            self.directory.average_size()
        };
        if bytes == 0 {
            return self.len();
        }
        if average <= 0.0 {
            return usize::MAX;
        }
        ((bytes as f64 / average) as usize).max(self.len())
    }

    /// Make room for `count` objects in total, assuming they average
    /// `average_size_hint` bytes.
    ///
    /// Reserves directory slots and, when the arena is too small, acquires
    /// one of `count * average_size_hint` bytes (at least the bytes the
    /// live elements need) and relocates into it. A no-cloning container
    /// may only do so while empty.
    pub fn reserve(&mut self, count: usize, average_size_hint: f64) -> Result<(), StoreError> {
        if !average_size_hint.is_finite() || average_size_hint < 0.0 {
            return Err(StoreError::InvalidConfig {
                reason: format!("average size hint must be finite and non-negative, got {average_size_hint}"),
            });
        }
        self.directory.try_reserve(count.saturating_sub(self.len()))?;

        let wanted = (count as f64 * average_size_hint).ceil() as usize;
        if wanted > self.arena.capacity() {
            growth::ensure_relocatable(&self.config, &self.directory, Operation::Reserve, 0, None)?;
            let align = self
                .config
                .base_align
                .max(self.arena.align())
                .max(self.directory.max_align());
            let required = self
                .directory
                .packed_len(None)
                .ok_or(StoreError::AllocationFailure {
                    requested: usize::MAX,
                    align,
                })?;
            let plan = GrowthPlan {
                capacity: wanted.max(required),
                align,
            };
            self.relocate(plan, None)?;
        }
        self.size_hint = Some(average_size_hint);
        debug!(
            container = %self.id,
            count,
            average_size_hint,
            capacity_bytes = self.arena.capacity(),
            "reserved"
        );
        Ok(())
    }

    /// Live object bytes divided by live count; 0 when empty.
    pub fn average_size(&self) -> f64 {
        self.directory.average_size()
    }

    /// Sum of the sizes of all live objects.
    pub fn live_bytes(&self) -> usize {
        self.directory.total_bytes()
    }

    /// Size of the current arena.
    pub fn capacity_bytes(&self) -> usize {
        self.arena.capacity()
    }

    /// Arena bytes up to the end of the last element, padding included.
    pub fn used_bytes(&self) -> usize {
        self.arena.used()
    }

    // ── Access ─────────────────────────────────────────────────

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<&I> {
        let record = self.directory.get(index)?;
        // SAFETY: the record names a live element; `&self` keeps it alive
        // and unaliased by `&mut` for the returned lifetime.
        Some(unsafe { &*record.policy().view(self.arena.ptr_at(record.offset())) })
    }

    /// Element at `index`, mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut I> {
        let record = self.directory.get(index)?;
        // SAFETY: as `get`, with exclusive access through `&mut self`.
        Some(unsafe { &mut *record.policy().view_mut(self.arena.ptr_at(record.offset())) })
    }

    /// Element at `index`, or [`StoreError::OutOfRange`].
    pub fn at(&self, index: usize) -> Result<&I, StoreError> {
        let len = self.len();
        self.get(index).ok_or(StoreError::OutOfRange { index, len })
    }

    /// Element at `index` mutably, or [`StoreError::OutOfRange`].
    pub fn at_mut(&mut self, index: usize) -> Result<&mut I, StoreError> {
        let len = self.len();
        self.get_mut(index).ok_or(StoreError::OutOfRange { index, len })
    }

    /// Element named by `handle`, or [`StoreError::InvalidHandle`].
    pub fn resolve(&self, handle: ElementHandle) -> Result<&I, StoreError> {
        let index = self.index_of(handle)?;
        self.at(index)
    }

    /// Element named by `handle` mutably, or [`StoreError::InvalidHandle`].
    pub fn resolve_mut(&mut self, handle: ElementHandle) -> Result<&mut I, StoreError> {
        let index = self.index_of(handle)?;
        self.at_mut(index)
    }

    /// Current logical index of the element named by `handle`.
    pub fn index_of(&self, handle: ElementHandle) -> Result<usize, StoreError> {
        let invalid = StoreError::InvalidHandle {
            element: handle.element(),
        };
        if handle.container() != self.id {
            return Err(invalid);
        }
        self.directory.index_of(handle.element()).ok_or(invalid)
    }

    /// Whether `handle` names a live element of this container.
    pub fn contains(&self, handle: ElementHandle) -> bool {
        self.index_of(handle).is_ok()
    }

    /// Handle of the element at `index`.
    pub fn handle_at(&self, index: usize) -> Option<ElementHandle> {
        let element = self.directory.id_at(index)?;
        Some(ElementHandle::new(self.id, element))
    }

    /// The element at `index` as its concrete type, if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self, index: usize) -> Option<&T> {
        let record = self.directory.get(index)?;
        if record.policy().type_id() != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: the type id matches, so the bytes hold a live `T`.
        Some(unsafe { &*self.arena.ptr_at(record.offset()).cast::<T>() })
    }

    /// Mutable variant of [`downcast_ref`](Self::downcast_ref).
    pub fn downcast_mut<T: 'static>(&mut self, index: usize) -> Option<&mut T> {
        let record = self.directory.get(index)?;
        if record.policy().type_id() != TypeId::of::<T>() {
            return None;
        }
        // SAFETY: as `downcast_ref`, with exclusive access.
        Some(unsafe { &mut *self.arena.ptr_at(record.offset()).cast::<T>() })
    }

    /// Concrete type name of the element at `index`.
    pub fn type_name_at(&self, index: usize) -> Option<&'static str> {
        self.directory.get(index).map(|record| record.policy().type_name())
    }

    // ── Iteration ──────────────────────────────────────────────

    /// Elements in logical order.
    pub fn iter(&self) -> Iter<'_, I> {
        Iter::new(&self.arena, self.directory.iter())
    }

    /// Elements in logical order, mutably.
    pub fn iter_mut(&mut self) -> IterMut<'_, I> {
        let Self { arena, directory, .. } = self;
        IterMut::new(arena, directory.iter())
    }

    /// Handles of all elements in logical order.
    pub fn handles(&self) -> Handles<'_, I> {
        Handles::new(self.id, self.directory.ids())
    }

    // ── Introspection ──────────────────────────────────────────

    /// This container's identity.
    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// Cumulative storage counters.
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// The configuration the container was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The memory resource arenas are drawn from.
    pub fn resource(&self) -> &R {
        &self.resource
    }
}

impl<I: ?Sized, R: MemoryResource> Drop for MotleyVec<I, R> {
    fn drop(&mut self) {
        self.destroy_all();
        let arena = std::mem::replace(&mut self.arena, Arena::empty());
        // SAFETY: the arena came from `self.resource` and every element in
        // it has been destroyed.
        if unsafe { arena.release(&self.resource) } {
            self.metrics.arena_releases += 1;
        }
    }
}

impl<I: ?Sized, R: MemoryResource> Index<usize> for MotleyVec<I, R> {
    type Output = I;

    fn index(&self, index: usize) -> &I {
        match self.at(index) {
            Ok(element) => element,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<I: ?Sized, R: MemoryResource> IndexMut<usize> for MotleyVec<I, R> {
    fn index_mut(&mut self, index: usize) -> &mut I {
        match self.at_mut(index) {
            Ok(element) => element,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<I: ?Sized, R: MemoryResource> Index<ElementHandle> for MotleyVec<I, R> {
    type Output = I;

    fn index(&self, handle: ElementHandle) -> &I {
        match self.resolve(handle) {
            Ok(element) => element,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<I: ?Sized, R: MemoryResource> IndexMut<ElementHandle> for MotleyVec<I, R> {
    fn index_mut(&mut self, handle: ElementHandle) -> &mut I {
        match self.resolve_mut(handle) {
            Ok(element) => element,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<'a, I: ?Sized, R: MemoryResource> IntoIterator for &'a MotleyVec<I, R> {
    type Item = &'a I;
    type IntoIter = Iter<'a, I>;

    fn into_iter(self) -> Iter<'a, I> {
        self.iter()
    }
}

impl<'a, I: ?Sized, R: MemoryResource> IntoIterator for &'a mut MotleyVec<I, R> {
    type Item = &'a mut I;
    type IntoIter = IterMut<'a, I>;

    fn into_iter(self) -> IterMut<'a, I> {
        self.iter_mut()
    }
}

impl<I: ?Sized, R: MemoryResource> fmt::Debug for MotleyVec<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotleyVec")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("policy", &self.config.policy)
            .field("capacity_bytes", &self.arena.capacity())
            .field("used_bytes", &self.arena.used())
            .field("average_size", &self.average_size())
            .finish()
    }
}
