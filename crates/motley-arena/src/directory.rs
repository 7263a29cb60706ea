//! Element directory: logical index → `(offset, size, policy)`.
//!
//! The [`Directory`] is the metadata table of a container. Every access
//! starts here: handles resolve their [`ElementId`] to a logical index,
//! indices resolve to an [`ElementRecord`], and the record names the byte
//! offset in the current arena plus the policy that knows how to view,
//! move and destroy the object there. It uses `IndexMap` so that logical
//! order, index lookup and identity lookup all come from one structure.

use std::alloc::Layout;

use indexmap::IndexMap;
use motley_core::{ElementId, StoreError};

use crate::arena::align_up;
use crate::policy::{Capability, ElementPolicy};

/// A single entry in the directory.
pub struct ElementRecord<I: ?Sized> {
    /// Byte offset of the object within the current arena.
    pub(crate) offset: usize,
    /// Capability bundle bound at insertion.
    pub(crate) policy: ElementPolicy<I>,
}

impl<I: ?Sized> ElementRecord<I> {
    /// Create a record for an object placed at `offset`.
    pub fn new(offset: usize, policy: ElementPolicy<I>) -> Self {
        Self { offset, policy }
    }

    /// Byte offset within the current arena.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Object size in bytes.
    pub fn size(&self) -> usize {
        self.policy.size()
    }

    /// One past the last byte of the object.
    pub fn end(&self) -> usize {
        self.offset + self.policy.size()
    }

    /// The element's policy.
    pub fn policy(&self) -> &ElementPolicy<I> {
        &self.policy
    }
}

impl<I: ?Sized> std::fmt::Debug for ElementRecord<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRecord")
            .field("offset", &self.offset)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Ordered table of live elements.
///
/// Also maintains the running byte total that drives the average-size
/// statistic, updated on every append and removal.
pub struct Directory<I: ?Sized> {
    entries: IndexMap<ElementId, ElementRecord<I>>,
    /// Sum of the sizes of all live objects.
    total_bytes: usize,
}

impl<I: ?Sized> Directory<I> {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            total_bytes: 0,
        }
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no live elements.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records that fit without reallocating the table.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Make room for `additional` more records.
    ///
    /// Directory growth is amortized (geometric) and independent of arena
    /// growth.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), StoreError> {
        self.entries
            .try_reserve(additional)
            .map_err(|_| StoreError::AllocationFailure {
                requested: additional.saturating_mul(std::mem::size_of::<ElementRecord<I>>()),
                align: std::mem::align_of::<ElementRecord<I>>(),
            })
    }

    /// Append a record at the end of the logical order.
    pub fn append(&mut self, record: ElementRecord<I>) -> ElementId {
        let id = ElementId::next();
        self.total_bytes += record.size();
        self.entries.insert(id, record);
        id
    }

    /// Remove the record at `index`; later indices shift down by one.
    pub fn remove(&mut self, index: usize) -> Option<(ElementId, ElementRecord<I>)> {
        let (id, record) = self.entries.shift_remove_index(index)?;
        self.total_bytes -= record.size();
        Some((id, record))
    }

    /// Record at `index`.
    pub fn get(&self, index: usize) -> Option<&ElementRecord<I>> {
        self.entries.get_index(index).map(|(_, record)| record)
    }

    /// Identity of the element at `index`.
    pub fn id_at(&self, index: usize) -> Option<ElementId> {
        self.entries.get_index(index).map(|(id, _)| *id)
    }

    /// Current logical index of `id`.
    pub fn index_of(&self, id: ElementId) -> Option<usize> {
        self.entries.get_index_of(&id)
    }

    /// Records in logical order.
    pub fn iter(&self) -> indexmap::map::Values<'_, ElementId, ElementRecord<I>> {
        self.entries.values()
    }

    /// Element identities in logical order.
    pub fn ids(&self) -> indexmap::map::Keys<'_, ElementId, ElementRecord<I>> {
        self.entries.keys()
    }

    /// Records in logical order, mutably.
    pub(crate) fn iter_mut(&mut self) -> indexmap::map::ValuesMut<'_, ElementId, ElementRecord<I>> {
        self.entries.values_mut()
    }

    /// Detach every record, leaving the directory empty. The caller
    /// destroys the objects they name.
    pub(crate) fn take(&mut self) -> IndexMap<ElementId, ElementRecord<I>> {
        self.total_bytes = 0;
        std::mem::take(&mut self.entries)
    }

    /// Sum of the sizes of all live objects.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Live object bytes divided by live count; 0 when empty.
    pub fn average_size(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.total_bytes as f64 / self.entries.len() as f64
        }
    }

    /// Largest alignment among live elements (1 when empty).
    pub fn max_align(&self) -> usize {
        self.iter()
            .map(|record| record.policy.layout().align())
            .max()
            .unwrap_or(1)
    }

    /// Index of the first record at or after `from` with the given
    /// capability.
    pub fn find_capability(&self, from: usize, capability: Capability) -> Option<usize> {
        self.iter()
            .enumerate()
            .skip(from)
            .find(|(_, record)| record.policy.capability() == capability)
            .map(|(index, _)| index)
    }

    /// Bytes needed to pack every live record, in order and suitably
    /// aligned, followed by `incoming` if given. `None` on overflow.
    pub fn packed_len(&self, incoming: Option<Layout>) -> Option<usize> {
        let layouts = self
            .iter()
            .map(|record| record.policy.layout())
            .chain(incoming);
        let mut cursor = 0usize;
        for layout in layouts {
            cursor = align_up(cursor, layout.align())?.checked_add(layout.size())?;
        }
        Some(cursor)
    }
}

impl<I: ?Sized> Default for Directory<I> {
    fn default() -> Self {
        Self::new()
    }
}
