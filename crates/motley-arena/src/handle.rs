//! Element handles.
//!
//! An [`ElementHandle`] names one element of one container by identity,
//! never by address, so it stays valid across every relocation. It is
//! invalidated only when the element it names is erased or the container
//! is cleared; resolving it afterwards yields
//! [`StoreError::InvalidHandle`].

use std::fmt;

use motley_core::{ContainerId, ElementId, StoreError};

use crate::resource::MemoryResource;
use crate::vec::MotleyVec;

/// Relocation-proof reference to a stored element.
///
/// Handles are plain data: copying one is free and they hold no borrow of
/// the container. Resolution costs one hash lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    /// Container that issued the handle.
    pub(crate) container: ContainerId,
    /// Identity of the element within that container.
    pub(crate) element: ElementId,
}

impl ElementHandle {
    pub(crate) fn new(container: ContainerId, element: ElementId) -> Self {
        Self { container, element }
    }

    /// The container that issued this handle.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// The element identity.
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// The element this handle names, seen through the interface.
    pub fn resolve<'a, I: ?Sized, R: MemoryResource>(
        &self,
        store: &'a MotleyVec<I, R>,
    ) -> Result<&'a I, StoreError> {
        store.resolve(*self)
    }

    /// Mutable view of the element this handle names.
    pub fn resolve_mut<'a, I: ?Sized, R: MemoryResource>(
        &self,
        store: &'a mut MotleyVec<I, R>,
    ) -> Result<&'a mut I, StoreError> {
        store.resolve_mut(*self)
    }

    /// Whether the handle still names a live element of `store`.
    pub fn is_valid<I: ?Sized, R: MemoryResource>(&self, store: &MotleyVec<I, R>) -> bool {
        store.contains(*self)
    }

    /// Current logical index of the element in `store`.
    ///
    /// The index shifts down by one whenever an earlier element is erased.
    pub fn index<I: ?Sized, R: MemoryResource>(&self, store: &MotleyVec<I, R>) -> Option<usize> {
        store.index_of(*self).ok()
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementHandle({}, {})", self.container, self.element)
    }
}
