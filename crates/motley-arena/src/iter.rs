//! Borrowing iterators over a [`MotleyVec`](crate::MotleyVec).
//!
//! All three walk the directory in logical order. They borrow the
//! container, so inserting or erasing while one is alive does not compile.

#![allow(unsafe_code)]

use std::iter::FusedIterator;
use std::marker::PhantomData;

use indexmap::map::{Keys, Values};
use motley_core::{ContainerId, ElementId};

use crate::arena::Arena;
use crate::directory::ElementRecord;
use crate::handle::ElementHandle;

/// Shared references to every element, in logical order.
pub struct Iter<'a, I: ?Sized> {
    arena: &'a Arena,
    records: Values<'a, ElementId, ElementRecord<I>>,
    _marker: PhantomData<&'a I>,
}

impl<'a, I: ?Sized> Iter<'a, I> {
    pub(crate) fn new(arena: &'a Arena, records: Values<'a, ElementId, ElementRecord<I>>) -> Self {
        Self {
            arena,
            records,
            _marker: PhantomData,
        }
    }

    fn view(&self, record: &'a ElementRecord<I>) -> &'a I {
        // SAFETY: every directory record names a live element of its
        // policy's type in `arena`, and the container is borrowed shared
        // for `'a`.
        unsafe { &*record.policy().view(self.arena.ptr_at(record.offset())) }
    }
}

impl<I: ?Sized> Clone for Iter<'_, I> {
    fn clone(&self) -> Self {
        Self {
            arena: self.arena,
            records: self.records.clone(),
            _marker: PhantomData,
        }
    }
}

impl<'a, I: ?Sized> Iterator for Iter<'a, I> {
    type Item = &'a I;

    fn next(&mut self) -> Option<&'a I> {
        let record = self.records.next()?;
        Some(self.view(record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl<'a, I: ?Sized> DoubleEndedIterator for Iter<'a, I> {
    fn next_back(&mut self) -> Option<&'a I> {
        let record = self.records.next_back()?;
        Some(self.view(record))
    }
}

impl<I: ?Sized> ExactSizeIterator for Iter<'_, I> {}
impl<I: ?Sized> FusedIterator for Iter<'_, I> {}

/// Mutable references to every element, in logical order.
pub struct IterMut<'a, I: ?Sized> {
    arena: &'a Arena,
    records: Values<'a, ElementId, ElementRecord<I>>,
    _marker: PhantomData<&'a mut I>,
}

impl<'a, I: ?Sized> IterMut<'a, I> {
    /// `arena` must come from a container borrowed mutably for `'a`.
    pub(crate) fn new(arena: &'a Arena, records: Values<'a, ElementId, ElementRecord<I>>) -> Self {
        Self {
            arena,
            records,
            _marker: PhantomData,
        }
    }

    fn view(&self, record: &'a ElementRecord<I>) -> &'a mut I {
        // SAFETY: the container is borrowed mutably for `'a`, and each
        // record names a distinct element, visited at most once.
        unsafe { &mut *record.policy().view_mut(self.arena.ptr_at(record.offset())) }
    }
}

impl<'a, I: ?Sized> Iterator for IterMut<'a, I> {
    type Item = &'a mut I;

    fn next(&mut self) -> Option<&'a mut I> {
        let record = self.records.next()?;
        Some(self.view(record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

impl<'a, I: ?Sized> DoubleEndedIterator for IterMut<'a, I> {
    fn next_back(&mut self) -> Option<&'a mut I> {
        let record = self.records.next_back()?;
        Some(self.view(record))
    }
}

impl<I: ?Sized> ExactSizeIterator for IterMut<'_, I> {}
impl<I: ?Sized> FusedIterator for IterMut<'_, I> {}

/// Handles of every element, in logical order.
pub struct Handles<'a, I: ?Sized> {
    container: ContainerId,
    ids: Keys<'a, ElementId, ElementRecord<I>>,
}

impl<'a, I: ?Sized> Handles<'a, I> {
    pub(crate) fn new(container: ContainerId, ids: Keys<'a, ElementId, ElementRecord<I>>) -> Self {
        Self { container, ids }
    }
}

impl<I: ?Sized> Clone for Handles<'_, I> {
    fn clone(&self) -> Self {
        Self {
            container: self.container,
            ids: self.ids.clone(),
        }
    }
}

impl<I: ?Sized> Iterator for Handles<'_, I> {
    type Item = ElementHandle;

    fn next(&mut self) -> Option<ElementHandle> {
        let id = self.ids.next()?;
        Some(ElementHandle::new(self.container, *id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl<I: ?Sized> DoubleEndedIterator for Handles<'_, I> {
    fn next_back(&mut self) -> Option<ElementHandle> {
        let id = self.ids.next_back()?;
        Some(ElementHandle::new(self.container, *id))
    }
}

impl<I: ?Sized> ExactSizeIterator for Handles<'_, I> {}
impl<I: ?Sized> FusedIterator for Handles<'_, I> {}
