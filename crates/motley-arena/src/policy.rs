//! Per-element cloning policies.
//!
//! An [`ElementPolicy`] is bound once, at insertion, by the typed insert
//! call that still knows the concrete type. It captures everything the
//! container later needs to destroy, view, and relocate the element without
//! knowing its type again: the layout, a destructor, interface views, and
//! exactly one relocation capability ([`Capability`]).

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::any::TypeId;
use std::fmt;

use motley_core::{RelocationError, TryClone};

use crate::raw;

/// Compile-time proof that `Self` can be viewed as the interface `I`.
///
/// For a trait-object interface the implementation is a plain unsizing
/// coercion of the pointer; the [`upcast!`](crate::upcast) macro writes it.
/// The methods work on raw pointers so that `dyn Trait` keeps its `'static`
/// object bound on both sides of the impl.
///
/// # Safety
///
/// Both functions must return `this` seen through `I`: the same address,
/// the same object. The container relies on this to give stored elements
/// the auto traits (`Send`, `Sync`) of `I`.
pub unsafe trait Upcast<I: ?Sized> {
    /// Shared view through the interface.
    fn upcast(this: *const Self) -> *const I;
    /// Mutable view through the interface.
    fn upcast_mut(this: *mut Self) -> *mut I;
}

/// Implement [`Upcast`] for concrete types that coerce to a trait object.
///
/// ```
/// use motley_arena::upcast;
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// upcast!(dyn Shape => Square);
/// ```
#[macro_export]
macro_rules! upcast {
    ($iface:ty => $($ty:ty),+ $(,)?) => {
        $(
            unsafe impl $crate::Upcast<$iface> for $ty {
                fn upcast(this: *const Self) -> *const $iface {
                    this
                }

                fn upcast_mut(this: *mut Self) -> *mut $iface {
                    this
                }
            }
        )+
    };
}

/// How an element may be relocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Bitwise move; never fails.
    Move,
    /// Fallible duplication through [`TryClone`]; the original is destroyed
    /// once the whole relocation commits.
    Clone,
    /// Never relocated.
    Pinned,
}

#[derive(Clone, Copy)]
enum Relocator {
    Move(unsafe fn(*mut u8, *mut u8)),
    Clone(unsafe fn(*const u8, *mut u8) -> Result<(), RelocationError>),
    Pinned,
}

/// Type-erased capability bundle for one stored element.
pub struct ElementPolicy<I: ?Sized> {
    layout: Layout,
    relocator: Relocator,
    destroy: unsafe fn(*mut u8),
    view: unsafe fn(*const u8) -> *const I,
    view_mut: unsafe fn(*mut u8) -> *mut I,
    type_id: TypeId,
    type_name: &'static str,
}

impl<I: ?Sized> Clone for ElementPolicy<I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I: ?Sized> Copy for ElementPolicy<I> {}

impl<I: ?Sized> ElementPolicy<I> {
    /// Policy relocating `T` by bitwise move.
    pub fn movable<T: Upcast<I> + 'static>() -> Self {
        Self::bind::<T>(Relocator::Move(raw::move_to::<T>))
    }

    /// Policy relocating `T` by [`TryClone`].
    pub fn cloning<T: Upcast<I> + TryClone + 'static>() -> Self {
        Self::bind::<T>(Relocator::Clone(raw::clone_to::<T>))
    }

    /// Policy for a `T` that must never change address.
    pub fn pinned<T: Upcast<I> + 'static>() -> Self {
        Self::bind::<T>(Relocator::Pinned)
    }

    fn bind<T: Upcast<I> + 'static>(relocator: Relocator) -> Self {
        Self {
            layout: Layout::new::<T>(),
            relocator,
            destroy: raw::drop_at::<T>,
            view: raw::view::<T, I>,
            view_mut: raw::view_mut::<T, I>,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The same policy with relocation disabled.
    pub fn into_pinned(self) -> Self {
        Self {
            relocator: Relocator::Pinned,
            ..self
        }
    }

    /// The relocation capability negotiated at bind time.
    pub fn capability(&self) -> Capability {
        match self.relocator {
            Relocator::Move(_) => Capability::Move,
            Relocator::Clone(_) => Capability::Clone,
            Relocator::Pinned => Capability::Pinned,
        }
    }

    /// Whether the element may change address.
    pub fn is_relocatable(&self) -> bool {
        self.capability() != Capability::Pinned
    }

    /// Layout of the concrete type.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Size of the concrete type in bytes.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// `TypeId` of the concrete type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the concrete type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Relocate the element at `src` to `dst`.
    ///
    /// After a move, `src` is logically uninitialised. After a clone, both
    /// addresses hold live objects and the caller decides which one to
    /// destroy.
    ///
    /// # Safety
    ///
    /// `src` holds a live element of this policy's type; `dst` is aligned
    /// and valid for writes of its layout. For a clone the ranges must not
    /// overlap.
    pub(crate) unsafe fn clone_or_move(&self, src: *mut u8, dst: *mut u8) -> Result<(), RelocationError> {
        match self.relocator {
            Relocator::Move(relocate) => {
                // SAFETY: forwarded from the caller's contract.
                unsafe { relocate(src, dst) };
                Ok(())
            }
            // SAFETY: forwarded from the caller's contract.
            Relocator::Clone(duplicate) => unsafe { duplicate(src, dst) },
            Relocator::Pinned => Err(RelocationError::new(format!(
                "{} is pinned and cannot be relocated",
                self.type_name
            ))),
        }
    }

    /// Destroy the element at `at`.
    ///
    /// # Safety
    ///
    /// `at` holds a live element of this policy's type, never used again.
    pub(crate) unsafe fn destroy(&self, at: *mut u8) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { (self.destroy)(at) }
    }

    /// # Safety
    ///
    /// `at` holds a live element of this policy's type.
    pub(crate) unsafe fn view(&self, at: *const u8) -> *const I {
        // SAFETY: forwarded from the caller's contract.
        unsafe { (self.view)(at) }
    }

    /// # Safety
    ///
    /// `at` holds a live element of this policy's type, not otherwise
    /// borrowed.
    pub(crate) unsafe fn view_mut(&self, at: *mut u8) -> *mut I {
        // SAFETY: forwarded from the caller's contract.
        unsafe { (self.view_mut)(at) }
    }
}

impl<I: ?Sized> fmt::Debug for ElementPolicy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementPolicy")
            .field("type_name", &self.type_name)
            .field("capability", &self.capability())
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}
