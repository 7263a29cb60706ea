//! Low-level, monomorphized primitives behind every element policy.
//!
//! Each function is instantiated for one concrete element type `T` and
//! stored type-erased as a function pointer in an
//! [`ElementPolicy`](crate::policy::ElementPolicy). Callers uphold the
//! `# Safety` contracts; every address passed in comes from an arena
//! record whose layout is `Layout::new::<T>()`.

#![allow(unsafe_code)]

use std::ptr;

use motley_core::{RelocationError, TryClone};

use crate::policy::Upcast;

/// Bitwise move of a `T` from `src` to `dst`.
///
/// The ranges may overlap (erase compaction shifts elements left within
/// one arena). Afterwards `src` must be treated as uninitialised.
///
/// # Safety
///
/// `src` holds a live `T`; `dst` is valid for writes of `T` and aligned.
pub(crate) unsafe fn move_to<T>(src: *mut u8, dst: *mut u8) {
    // SAFETY: caller contract; `ptr::copy` tolerates overlap.
    unsafe { ptr::copy(src as *const T, dst as *mut T, 1) }
}

/// Duplicate the `T` at `src` into `dst`, leaving `src` live.
///
/// # Safety
///
/// `src` holds a live `T`; `dst` is valid for writes of `T`, aligned, and
/// does not overlap `src`.
pub(crate) unsafe fn clone_to<T: TryClone>(src: *const u8, dst: *mut u8) -> Result<(), RelocationError> {
    // SAFETY: caller contract.
    let copy = unsafe { (*(src as *const T)).try_clone()? };
    // SAFETY: caller contract.
    unsafe { ptr::write(dst as *mut T, copy) };
    Ok(())
}

/// Run `T`'s destructor in place.
///
/// # Safety
///
/// `at` holds a live `T` which is never used again.
pub(crate) unsafe fn drop_at<T>(at: *mut u8) {
    // SAFETY: caller contract.
    unsafe { ptr::drop_in_place(at as *mut T) }
}

/// View the `T` at `at` through the interface `I`.
///
/// # Safety
///
/// `at` holds a live `T` and no `&mut` to it exists.
pub(crate) unsafe fn view<T: Upcast<I>, I: ?Sized>(at: *const u8) -> *const I {
    T::upcast(at as *const T)
}

/// Mutable view of the `T` at `at` through the interface `I`.
///
/// # Safety
///
/// `at` holds a live `T` and no other reference to it exists.
pub(crate) unsafe fn view_mut<T: Upcast<I>, I: ?Sized>(at: *mut u8) -> *mut I {
    T::upcast_mut(at as *mut T)
}
