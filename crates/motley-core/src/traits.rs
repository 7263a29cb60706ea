//! Capability traits implemented by element types.

use crate::error::RelocationError;

/// Fallible duplication, used by copy-based relocation.
///
/// Element types inserted with a cloning policy are relocated by
/// duplicating them into the new arena; the original is destroyed only once
/// every element has been duplicated successfully. An `Err` aborts the
/// whole relocation and leaves the container as it was.
pub trait TryClone: Sized {
    /// Produce an independent copy of `self`.
    fn try_clone(&self) -> Result<Self, RelocationError>;
}
