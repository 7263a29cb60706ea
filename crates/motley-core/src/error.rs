//! Error types for the Motley storage engine.
//!
//! One enum, [`StoreError`], covers every failure a container operation can
//! surface. The variants split into two classes (see
//! [`StoreError::is_recoverable`]): resource and capability failures, after
//! which the container is unchanged and still usable, and precondition
//! violations such as stale handles or out-of-range indices.

use std::error::Error;
use std::fmt;

use crate::id::ElementId;

/// The container operation that was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Inserting a new element.
    Insert,
    /// Erasing an element and compacting the elements after it.
    Erase,
    /// Pre-sizing the arena.
    Reserve,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Erase => write!(f, "erase"),
            Self::Reserve => write!(f, "reserve"),
        }
    }
}

/// Failure of a single copy-based relocation.
///
/// Returned by [`TryClone::try_clone`](crate::TryClone::try_clone) and
/// wrapped in [`StoreError::RelocationFailure`] by the growth engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelocationError {
    reason: String,
}

impl RelocationError {
    /// Create a relocation error with a human-readable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason given by the element type.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for RelocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl Error for RelocationError {}

/// Errors from container operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The memory resource could not supply a buffer (or the directory
    /// could not grow). The container is unchanged.
    AllocationFailure {
        /// Number of bytes requested.
        requested: usize,
        /// Alignment requested.
        align: usize,
    },
    /// The operation would relocate an element bound to a pinned policy.
    /// The container is unchanged.
    CloningUnsupported {
        /// The refused operation.
        operation: Operation,
    },
    /// A copy-based relocation failed mid-growth and was rolled back.
    /// The container is unchanged.
    RelocationFailure {
        /// Logical index of the element whose clone failed.
        index: usize,
        /// Concrete type name of that element.
        type_name: &'static str,
        /// The error reported by the element type.
        source: RelocationError,
    },
    /// The handle's element was erased, or the handle belongs to another
    /// container.
    InvalidHandle {
        /// Element the handle referred to.
        element: ElementId,
    },
    /// Indexed access outside `[0, len)`.
    OutOfRange {
        /// The requested index.
        index: usize,
        /// Number of live elements.
        len: usize,
    },
    /// A [`StoreConfig`](crate::StoreConfig) failed validation.
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
}

impl StoreError {
    /// Whether the caller can recover and keep using the container.
    ///
    /// Resource exhaustion and policy-capability failures are recoverable;
    /// stale handles, bad indices and bad configuration are programming
    /// errors.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailure { .. }
                | Self::CloningUnsupported { .. }
                | Self::RelocationFailure { .. }
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure { requested, align } => {
                write!(
                    f,
                    "allocation failed: {requested} bytes with alignment {align}"
                )
            }
            Self::CloningUnsupported { operation } => {
                write!(f, "{operation} requires relocating a pinned element")
            }
            Self::RelocationFailure {
                index,
                type_name,
                source,
            } => {
                write!(
                    f,
                    "relocation of element {index} ({type_name}) failed: {source}"
                )
            }
            Self::InvalidHandle { element } => {
                write!(f, "invalid handle: element {element} is not in this container")
            }
            Self::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RelocationFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}
