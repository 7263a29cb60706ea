//! Contiguous arena storage for polymorphic objects.
//!
//! A [`MotleyVec<I>`] stores objects of many concrete types, all viewed
//! through one interface `I` (usually `dyn Trait`), packed back to back in
//! a single buffer. All of the workspace's raw memory handling lives in
//! this crate.
//!
//! # Architecture
//!
//! ```text
//! MotleyVec (façade: insert / erase / at / iterate / reserve)
//! ├── Arena            one contiguous buffer, bump placement
//! │   └── MemoryResource (GlobalResource | BoundedResource | user impl)
//! ├── Directory        IndexMap<ElementId, ElementRecord>, logical order
//! │   └── ElementRecord → (offset, ElementPolicy)
//! ├── growth           plan → stage → commit, rollback on clone failure
//! └── StoreMetrics     acquisitions, relocations, rollbacks
//! ```
//!
//! # Relocation capabilities
//!
//! Each element is bound at insertion to one [`Capability`]:
//!
//! - **Move:** bitwise relocation, never fails (`insert`).
//! - **Clone:** fallible duplication through [`TryClone`]; a failure rolls
//!   the whole relocation back (`insert_cloning`).
//! - **Pinned:** never relocated; growth or erase that would move it fails
//!   with [`StoreError::CloningUnsupported`] (`insert_pinned`, or every
//!   element of a [`CloningPolicyKind::NoCloning`] container).
//!
//! # Handles
//!
//! [`ElementHandle`]s name elements by identity, so they survive every
//! relocation and follow index shifts caused by erase.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod directory;
pub mod growth;
pub mod handle;
pub mod iter;
pub mod policy;
mod raw;
pub mod resource;
pub mod vec;

// Public re-exports for the primary API surface.
pub use arena::Arena;
pub use directory::{Directory, ElementRecord};
pub use handle::ElementHandle;
pub use iter::{Handles, Iter, IterMut};
pub use policy::{Capability, ElementPolicy, Upcast};
pub use resource::{BoundedResource, GlobalResource, MemoryResource};
pub use vec::MotleyVec;

pub use motley_core::{
    CloningPolicyKind, ContainerId, ElementId, Operation, RelocationError, StoreConfig, StoreError,
    StoreMetrics, TryClone,
};
