//! Motley: contiguous, growable storage for heterogeneous objects.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Motley sub-crates. For most users, adding `motley` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use motley::prelude::*;
//!
//! trait Shape {
//!     fn area(&self) -> f64;
//! }
//!
//! struct Circle {
//!     radius: f64,
//! }
//!
//! struct Rect {
//!     w: f64,
//!     h: f64,
//! }
//!
//! impl Shape for Circle {
//!     fn area(&self) -> f64 {
//!         std::f64::consts::PI * self.radius * self.radius
//!     }
//! }
//!
//! impl Shape for Rect {
//!     fn area(&self) -> f64 {
//!         self.w * self.h
//!     }
//! }
//!
//! motley::upcast!(dyn Shape => Circle, Rect);
//!
//! let mut shapes: MotleyVec<dyn Shape> = MotleyVec::new();
//! let unit = shapes.insert(Circle { radius: 1.0 }).unwrap();
//! shapes.insert(Rect { w: 2.0, h: 3.0 }).unwrap();
//! for i in 0..100 {
//!     shapes.insert(Rect { w: i as f64, h: 1.0 }).unwrap();
//! }
//!
//! // The handle survived every growth.
//! assert!((shapes[unit].area() - std::f64::consts::PI).abs() < 1e-12);
//!
//! shapes.erase_at(1).unwrap();
//! assert_eq!(shapes.len(), 101);
//! assert_eq!(shapes.index_of(unit), Ok(0));
//!
//! let total: f64 = shapes.iter().map(|s| s.area()).sum();
//! assert!(total > 4950.0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `motley-arena` | Container, arenas, directory, policies, memory resources |
//! | [`types`] | `motley-core` | IDs, configuration, errors, metrics, `TryClone` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Container and storage engine (`motley-arena`).
///
/// Most users only need [`arena::MotleyVec`] and [`arena::ElementHandle`],
/// which are also available in the [`prelude`].
pub use motley_arena as arena;

/// Core types, configuration and errors (`motley-core`).
pub use motley_core as types;

pub use motley_arena::upcast;

/// Common imports for typical Motley usage.
///
/// ```rust
/// use motley::prelude::*;
/// ```
pub mod prelude {
    // Container
    pub use motley_arena::{ElementHandle, MotleyVec, Upcast};

    // Policies and resources
    pub use motley_arena::{BoundedResource, Capability, GlobalResource, MemoryResource};

    // Configuration and errors
    pub use motley_core::{CloningPolicyKind, StoreConfig, StoreError, TryClone};
}
