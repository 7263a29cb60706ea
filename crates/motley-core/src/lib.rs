//! Core types for the Motley polymorphic arena container.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! identifiers, error taxonomy, configuration and metrics shared by the
//! storage engine in `motley-arena`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod id;
pub mod metrics;
pub mod traits;

pub use config::{CloningPolicyKind, StoreConfig};
pub use error::{Operation, RelocationError, StoreError};
pub use id::{ContainerId, ElementId};
pub use metrics::StoreMetrics;
pub use traits::TryClone;
