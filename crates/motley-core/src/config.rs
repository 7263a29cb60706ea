//! Container configuration parameters.

use crate::error::StoreError;

/// Which relocation archetype a container follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CloningPolicyKind {
    /// Elements carry their own relocatable policy; the arena grows freely.
    #[default]
    Delegate,
    /// Every element is pinned. The container never relocates a live
    /// element, so its capacity is whatever was reserved up front and
    /// erase is unsupported.
    NoCloning,
}

/// Configuration for a container.
///
/// Controls the relocation archetype and arena sizing. Validated when the
/// container is built; immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// Relocation archetype.
    pub policy: CloningPolicyKind,

    /// Factor applied to the current arena capacity on growth.
    ///
    /// Default: 2.0. Must be finite and strictly greater than 1.
    pub growth_factor: f64,

    /// Smallest arena ever acquired, in bytes.
    ///
    /// Default: 256. Must be non-zero.
    pub min_arena_bytes: usize,

    /// Minimum alignment of every arena. Raised automatically when an
    /// element type needs more.
    ///
    /// Default: 16. Must be a power of two.
    pub base_align: usize,
}

impl StoreConfig {
    /// Default growth factor.
    pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

    /// Default minimum arena size in bytes.
    pub const DEFAULT_MIN_ARENA_BYTES: usize = 256;

    /// Default arena alignment.
    pub const DEFAULT_BASE_ALIGN: usize = 16;

    /// Create a config for the given archetype with default sizing.
    pub fn new(policy: CloningPolicyKind) -> Self {
        Self {
            policy,
            growth_factor: Self::DEFAULT_GROWTH_FACTOR,
            min_arena_bytes: Self::DEFAULT_MIN_ARENA_BYTES,
            base_align: Self::DEFAULT_BASE_ALIGN,
        }
    }

    /// Config for a freely growing container.
    pub fn delegate() -> Self {
        Self::new(CloningPolicyKind::Delegate)
    }

    /// Config for a container whose elements never move.
    pub fn pinned() -> Self {
        Self::new(CloningPolicyKind::NoCloning)
    }

    /// Check every parameter.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(StoreError::InvalidConfig {
                reason: format!(
                    "growth_factor must be finite and > 1 (got {})",
                    self.growth_factor
                ),
            });
        }
        if self.min_arena_bytes == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "min_arena_bytes must be non-zero".to_string(),
            });
        }
        if !self.base_align.is_power_of_two() {
            return Err(StoreError::InvalidConfig {
                reason: format!(
                    "base_align must be a power of two (got {})",
                    self.base_align
                ),
            });
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::delegate()
    }
}
