//! Storage-engine counters.
//!
//! [`StoreMetrics`] accumulates over a container's lifetime. It is cheap
//! to read and intended for telemetry and for asserting allocation
//! behaviour in tests.

/// Cumulative counters for one container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    /// Arenas obtained from the memory resource.
    pub arena_acquisitions: u64,
    /// Arenas returned to the memory resource.
    pub arena_releases: u64,
    /// Arena acquisitions made by insert or reserve, the first one
    /// included. Erase rebuilds are not counted.
    pub growth_events: u64,
    /// Bulk relocations abandoned because an element's clone failed.
    pub relocation_rollbacks: u64,
    /// Elements moved or cloned by successful bulk relocations and erase
    /// compactions.
    pub elements_relocated: u64,
    /// Object bytes moved or cloned by those relocations.
    pub bytes_relocated: u64,
    /// Erases that shifted at least one following element.
    pub erase_compactions: u64,
    /// Largest arena held, in bytes.
    pub peak_arena_bytes: usize,
}

impl StoreMetrics {
    /// Arenas currently held (0 or 1 for a live container).
    pub fn arenas_outstanding(&self) -> u64 {
        self.arena_acquisitions - self.arena_releases
    }
}
