//! Integration test: failed relocations leave the container untouched.
//!
//! Growth and erase compaction are all-or-nothing. A clone that fails
//! half-way, or a memory resource that refuses the new arena, must leave
//! contents, handles, capacity and resource accounting exactly as they
//! were before the call.

use std::error::Error;

use motley_arena::{BoundedResource, MotleyVec, StoreConfig, StoreError};
use motley_test_utils::{
    Blob, CloneBudget, Counted, CountingResource, DropCounter, FailingResource, FlakyClone, Payload,
};

fn tags<R: motley_arena::MemoryResource>(store: &MotleyVec<dyn Payload, R>) -> Vec<u64> {
    store.iter().map(|p| p.tag()).collect()
}

/// Elements of `T` that fill the default first arena exactly.
fn per_arena<T>() -> usize {
    StoreConfig::DEFAULT_MIN_ARENA_BYTES / std::mem::size_of::<T>()
}

// ── Clone failure during growth ─────────────────────────────────────

#[test]
fn failed_clone_rolls_growth_back() {
    let counter = DropCounter::new();
    let budget = CloneBudget::unlimited();
    let resource = CountingResource::new();
    let mut store: MotleyVec<dyn Payload, _> =
        MotleyVec::with_resource(&resource, StoreConfig::default()).unwrap();

    let n = per_arena::<FlakyClone>();
    let handles: Vec<_> = (0..n as u64)
        .map(|tag| store.insert_cloning(FlakyClone::new(tag, &budget, &counter)).unwrap())
        .collect();
    let capacity_bytes = store.capacity_bytes();
    let used_bytes = store.used_bytes();
    let capacity = store.capacity();

    budget.set(2);
    let err = store
        .insert_cloning(FlakyClone::new(99, &budget, &counter))
        .unwrap_err();

    match &err {
        StoreError::RelocationFailure {
            index, type_name, ..
        } => {
            assert_eq!(*index, 2);
            assert!(type_name.contains("FlakyClone"));
        }
        other => panic!("expected RelocationFailure, got {other:?}"),
    }
    assert!(err.is_recoverable());
    let source = err.source().expect("relocation failures carry their cause");
    assert!(source.to_string().contains("clone budget exhausted"));

    // The rejected value and the two partial clones are gone.
    assert_eq!(counter.live(), n as i64);
    assert_eq!(store.len(), n);
    assert_eq!(tags(&store), (0..n as u64).collect::<Vec<_>>());
    assert_eq!(store.capacity_bytes(), capacity_bytes);
    assert_eq!(store.used_bytes(), used_bytes);
    assert_eq!(store.capacity(), capacity);
    for (tag, handle) in handles.iter().enumerate() {
        assert_eq!(store[*handle].tag(), tag as u64);
    }

    assert_eq!(resource.allocations(), 2);
    assert_eq!(resource.deallocations(), 1);
    assert_eq!(resource.bytes_outstanding(), capacity_bytes);
    assert_eq!(store.metrics().relocation_rollbacks, 1);
    assert_eq!(store.metrics().arenas_outstanding(), 1);
    assert_eq!(store.metrics().growth_events, 1);

    // With clones available again the same insert succeeds.
    budget.set(usize::MAX);
    store
        .insert_cloning(FlakyClone::new(99, &budget, &counter))
        .unwrap();
    assert_eq!(store.len(), n + 1);
    assert_eq!(counter.live(), n as i64 + 1);
    assert_eq!(store.metrics().growth_events, 2);
    for (tag, handle) in handles.iter().enumerate() {
        assert_eq!(store[*handle].tag(), tag as u64);
    }

    drop(store);
    assert_eq!(counter.live(), 0);
    assert_eq!(resource.bytes_outstanding(), 0);
}

#[test]
fn moved_elements_survive_a_rollback() {
    let counter = DropCounter::new();
    let budget = CloneBudget::unlimited();
    let mut store: MotleyVec<dyn Payload> = MotleyVec::new();

    // Alternate movable and clone-relocated elements.
    let mut total = 0;
    while store.used_bytes() + 64 <= StoreConfig::DEFAULT_MIN_ARENA_BYTES {
        store.insert(Counted::new(total, &counter)).unwrap();
        store
            .insert_cloning(FlakyClone::new(total + 1, &budget, &counter))
            .unwrap();
        total += 2;
    }
    let before = tags(&store);

    budget.set(0);
    assert!(store.insert(Blob::<200>::new(0)).is_err());
    assert_eq!(tags(&store), before);
    assert_eq!(counter.live(), total as i64);

    drop(store);
    assert_eq!(counter.live(), 0);
}

// ── Clone failure during erase compaction ───────────────────────────

#[test]
fn failed_erase_compaction_keeps_the_element() {
    let counter = DropCounter::new();
    let budget = CloneBudget::unlimited();
    let mut store: MotleyVec<dyn Payload> = MotleyVec::new();
    let handles: Vec<_> = (0..4)
        .map(|tag| store.insert_cloning(FlakyClone::new(tag, &budget, &counter)).unwrap())
        .collect();

    budget.set(0);
    let err = store.erase(handles[1]).unwrap_err();
    assert!(matches!(err, StoreError::RelocationFailure { index: 0, .. }));
    assert_eq!(tags(&store), vec![0, 1, 2, 3]);
    assert!(handles[1].is_valid(&store));
    assert_eq!(counter.live(), 4);

    budget.set(usize::MAX);
    store.erase(handles[1]).unwrap();
    assert_eq!(tags(&store), vec![0, 2, 3]);
    assert_eq!(counter.live(), 3);
    assert_eq!(store.index_of(handles[3]), Ok(2));
    assert_eq!(store.metrics().erase_compactions, 1);
}

// ── Resource exhaustion ─────────────────────────────────────────────

#[test]
fn bounded_resource_exhaustion_is_reported() {
    let counter = DropCounter::new();
    let bounded = BoundedResource::new(StoreConfig::DEFAULT_MIN_ARENA_BYTES + 100);
    let mut store: MotleyVec<dyn Payload, _> =
        MotleyVec::with_resource(&bounded, StoreConfig::default()).unwrap();

    let n = per_arena::<Counted>();
    for tag in 0..n as u64 {
        store.insert(Counted::new(tag, &counter)).unwrap();
    }
    let err = store.insert(Counted::new(99, &counter)).unwrap_err();
    assert_eq!(
        err,
        StoreError::AllocationFailure {
            requested: 2 * StoreConfig::DEFAULT_MIN_ARENA_BYTES,
            align: StoreConfig::DEFAULT_BASE_ALIGN,
        }
    );
    assert_eq!(counter.live(), n as i64);
    assert_eq!(store.len(), n);
    assert_eq!(bounded.in_use(), StoreConfig::DEFAULT_MIN_ARENA_BYTES);
    assert_eq!(store.metrics().arena_acquisitions, 1);

    drop(store);
    assert_eq!(bounded.in_use(), 0);
    assert_eq!(counter.live(), 0);
}

#[test]
fn failing_resource_refuses_growth() {
    let resource = FailingResource::new(1);
    let mut store: MotleyVec<dyn Payload, _> =
        MotleyVec::with_resource(&resource, StoreConfig::default()).unwrap();
    for tag in 0..4 {
        store.insert(Blob::<64>::new(tag)).unwrap();
    }
    let err = store.insert(Blob::<64>::new(4)).unwrap_err();
    assert!(matches!(err, StoreError::AllocationFailure { .. }));
    assert_eq!(resource.calls(), 2);
    assert_eq!(tags(&store), vec![0, 1, 2, 3]);

    // Reserving more fails the same way and changes nothing.
    assert!(store.reserve(100, 64.0).is_err());
    assert_eq!(store.capacity_bytes(), StoreConfig::DEFAULT_MIN_ARENA_BYTES);
}

#[test]
fn oversized_request_fails_cleanly() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::new();
    store.insert(Blob::<8>::new(1)).unwrap();
    let err = store.reserve(usize::MAX, 1e6).unwrap_err();
    assert!(matches!(err, StoreError::AllocationFailure { .. }));
    assert_eq!(tags(&store), vec![1]);
}
