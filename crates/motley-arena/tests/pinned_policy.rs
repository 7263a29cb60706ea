//! Integration test: pinned elements and the no-cloning container policy.
//!
//! A no-cloning container is bounded by its first arena: anything that
//! would relocate a live element fails with `CloningUnsupported` and leaves
//! size, capacity and handles exactly as they were.

use motley_arena::{Capability, MotleyVec, Operation, StoreConfig, StoreError};
use motley_test_utils::{Blob, Counted, CountingResource, DropCounter, Payload};

fn address(store: &MotleyVec<dyn Payload>, index: usize) -> usize {
    store.at(index).unwrap() as *const dyn Payload as *const u8 as usize
}

#[test]
fn insert_past_reserved_capacity_fails() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::with_config(StoreConfig::pinned()).unwrap();
    store.reserve(4, 16.0).unwrap();
    let capacity = store.capacity();
    assert_eq!(capacity, 4);

    let handles: Vec<_> = (0..capacity as u64)
        .map(|tag| store.insert(Blob::<16>::new(tag)).unwrap())
        .collect();
    let used = store.used_bytes();

    let err = store.insert(Blob::<16>::new(99)).unwrap_err();
    assert_eq!(
        err,
        StoreError::CloningUnsupported {
            operation: Operation::Insert
        }
    );
    assert!(err.is_recoverable());

    assert_eq!(store.len(), capacity);
    assert_eq!(store.capacity(), capacity);
    assert_eq!(store.used_bytes(), used);
    assert_eq!(store.metrics().arena_acquisitions, 1);
    for (tag, handle) in handles.iter().enumerate() {
        assert_eq!(store[*handle].tag(), tag as u64);
    }
}

#[test]
fn first_insert_without_reserve_uses_minimum_arena() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::with_config(StoreConfig::pinned()).unwrap();
    for tag in 0..4 {
        store.insert(Blob::<64>::new(tag)).unwrap();
    }
    assert_eq!(store.capacity(), 4);
    assert!(store.insert(Blob::<64>::new(4)).is_err());
    assert_eq!(store.len(), 4);
}

#[test]
fn every_element_is_pinned() {
    let counter = DropCounter::new();
    let mut store: MotleyVec<dyn Payload> = MotleyVec::with_config(StoreConfig::pinned()).unwrap();
    store.insert(Blob::<8>::new(0)).unwrap();
    store.insert_cloning(Counted::new(1, &counter)).unwrap();
    let description = format!("{store:?}");
    assert!(description.contains("NoCloning"));
    drop(store);
    assert_eq!(counter.live(), 0);
}

#[test]
fn erase_is_refused() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::with_config(StoreConfig::pinned()).unwrap();
    let first = store.insert(Blob::<8>::new(0)).unwrap();
    store.insert(Blob::<8>::new(1)).unwrap();

    let refused = StoreError::CloningUnsupported {
        operation: Operation::Erase,
    };
    assert_eq!(store.erase(first), Err(refused.clone()));
    assert_eq!(store.erase_at(1), Err(refused));
    assert_eq!(store.len(), 2);
    assert!(first.is_valid(&store));
}

#[test]
fn clear_is_allowed_and_reuses_the_arena() {
    let resource = CountingResource::new();
    let mut store: MotleyVec<dyn Payload, _> =
        MotleyVec::with_resource(&resource, StoreConfig::pinned()).unwrap();
    for tag in 0..16 {
        store.insert(Blob::<16>::new(tag)).unwrap();
    }
    assert!(store.insert(Blob::<16>::new(16)).is_err());
    store.clear();
    for tag in 0..16 {
        store.insert(Blob::<16>::new(tag)).unwrap();
    }
    assert_eq!(resource.allocations(), 1);
}

#[test]
fn reserve_after_insert_is_refused() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::with_config(StoreConfig::pinned()).unwrap();
    store.insert(Blob::<8>::new(0)).unwrap();
    assert_eq!(
        store.reserve(1_000, 8.0),
        Err(StoreError::CloningUnsupported {
            operation: Operation::Reserve
        })
    );
    // Within the current arena reserving is a no-op.
    store.reserve(4, 8.0).unwrap();
    assert_eq!(store.capacity_bytes(), StoreConfig::DEFAULT_MIN_ARENA_BYTES);
}

// ── Individually pinned elements ────────────────────────────────────

#[test]
fn pinned_element_never_moves() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::new();
    store.insert_pinned(Blob::<16>::new(0)).unwrap();
    let before = address(&store, 0);

    let mut inserted = 1;
    while store.insert(Blob::<16>::new(inserted)).is_ok() {
        inserted += 1;
    }
    assert_eq!(inserted, 16);
    assert_eq!(address(&store, 0), before);
    assert_eq!(store.metrics().arena_acquisitions, 1);
    assert_eq!(store.metrics().growth_events, 1);
}

#[test]
fn erase_may_not_shift_a_pinned_element() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::new();
    store.insert(Blob::<16>::new(0)).unwrap();
    store.insert_pinned(Blob::<16>::new(1)).unwrap();
    store.insert(Blob::<16>::new(2)).unwrap();

    assert!(store.erase_at(0).is_err());
    let pinned_at = address(&store, 1);

    // Erasing after the pinned element only shifts movable ones.
    store.erase_at(2).unwrap();
    assert_eq!(address(&store, 1), pinned_at);

    // Erasing the pinned element itself shifts nothing pinned.
    store.erase_at(1).unwrap();
    let tags: Vec<u64> = store.iter().map(|p| p.tag()).collect();
    assert_eq!(tags, vec![0]);
}

#[test]
fn pinned_capability_is_reported() {
    let mut store: MotleyVec<dyn Payload> = MotleyVec::new();
    store.insert_pinned(Blob::<4>::new(0)).unwrap();
    let policy = motley_arena::ElementPolicy::<dyn Payload>::pinned::<Blob<4>>();
    assert_eq!(policy.capability(), Capability::Pinned);
    assert!(store.type_name_at(0).unwrap().contains("Blob"));
}
