use kernel_sync::SyncOnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn empty_until_set() {
    let cell = SyncOnceCell::<u32>::new();
    assert!(cell.get().is_none());
    assert!(!cell.is_initialized());

    assert_eq!(cell.set(5), Ok(()));
    assert_eq!(cell.get(), Some(&5));
}

#[test]
fn second_set_hands_the_value_back() {
    let cell = SyncOnceCell::new();
    cell.set("first").unwrap();
    assert_eq!(cell.set("second"), Err("second"));
    assert_eq!(cell.get(), Some(&"first"));
}

#[test]
fn get_or_init_runs_initializer_once() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    static CELL: SyncOnceCell<u64> = SyncOnceCell::new();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                *CELL.get_or_init(|| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                    99
                })
            })
        })
        .collect();

    for h in handles {
        assert_eq!(h.join().unwrap(), 99);
    }
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn set_after_get_or_init_fails() {
    let cell = SyncOnceCell::new();
    assert_eq!(*cell.get_or_init(|| 1u8), 1);
    assert_eq!(cell.set(2), Err(2));
}

#[test]
fn stored_value_is_dropped() {
    let tracked = Arc::new(());
    {
        let cell = SyncOnceCell::new();
        cell.set(Arc::clone(&tracked)).unwrap();
        assert_eq!(Arc::strong_count(&tracked), 2);
    }
    assert_eq!(Arc::strong_count(&tracked), 1);
}
