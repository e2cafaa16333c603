//! Expiry-driven recomputation and cleanup sweeps.

use checkpoints::{checkpoint, Checkpointer, StorageKind};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};

static TICK_RUNS: AtomicUsize = AtomicUsize::new(0);

// Zero-second expiry: every call recomputes.
#[checkpoint(storage = "memory", verbosity = 0, expire_after = 0)]
fn tick(x: u64) -> u64 {
    TICK_RUNS.fetch_add(1, Ordering::SeqCst);
    x + 1
}

fn expire_everything() -> Checkpointer {
    Checkpointer::new()
        .storage(StorageKind::Memory)
        .verbosity(0)
        .expire_when(|_| true)
}

static PRED_RUNS: AtomicUsize = AtomicUsize::new(0);

#[checkpoint(with = expire_everything)]
fn predicated(x: u64) -> u64 {
    PRED_RUNS.fetch_add(1, Ordering::SeqCst);
    x * 10
}

#[test]
#[serial]
fn test_zero_age_expiry_recomputes_every_call() {
    tick_delete(1).unwrap();
    let before = TICK_RUNS.load(Ordering::SeqCst);
    assert_eq!(tick(1), 2);
    assert_eq!(tick(1), 2);
    assert_eq!(TICK_RUNS.load(Ordering::SeqCst), before + 2);
}

#[test]
#[serial]
fn test_predicate_expiry_recomputes_every_call() {
    predicated_delete(3).unwrap();
    let before = PRED_RUNS.load(Ordering::SeqCst);
    assert_eq!(predicated(3), 30);
    assert_eq!(predicated(3), 30);
    assert_eq!(PRED_RUNS.load(Ordering::SeqCst), before + 2);
}

#[test]
#[serial]
fn test_expired_cleanup_sweeps_entries() {
    assert_eq!(tick(9), 10);
    assert!(tick_exists(9));
    let stats = tick_checkpoint().cleanup(false, true).unwrap();
    assert!(stats.expired >= 1);
    assert!(!tick_exists(9));
}
