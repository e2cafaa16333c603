//! Per-parameter hash overrides.

use checkpoints::checkpoint;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};

fn floor_of(value: &f64) -> i64 {
    value.floor() as i64
}

fn ignore<T>(_: &T) {}

static BUCKET_RUNS: AtomicUsize = AtomicUsize::new(0);

#[checkpoint(storage = "memory", verbosity = 0, hash_by(value = floor_of))]
fn bucket(value: f64) -> i64 {
    BUCKET_RUNS.fetch_add(1, Ordering::SeqCst);
    value.floor() as i64
}

// `trace` never reaches the hash: the override collapses it.
#[checkpoint(storage = "memory", verbosity = 0, hash_by(trace = ignore))]
fn labeled(x: u64, trace: String) -> u64 {
    let _ = trace;
    x * 2
}

#[test]
#[serial]
fn test_equivalent_arguments_share_an_entry() {
    bucket_delete(1.1).unwrap();
    let before = BUCKET_RUNS.load(Ordering::SeqCst);

    assert_eq!(bucket_call_hash(1.1), bucket_call_hash(1.9));
    assert_eq!(bucket(1.1), 1);
    assert_eq!(bucket(1.9), 1);
    assert_eq!(BUCKET_RUNS.load(Ordering::SeqCst), before + 1);
}

#[test]
#[serial]
fn test_inequivalent_arguments_do_not_collide() {
    assert_ne!(bucket_call_hash(1.1), bucket_call_hash(2.1));
    assert_eq!(bucket(2.1), 2);
}

#[test]
fn test_no_hash_parameters_are_invisible() {
    assert_eq!(
        labeled_call_hash(4, "first".to_string()),
        labeled_call_hash(4, "second".to_string())
    );
    assert_ne!(
        labeled_call_hash(4, "first".to_string()),
        labeled_call_hash(5, "first".to_string())
    );
    assert_eq!(labeled(4, "whatever".into()), 8);
}
