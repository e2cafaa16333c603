//! Fingerprints over tracked dependencies and captured values.

use checkpoints::{capture, capture_once, checkpoint, track};
use serial_test::serial;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[track]
fn polynomial(x: u64) -> u64 {
    x * x + 0
}

#[track]
fn through(x: u64) -> u64 {
    polynomial(x)
}

#[checkpoint(storage = "memory", verbosity = 0)]
fn evaluate(x: u64) -> u64 {
    through(x)
}

#[checkpoint(storage = "memory", verbosity = 0, fn_hash_from = "pinned-v1")]
fn frozen_a(x: u64) -> u64 {
    x + 1
}

#[checkpoint(storage = "memory", verbosity = 0, fn_hash_from = "pinned-v1")]
fn frozen_b(x: u64) -> u64 {
    x + 2
}

#[capture(hash_by = load_counter)]
static THRESHOLD: AtomicU64 = AtomicU64::new(10);

#[capture_once(hash_by = load_counter)]
static FROZEN_SEED: AtomicU64 = AtomicU64::new(1);

fn load_counter(value: &AtomicU64) -> u64 {
    value.load(Ordering::SeqCst)
}

static CLIP_RUNS: AtomicUsize = AtomicUsize::new(0);

#[checkpoint(storage = "memory", verbosity = 0)]
fn clip(x: u64) -> u64 {
    CLIP_RUNS.fetch_add(1, Ordering::SeqCst);
    x.min(THRESHOLD.load(Ordering::SeqCst))
}

static SEEDED_RUNS: AtomicUsize = AtomicUsize::new(0);

#[checkpoint(storage = "memory", verbosity = 0)]
fn seeded(x: u64) -> u64 {
    SEEDED_RUNS.fetch_add(1, Ordering::SeqCst);
    x + FROZEN_SEED.load(Ordering::SeqCst)
}

#[test]
fn test_fingerprint_reaches_through_tracked_functions() {
    // `evaluate` only names `through`, but `polynomial` still feeds the
    // fingerprint transitively; the digest of the closure is stable.
    let fingerprint = evaluate_checkpoint().fn_hash();
    assert_eq!(fingerprint.len(), 32);
    assert_eq!(evaluate_checkpoint().reinit(true), fingerprint);
    assert_eq!(evaluate(3), 9);
}

#[test]
fn test_static_override_ignores_the_body() {
    // Different bodies, same pinned tag: identical fingerprints.
    assert_eq!(
        frozen_a_checkpoint().fn_hash(),
        frozen_b_checkpoint().fn_hash()
    );
    assert_eq!(frozen_a(1), 2);
    assert_eq!(frozen_b(1), 3);
}

#[test]
#[serial]
fn test_captured_value_mutation_invalidates_calls() {
    clip_delete(42).unwrap();
    let before = CLIP_RUNS.load(Ordering::SeqCst);

    assert_eq!(clip(42), 10);
    assert_eq!(clip(42), 10);
    assert_eq!(CLIP_RUNS.load(Ordering::SeqCst), before + 1);

    // The captured threshold changes, so the same argument recomputes.
    THRESHOLD.store(20, Ordering::SeqCst);
    assert_eq!(clip(42), 20);
    assert_eq!(CLIP_RUNS.load(Ordering::SeqCst), before + 2);
}

#[test]
#[serial]
fn test_capture_once_is_blind_to_mutation() {
    seeded_delete(5).unwrap();
    let before = SEEDED_RUNS.load(Ordering::SeqCst);

    let first = seeded(5);
    let hash_before = seeded_call_hash(5);

    FROZEN_SEED.store(900, Ordering::SeqCst);
    assert_eq!(seeded_call_hash(5), hash_before);
    assert_eq!(seeded(5), first);
    assert_eq!(SEEDED_RUNS.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_reinit_is_observed_through_every_call_site() {
    let direct = evaluate_checkpoint().reinit(false);
    assert_eq!(evaluate_checkpoint().fn_hash(), direct);
    assert_eq!(evaluate_checkpoint().ident().fn_hash(), direct);
}
