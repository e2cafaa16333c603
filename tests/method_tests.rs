//! Checkpointing inherent methods: the receiver is part of the call.

use checkpoints::{checkpoint, HashValue, StructuralHash};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};

static AREA_RUNS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone)]
struct Scaler {
    factor: u64,
}

impl HashValue for Scaler {
    fn hash_value(&self, h: &mut StructuralHash) {
        h.write_header("instance:Scaler");
        self.factor.hash_value(h);
    }
}

impl Scaler {
    #[checkpoint(storage = "memory", verbosity = 0, name = "Scaler::apply")]
    fn apply(&self, x: u64) -> u64 {
        AREA_RUNS.fetch_add(1, Ordering::SeqCst);
        self.factor * x
    }
}

#[test]
#[serial]
fn test_receiver_participates_in_the_call_hash() {
    let doubler = Scaler { factor: 2 };
    let tripler = Scaler { factor: 3 };
    doubler.apply_delete(10).unwrap();
    tripler.apply_delete(10).unwrap();
    let before = AREA_RUNS.load(Ordering::SeqCst);

    assert_eq!(doubler.apply(10), 20);
    assert_eq!(tripler.apply(10), 30);
    assert_eq!(doubler.apply(10), 20);
    assert_eq!(AREA_RUNS.load(Ordering::SeqCst), before + 2);
    assert_ne!(doubler.apply_call_hash(10), tripler.apply_call_hash(10));
}

#[test]
#[serial]
fn test_bound_and_unbound_forms_agree() {
    let scaler = Scaler { factor: 5 };
    scaler.apply_delete(4).unwrap();

    assert_eq!(scaler.apply(4), 20);
    assert_eq!(Scaler::apply(&scaler, 4), 20);
    assert_eq!(scaler.apply_get(4).unwrap(), 20);
    assert_eq!(Scaler::apply_get(&scaler, 4).unwrap(), 20);
}

#[test]
fn test_every_receiver_shares_one_identity() {
    let a = Scaler { factor: 1 };
    let b = Scaler { factor: 9 };
    let _ = (&a, &b);

    let handle = Scaler::apply_checkpoint();
    let fingerprint = handle.fn_hash();
    assert_eq!(handle.reinit(true), fingerprint);
    assert!(std::ptr::eq(handle.ident(), Scaler::apply_checkpoint().ident()));
    assert_eq!(handle.fn_dir(), "method_tests.rs/Scaler--apply");
}
