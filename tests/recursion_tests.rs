//! Recursive memoization through the cached wrapper.

use checkpoints::{checkpoint, CheckpointError};

#[checkpoint(storage = "memory", verbosity = 0)]
fn fib(n: u64) -> u64 {
    if n > 1 {
        fib(n - 1) + fib(n - 2)
    } else {
        n
    }
}

fn fib_plain(n: u64) -> u64 {
    if n > 1 {
        fib_plain(n - 1) + fib_plain(n - 2)
    } else {
        n
    }
}

// Recursion bypasses the cache here: only the outermost call is stored.
#[checkpoint(storage = "memory", verbosity = 0)]
fn fib_shallow(n: u64) -> u64 {
    if n > 1 {
        fib_plain(n - 1) + fib_plain(n - 2)
    } else {
        n
    }
}

#[test]
fn test_recursion_through_the_wrapper_stores_every_subcall() {
    assert_eq!(fib(10), 55);
    assert_eq!(fib_get(5).unwrap(), 5);
    assert_eq!(fib_get(10).unwrap(), 55);
    assert!(fib_exists(0));
}

#[test]
fn test_recursion_around_the_wrapper_stores_only_the_root() {
    assert_eq!(fib_shallow(10), 55);
    assert_eq!(fib_shallow_get(10).unwrap(), 55);
    assert!(matches!(
        fib_shallow_get(5),
        Err(CheckpointError::Missing { .. })
    ));
}
