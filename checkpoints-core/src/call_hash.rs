//! Call hashing: one stable digest per distinct invocation.
//!
//! The digest covers three labeled regions. `NAMED` holds the call's
//! parameter values as `(name, value)` pairs in sorted-name order, with a
//! bound receiver participating as `self` and per-parameter `hash_by`
//! overrides already applied by the caller. `POS` holds the positional
//! tail beyond the named parameters, which is empty for natively compiled
//! signatures. `CAPTURED` holds the `(key, digest)` pairs of the
//! function's capturables in key order, so a captured value changing
//! produces a different call hash without touching the fingerprint.

use crate::capturable::Capturable;
use crate::hashing::StructuralHash;
use std::sync::Arc;

/// Digests one call. `named` feeds the sorted `(name, value)` pairs.
pub fn call_hash(
    named: impl FnOnce(&mut StructuralHash),
    capturables: &[Arc<Capturable>],
) -> String {
    let mut hasher = StructuralHash::new();
    hasher.write_header("NAMED");
    named(&mut hasher);
    hasher.write_header("POS");
    hasher.write_header("CAPTURED");
    for capturable in capturables {
        let (key, digest) = capturable.capture();
        hasher.update(&key);
        hasher.write_str(&digest);
    }
    hasher.ident_digest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashValue;

    fn named_args(pairs: &[(&str, u64)]) -> String {
        let mut sorted: Vec<_> = pairs.to_vec();
        sorted.sort_by_key(|(name, _)| *name);
        call_hash(
            |h| {
                for (name, value) in sorted {
                    h.update(&name);
                    value.hash_value(h);
                }
            },
            &[],
        )
    }

    #[test]
    fn test_digest_shape() {
        let digest = named_args(&[("x", 4)]);
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_args_same_hash() {
        assert_eq!(named_args(&[("a", 1), ("b", 2)]), named_args(&[("b", 2), ("a", 1)]));
    }

    #[test]
    fn test_values_bound_to_names() {
        assert_ne!(named_args(&[("a", 1), ("b", 2)]), named_args(&[("a", 2), ("b", 1)]));
    }

    #[test]
    fn test_empty_call_still_digests() {
        assert_eq!(named_args(&[]).len(), 32);
    }
}
