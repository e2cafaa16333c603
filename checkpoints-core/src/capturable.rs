//! Captured module-level values.
//!
//! A [`Capturable`] ties a registered static to the identity of the
//! functions that reference it: its current digest is folded into every
//! call hash through the `CAPTURED` region. Capture-once values freeze
//! their digest the first time it is read and never observe later
//! mutation.

use crate::hashing::StructuralHash;
use crate::registry::{RegKind, Registration};
use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use std::sync::Arc;

/// A reference to a module-level value participating in cache identity.
pub struct Capturable {
    key: String,
    capture: fn(&mut StructuralHash),
    once: bool,
    frozen: OnceCell<String>,
}

// One instance per registration, shared by every identity that reaches the
// value, so capture-once digests freeze process-wide.
static INTERNED: Lazy<DashMap<usize, Arc<Capturable>>> = Lazy::new(DashMap::new);

/// The interned capturable for a value registration, or `None` when the
/// registration does not describe a value.
pub fn capturable_for(reg: &'static Registration) -> Option<Arc<Capturable>> {
    let once = match reg.kind {
        RegKind::Value { once, .. } => once,
        _ => return None,
    };
    let capture = reg.capture?;
    let entry = INTERNED
        .entry(reg as *const Registration as usize)
        .or_insert_with(|| {
            Arc::new(Capturable {
                key: reg.capture_key.to_string(),
                capture,
                once,
                frozen: OnceCell::new(),
            })
        });
    Some(entry.value().clone())
}

impl Capturable {
    /// Sort and deduplication key: `<source file>/<name>`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Yields `(key, digest)` for the call-hash `CAPTURED` region.
    pub fn capture(&self) -> (&str, String) {
        (&self.key, self.digest())
    }

    /// Digest of the value as it is now, or as it was at first read for
    /// capture-once values.
    pub fn digest(&self) -> String {
        if self.once {
            self.frozen.get_or_init(|| self.compute()).clone()
        } else {
            self.compute()
        }
    }

    fn compute(&self) -> String {
        let mut hasher = StructuralHash::tolerant();
        (self.capture)(&mut hasher);
        hasher.ident_digest()
    }
}

impl std::fmt::Debug for Capturable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capturable")
            .field("key", &self.key)
            .field("once", &self.once)
            .finish()
    }
}
