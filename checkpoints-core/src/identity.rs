//! Function identity: fingerprints over transitive dependency closures.
//!
//! A [`FunctionIdent`] exists once per checkpointed function and is shared
//! by every call site of that function, so resetting it anywhere is
//! observed everywhere. Its state is realized lazily in two stages:
//!
//! * the **raw identity**: the digest of the function's canonical body
//!   together with the bodies of every tracked function it transitively
//!   references, plus the checkpointed dependencies and capturable values
//!   discovered along the way;
//! * the **composed fingerprint** (`fn_hash`): the digest of the ordered
//!   raw digests of every checkpointed function reachable from this one,
//!   halting below any dependency with a static override, which
//!   contributes its override digest instead of a traversal.
//!
//! Both stages sit behind their own lock and are swapped atomically, so a
//! `reinit` is visible to concurrent callers as a whole.

use crate::capturable::{capturable_for, Capturable};
use crate::hashing::StructuralHash;
use crate::registry::{self, RegKind, Registration};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Output of the dependency walk for a single function.
pub struct RawIdent {
    /// Digest of this function's body and every inlined tracked body.
    pub fn_hash: String,
    /// Checkpointed dependencies in discovery order, deduplicated, not
    /// including the function itself.
    pub depends: Vec<&'static Registration>,
    /// Capturables discovered across this function and its tracked
    /// closure, sorted by key.
    pub capturables: Vec<Arc<Capturable>>,
}

struct Composed {
    fn_hash: String,
    capturables: Vec<Arc<Capturable>>,
}

/// Memoized identity of one checkpointed function.
pub struct FunctionIdent {
    reg_key: &'static str,
    capture: bool,
    static_hash: Option<String>,
    raw: RwLock<Option<Arc<RawIdent>>>,
    composed: RwLock<Option<Arc<Composed>>>,
}

// Identities are interned per registration and leaked: the single shared
// instance is what makes reinit on one handle visible through all of them.
static IDENTS: Lazy<DashMap<usize, &'static FunctionIdent>> = Lazy::new(DashMap::new);

/// The shared identity for a checkpoint registration.
pub fn ident_of(reg: &'static Registration) -> &'static FunctionIdent {
    let entry = IDENTS
        .entry(reg as *const Registration as usize)
        .or_insert_with(|| {
            let config = match reg.config {
                Some(config) => config(),
                None => panic!("registration {} is not a checkpointed function", reg.key),
            };
            Box::leak(Box::new(FunctionIdent {
                reg_key: reg.key,
                capture: config.capture,
                static_hash: config.fn_hash_from.clone(),
                raw: RwLock::new(None),
                composed: RwLock::new(None),
            }))
        });
    *entry.value()
}

impl FunctionIdent {
    pub fn reg_key(&self) -> &'static str {
        self.reg_key
    }

    /// Whether this identity uses a static override instead of dependency
    /// traversal.
    pub fn is_static(&self) -> bool {
        self.static_hash.is_some()
    }

    fn static_digest(&self) -> Option<&str> {
        self.static_hash.as_deref()
    }

    /// The raw identity, realized on first read.
    pub fn raw(&self) -> Arc<RawIdent> {
        if let Some(raw) = self.raw.read().clone() {
            return raw;
        }
        let built = Arc::new(build_raw(registry::expect(self.reg_key), self.capture));
        let mut slot = self.raw.write();
        slot.get_or_insert(built).clone()
    }

    /// The composed fingerprint, 32 hex characters.
    pub fn fn_hash(&self) -> String {
        self.composed().fn_hash.clone()
    }

    /// Capturables across the whole dependency closure, sorted by key.
    pub fn capturables(&self) -> Vec<Arc<Capturable>> {
        self.composed().capturables.clone()
    }

    fn composed(&self) -> Arc<Composed> {
        if let Some(composed) = self.composed.read().clone() {
            return composed;
        }
        let built = Arc::new(self.compose());
        let mut slot = self.composed.write();
        slot.get_or_insert(built).clone()
    }

    fn compose(&self) -> Composed {
        if let Some(digest) = self.static_digest() {
            let mut hasher = StructuralHash::new();
            hasher.write_header("static");
            hasher.write_str(digest);
            return Composed {
                fn_hash: hasher.ident_digest(),
                capturables: Vec::new(),
            };
        }

        let idents = self.deep_idents(false);
        let mut hasher = StructuralHash::new();
        let mut capturables: BTreeMap<String, Arc<Capturable>> = BTreeMap::new();
        for ident in &idents {
            match ident.static_digest() {
                Some(digest) => {
                    hasher.write_header("static");
                    hasher.write_str(digest);
                }
                None => {
                    let raw = ident.raw();
                    hasher.write_str(&raw.fn_hash);
                    for cap in &raw.capturables {
                        capturables
                            .entry(cap.key().to_string())
                            .or_insert_with(|| cap.clone());
                    }
                }
            }
        }
        Composed {
            fn_hash: hasher.ident_digest(),
            capturables: capturables.into_values().collect(),
        }
    }

    /// This function plus every checkpointed function transitively
    /// reachable from it, in discovery order. When `past_static` is false
    /// the subtree below a static identity is not entered; the static
    /// identity itself still appears.
    pub fn deep_idents(&self, past_static: bool) -> Vec<&'static FunctionIdent> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        visit_deep(
            ident_of(registry::expect(self.reg_key)),
            past_static,
            &mut visited,
            &mut out,
        );
        out
    }

    /// The checkpoint registrations of [`deep_idents`](Self::deep_idents).
    pub fn deep_depends(&self, past_static: bool) -> Vec<&'static Registration> {
        self.deep_idents(past_static)
            .into_iter()
            .map(|ident| registry::expect(ident.reg_key))
            .collect()
    }

    /// Discards memoized state; the next read recomputes.
    pub fn reset(&self) {
        *self.composed.write() = None;
        *self.raw.write() = None;
    }

    /// Resets this identity, or every deep identity when `recursive`, and
    /// re-realizes. Returns the fresh fingerprint.
    pub fn reinit(&self, recursive: bool) -> String {
        if recursive {
            let idents = self.deep_idents(true);
            for ident in idents {
                ident.reset();
            }
        } else {
            self.reset();
        }
        self.fn_hash()
    }
}

fn visit_deep(
    ident: &'static FunctionIdent,
    past_static: bool,
    visited: &mut HashSet<usize>,
    out: &mut Vec<&'static FunctionIdent>,
) {
    if !visited.insert(ident as *const FunctionIdent as usize) {
        return;
    }
    out.push(ident);
    if ident.is_static() && !past_static {
        return;
    }
    let raw = ident.raw();
    for dep in raw.depends.iter().copied() {
        visit_deep(ident_of(dep), past_static, visited, out);
    }
}

struct Walker {
    root: &'static Registration,
    capture: bool,
    visited: HashSet<usize>,
    bodies: Vec<&'static Registration>,
    depends: Vec<&'static Registration>,
    capturables: BTreeMap<String, Arc<Capturable>>,
}

impl Walker {
    fn walk(&mut self, reg: &'static Registration) {
        if !self.visited.insert(reg as *const Registration as usize) {
            return;
        }
        self.bodies.push(reg);
        for symbol in reg.symbols.iter().copied() {
            let Some(dep) = registry::resolve(symbol, reg.module()) else {
                continue;
            };
            match dep.kind {
                RegKind::Checkpoint => {
                    let seen = std::ptr::eq(dep, self.root)
                        || self.depends.iter().any(|d| std::ptr::eq(*d, dep));
                    if !seen {
                        self.depends.push(dep);
                    }
                }
                RegKind::TrackedFn => self.walk(dep),
                RegKind::Value { always, once: _ } => {
                    if always || self.capture {
                        if let Some(cap) = capturable_for(dep) {
                            self.capturables
                                .entry(cap.key().to_string())
                                .or_insert(cap);
                        }
                    }
                }
            }
        }
    }
}

fn build_raw(root: &'static Registration, capture: bool) -> RawIdent {
    let mut walker = Walker {
        root,
        capture,
        visited: HashSet::new(),
        bodies: Vec::new(),
        depends: Vec::new(),
        capturables: BTreeMap::new(),
    };
    walker.walk(root);

    let mut hasher = StructuralHash::new();
    for reg in &walker.bodies {
        hasher.write_header(&format!("function:{}", reg.key));
        hasher.write_str(reg.body);
    }
    RawIdent {
        fn_hash: hasher.ident_digest(),
        depends: walker.depends,
        capturables: walker.capturables.into_values().collect(),
    }
}
