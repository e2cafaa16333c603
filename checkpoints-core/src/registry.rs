//! Process-wide registry of decorated items.
//!
//! The attribute macros submit one [`Registration`] per decorated item
//! through `inventory`, so every checkpointed function, tracked helper and
//! capturable static is known before `main` runs, regardless of call
//! order. Free symbols recorded at macro time are resolved against this
//! registry when a function identity is first realized; a symbol that
//! resolves to nothing belongs to the standard library or a third-party
//! crate and is skipped.

use crate::checkpointer::Checkpointer;
use crate::hashing::StructuralHash;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// What kind of item a registration describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegKind {
    /// A `#[checkpoint]`-wrapped function: referenced by identity, never
    /// inlined.
    Checkpoint,
    /// A `#[track]`-ed plain function: its body is inlined into dependent
    /// fingerprints and its own references are walked.
    TrackedFn,
    /// A module-level value. `always` captures under any configuration
    /// (`#[capture]` / `#[capture_once]`); otherwise the value only
    /// participates when a dependent's `capture` flag is set. `once`
    /// freezes the digest at first realization.
    Value { always: bool, once: bool },
}

/// One decorated item, registered at link time.
pub struct Registration {
    /// Fully qualified key, `module_path::name`.
    pub key: &'static str,
    pub kind: RegKind,
    /// Canonical body string for functions, empty for values.
    pub body: &'static str,
    /// Free symbols referenced by the body, as recorded at macro time.
    pub symbols: &'static [&'static str],
    /// Configuration accessor for checkpointed functions.
    pub config: Option<fn() -> Checkpointer>,
    /// Value digest writer for capturable statics.
    pub capture: Option<fn(&mut StructuralHash)>,
    /// Source-relative capture key, `<file>/<name>`, empty for functions.
    pub capture_key: &'static str,
}

inventory::collect!(Registration);

impl Registration {
    pub const fn checkpoint(
        key: &'static str,
        body: &'static str,
        symbols: &'static [&'static str],
        config: fn() -> Checkpointer,
    ) -> Self {
        Self {
            key,
            kind: RegKind::Checkpoint,
            body,
            symbols,
            config: Some(config),
            capture: None,
            capture_key: "",
        }
    }

    pub const fn tracked(
        key: &'static str,
        body: &'static str,
        symbols: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            kind: RegKind::TrackedFn,
            body,
            symbols,
            config: None,
            capture: None,
            capture_key: "",
        }
    }

    pub const fn value(
        key: &'static str,
        capture_key: &'static str,
        capture: fn(&mut StructuralHash),
        always: bool,
        once: bool,
    ) -> Self {
        Self {
            key,
            kind: RegKind::Value { always, once },
            body: "",
            symbols: &[],
            config: None,
            capture: Some(capture),
            capture_key,
        }
    }

    /// The module part of the key.
    pub fn module(&self) -> &'static str {
        match self.key.rfind("::") {
            Some(idx) => &self.key[..idx],
            None => "",
        }
    }

    /// The final segment of the key.
    pub fn short_name(&self) -> &'static str {
        self.key.rsplit("::").next().unwrap_or(self.key)
    }
}

struct Index {
    by_key: HashMap<&'static str, &'static Registration>,
    by_short: HashMap<&'static str, Vec<&'static Registration>>,
}

static INDEX: Lazy<Index> = Lazy::new(|| {
    let mut by_key = HashMap::new();
    let mut by_short: HashMap<&'static str, Vec<&'static Registration>> = HashMap::new();
    for reg in inventory::iter::<Registration> {
        by_key.insert(reg.key, reg);
        by_short.entry(reg.short_name()).or_default().push(reg);
    }
    Index { by_key, by_short }
});

/// Looks up a registration by its exact key.
pub fn lookup(key: &str) -> Option<&'static Registration> {
    INDEX.by_key.get(key).copied()
}

/// Looks up a registration by key, panicking when absent. Only used for
/// keys the macros emitted themselves, so absence is a linkage bug.
pub fn expect(key: &str) -> &'static Registration {
    match lookup(key) {
        Some(reg) => reg,
        None => panic!("no registration found for {key}"),
    }
}

/// Resolves a free symbol observed in `from_module` to a registration.
///
/// Resolution mirrors name lookup in source: an exact key wins, then the
/// symbol qualified by `from_module` or any of its ancestors, then a
/// unique key-suffix match (`geo::helper` against `app::geo::helper`), and
/// finally a unique match on the symbol's last segment, which is what
/// makes `Matrix::area` find a method registered under its module path.
/// Ambiguous or unmatched symbols resolve to `None` and are treated as
/// non-user code.
pub fn resolve(symbol: &str, from_module: &str) -> Option<&'static Registration> {
    let index = &*INDEX;
    if let Some(reg) = index.by_key.get(symbol) {
        return Some(reg);
    }

    let mut module = Some(from_module);
    while let Some(m) = module {
        if !m.is_empty() {
            if let Some(reg) = index.by_key.get(format!("{m}::{symbol}").as_str()) {
                return Some(reg);
            }
        }
        module = m.rfind("::").map(|idx| &m[..idx]);
    }

    let suffix = format!("::{symbol}");
    let mut matches = index
        .by_key
        .iter()
        .filter(|(key, _)| key.ends_with(suffix.as_str()))
        .map(|(_, reg)| *reg);
    if let Some(first) = matches.next() {
        if matches.next().is_none() {
            return Some(first);
        }
        return None;
    }

    let short = symbol.rsplit("::").next().unwrap_or(symbol);
    if short != symbol {
        if let Some(candidates) = index.by_short.get(short) {
            if candidates.len() == 1 {
                return Some(candidates[0]);
            }
        }
    }

    None
}
