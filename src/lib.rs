//! # Checkpoints
//!
//! Persistent function memoization with automatic cache invalidation.
//!
//! Decorate a function with [`#[checkpoint]`](macro@checkpoint) and its
//! results are stored in a pluggable backend; calling it again with the
//! same arguments loads the stored result instead of re-executing. What
//! sets this apart from an ordinary memoizer is that the cache key is
//! derived from the function's *source*: a structural fingerprint of its
//! body, the bodies of every user function it transitively references,
//! and the values of captured module statics. Edit a helper three calls
//! deep and the cache invalidates itself; reformat it or rewrite its
//! comments and nothing is recomputed.
//!
//! ## Features
//!
//! - **Automatic invalidation**: fingerprints cover the transitive
//!   dependency closure of `#[track]`-ed functions and other
//!   checkpointed functions
//! - **Whitespace-blind**: comments, doc comments and formatting never
//!   reach the fingerprint
//! - **Pluggable storage**: on-disk blobs (default), a process-global
//!   in-memory map, or any custom [`Storage`] implementation
//! - **Captured values**: `#[capture]` statics participate in identity;
//!   `#[capture_once]` freezes their digest at first use
//! - **Per-parameter hashing**: `hash_by(param = path)` normalizes
//!   arguments before they reach the call hash
//! - **Async support**: `async fn` results are awaited once, stored
//!   resolved, and replayed as already-resolved futures
//! - **Expiry**: age-based or predicate-based recomputation
//! - **Corruption recovery**: truncated or undecodable entries are
//!   deleted, logged and recomputed exactly once
//!
//! ## Quick start
//!
//! ```
//! use checkpoints::checkpoint;
//!
//! #[checkpoint(storage = "memory", verbosity = 0)]
//! fn square(x: u64) -> u64 {
//!     x * x
//! }
//!
//! assert_eq!(square(4), 16);      // computes and stores
//! assert_eq!(square(4), 16);      // loads the stored result
//! assert_eq!(square_get(4).unwrap(), 16);
//! assert!(square_exists(4));
//! ```
//!
//! ## Generated companions
//!
//! For a function `fn name(args) -> R`, the attribute generates:
//!
//! | item | role |
//! |---|---|
//! | `name(args) -> R` | the cached call itself |
//! | `name_rerun(args) -> R` | force re-execution, overwrite the entry |
//! | `name_get(args) -> Result<R, CheckpointError>` | load-only |
//! | `name_get_or(default, args) -> R` | load-only with fallback |
//! | `name_set(value, args)` | write-only |
//! | `name_exists(args) -> bool` | existence probe |
//! | `name_delete(args)` | remove the entry |
//! | `name_call_hash(args) -> String` | diagnostics |
//! | `name_checkpoint() -> &'static CachedFunction<R>` | the handle: `reinit`, `fn_hash`, `cleanup`, `clear` |
//!
//! Async functions additionally get `name_set_awaitable`, and their
//! wrapper and `name_rerun` are `async`.
//!
//! ## Dependency tracking
//!
//! Mark plain helpers with `#[track]` so they participate in dependent
//! fingerprints; mark module statics with `#[capture]` /
//! `#[capture_once]` so their values do. A function configured with
//! `capture` picks up `#[track]`-ed statics as well. A function
//! configured with `fn_hash_from = "..."` pins its fingerprint to that
//! tag and stops traversal, which is the escape hatch for stable manual
//! versioning.
//!
//! ```
//! use checkpoints::{checkpoint, track};
//!
//! #[track]
//! fn helper(x: u64) -> u64 {
//!     x * x + 0
//! }
//!
//! #[checkpoint(storage = "memory", verbosity = 0)]
//! fn answer(x: u64) -> u64 {
//!     helper(x)
//! }
//!
//! assert_eq!(answer(2), 4);
//! // Editing helper's body (not its comments) would change this:
//! let fingerprint = answer_checkpoint().fn_hash();
//! assert_eq!(fingerprint.len(), 32);
//! ```
//!
//! ## Methods
//!
//! The attribute works on inherent methods taking `&self`; the receiver
//! participates in the call hash as `self` (it must implement
//! [`HashValue`]), and every bound receiver shares one identity, so a
//! `reinit` through any call site is observed by all of them.
//!
//! ## Configuration
//!
//! Inline options: `storage = "memory" | "blob"`, `dir = "..."`,
//! `verbosity = 0|1|2`, `capture`, `expire_after = secs`,
//! `fn_hash_from = "..."`, `name = "..."`, `hash_by(param = path)`.
//! For anything richer, point `with` at a function returning a
//! [`Checkpointer`]:
//!
//! ```
//! use checkpoints::{checkpoint, Checkpointer, StorageKind};
//!
//! fn nightly() -> Checkpointer {
//!     Checkpointer::new()
//!         .storage(StorageKind::Memory)
//!         .verbosity(0)
//!         .expire_after(std::time::Duration::from_secs(24 * 3600))
//! }
//!
//! #[checkpoint(with = nightly)]
//! fn report(day: u32) -> String {
//!     format!("report for day {day}")
//! }
//!
//! assert_eq!(report(7), "report for day 7");
//! ```
//!
//! The default blob directory is `$CHECKPOINTS_DIR`, falling back to the
//! user cache directory under `checkpoints/`.

pub use checkpoints_core::{
    default_directory, digest_of, AwaitableValue, BlobStorage, CachedFunction, CheckpointError,
    Checkpointer, CleanupStats, Expiry, FnCtx, FunctionIdent, HashValue, MemoryStorage,
    StorageKind, Storage, StructuralHash,
};
pub use checkpoints_macros::{capture, capture_once, checkpoint, track};

/// A configuration that captures every referenced tracked value, for use
/// as `#[checkpoint(with = checkpoints::capture_checkpoint)]`.
pub fn capture_checkpoint() -> Checkpointer {
    Checkpointer::new().capture(true)
}

/// A quiet, in-memory configuration, handy in tests.
pub fn memory_checkpoint() -> Checkpointer {
    Checkpointer::new()
        .storage(StorageKind::Memory)
        .verbosity(0)
}

/// A blob configuration rooted in the system temp directory.
pub fn tmp_checkpoint() -> Checkpointer {
    Checkpointer::new()
        .storage(StorageKind::Blob)
        .directory(std::env::temp_dir().join("checkpoints"))
}

// Everything the generated code calls into. Not part of the public API.
#[doc(hidden)]
pub mod __private {
    pub use checkpoints_core::{FnSpec, HashValue, Registration, StructuralHash};
    pub use inventory;
    pub use once_cell::sync::Lazy;

    /// Unwraps an engine result inside a generated wrapper, whose
    /// signature is the user's and cannot carry the error.
    pub fn expect_checkpoint<T>(
        result: Result<T, checkpoints_core::CheckpointError>,
    ) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("checkpoint failure: {err}"),
        }
    }
}
