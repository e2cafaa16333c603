//! # Checkpoints Core
//!
//! Runtime engine for the `checkpoints` memoization library.
//!
//! This crate holds everything the attribute macros generate calls into:
//!
//! - [`StructuralHash`] / [`HashValue`] - deterministic, header-tagged
//!   digests of argument and captured values
//! - [`Registration`] and the process-wide registry the macros populate,
//!   which is how free symbols recorded at compile time resolve to
//!   checkpointed functions, tracked helpers and capturable statics
//! - [`FunctionIdent`] - lazy, shared fingerprints over transitive
//!   dependency closures, resettable through `reinit`
//! - [`CachedFunction`] - the per-call state machine deciding between
//!   serving a stored entry, recomputing, and recovering from corruption
//! - the [`Storage`] contract with the built-in [`MemoryStorage`] and
//!   [`BlobStorage`] backends
//!
//! User code normally depends on the `checkpoints` facade crate instead of
//! this one.

mod awaitable;
mod blob_storage;
mod cached_function;
mod call_hash;
mod capturable;
mod checkpointer;
mod console;
mod error;
mod hashing;
mod identity;
mod memory_storage;
mod registry;
mod storage;

pub use awaitable::AwaitableValue;
pub use blob_storage::BlobStorage;
pub use cached_function::{fn_dir_for, CachedFunction, FnSpec};
pub use call_hash::call_hash;
pub use capturable::{capturable_for, Capturable};
pub use checkpointer::{default_directory, Checkpointer, Expiry, StorageKind};
pub use error::CheckpointError;
pub use hashing::{digest_of, HashValue, StructuralHash};
pub use identity::{ident_of, FunctionIdent, RawIdent};
pub use memory_storage::MemoryStorage;
pub use registry::{lookup, resolve, RegKind, Registration};
pub use storage::{CleanupStats, FnCtx, Storage};
