//! The storage contract.
//!
//! A backend persists opaque byte blobs keyed by call hash; the engine
//! owns value encoding. Backends stay stateless: every operation receives
//! a [`FnCtx`] describing the function whose entries are being touched,
//! including its current fingerprint, so one backend instance serves any
//! number of functions and fingerprint versions.

use crate::checkpointer::Expiry;
use crate::error::CheckpointError;
use std::path::PathBuf;
use std::time::SystemTime;

/// Per-function context handed to every storage operation.
#[derive(Clone, Debug)]
pub struct FnCtx {
    /// Root directory for persistent backends.
    pub directory: PathBuf,
    /// `<source-file-basename>/<sanitized-name>`.
    pub fn_dir: String,
    /// Current composed fingerprint, 32 hex characters.
    pub fn_hash: String,
    pub expiry: Option<Expiry>,
}

impl FnCtx {
    /// `fn_dir/fn_hash`, the version-qualified function id.
    pub fn fn_id(&self) -> String {
        format!("{}/{}", self.fn_dir, self.fn_hash)
    }

    /// Directory holding every fingerprint version of this function.
    pub fn fn_path(&self) -> PathBuf {
        self.directory.join(&self.fn_dir)
    }

    /// Directory holding entries for the current fingerprint.
    pub fn version_path(&self) -> PathBuf {
        self.fn_path().join(&self.fn_hash)
    }

    /// Whether an entry stored at `stored_at` is stale under this
    /// configuration.
    pub fn expired_at(&self, stored_at: SystemTime) -> bool {
        match &self.expiry {
            Some(expiry) => expiry.is_expired(stored_at),
            None => false,
        }
    }

    /// Whether the entry for `call_hash` is stale. `false` without an
    /// expiry rule, and `false` when the store date cannot be read; the
    /// load path deals with unreadable entries.
    pub fn expired(&self, storage: &dyn Storage, call_hash: &str) -> bool {
        if self.expiry.is_none() {
            return false;
        }
        match storage.checkpoint_date(self, call_hash) {
            Ok(stored_at) => self.expired_at(stored_at),
            Err(_) => false,
        }
    }
}

/// Counts reported by a cleanup sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Fingerprint versions removed because they are no longer current.
    pub invalidated: usize,
    /// Entries removed because their store date satisfied the expiry rule.
    pub expired: usize,
}

/// A checkpoint backend.
///
/// Reads must be idempotent: a backend that streams destructively has to
/// materialize inside `load`. Replacement must be atomic; backends that
/// cannot overwrite atomically write to a sibling and rename.
pub trait Storage: Send + Sync {
    /// Persists an entry, overwriting any prior one.
    fn store(&self, ctx: &FnCtx, call_hash: &str, data: Vec<u8>) -> Result<(), CheckpointError>;

    /// Whether a non-corrupt entry is likely present. May be optimistic;
    /// `load` is the authority.
    fn exists(&self, ctx: &FnCtx, call_hash: &str) -> bool;

    fn load(&self, ctx: &FnCtx, call_hash: &str) -> Result<Vec<u8>, CheckpointError>;

    /// Removes an entry. Removing an absent entry is not an error.
    fn delete(&self, ctx: &FnCtx, call_hash: &str) -> Result<(), CheckpointError>;

    /// When the entry was last stored.
    fn checkpoint_date(&self, ctx: &FnCtx, call_hash: &str)
        -> Result<SystemTime, CheckpointError>;

    /// Sweeps this function's entries: with `invalidated`, artifacts of
    /// prior fingerprints go; with `expired`, stale entries of the current
    /// configuration go.
    fn cleanup(
        &self,
        ctx: &FnCtx,
        invalidated: bool,
        expired: bool,
    ) -> Result<CleanupStats, CheckpointError>;

    /// Removes every entry for this function across all fingerprints.
    fn clear(&self, ctx: &FnCtx) -> Result<(), CheckpointError>;
}
