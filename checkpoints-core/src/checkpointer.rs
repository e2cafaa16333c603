//! Checkpoint configuration.
//!
//! A [`Checkpointer`] is an immutable record created once per configured
//! decoration. Deriving a variant is a cheap clone plus builder calls:
//!
//! ```
//! use checkpoints_core::{Checkpointer, StorageKind};
//! use std::time::Duration;
//!
//! let base = Checkpointer::new().verbosity(0);
//! let hourly = base.clone().expire_after(Duration::from_secs(3600));
//! let in_memory = base.storage(StorageKind::Memory);
//! # let _ = (hourly, in_memory);
//! ```

use crate::blob_storage::BlobStorage;
use crate::hashing::{digest_of, HashValue};
use crate::memory_storage::MemoryStorage;
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Which backend a configuration persists through.
#[derive(Clone)]
pub enum StorageKind {
    /// Process-global map, nothing touches disk.
    Memory,
    /// One binary blob file per call under the configured directory.
    Blob,
    /// A user-supplied implementation of [`Storage`].
    Custom(Arc<dyn Storage>),
}

impl std::fmt::Debug for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Memory => f.write_str("Memory"),
            StorageKind::Blob => f.write_str("Blob"),
            StorageKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// When a stored entry stops being served and gets recomputed.
#[derive(Clone)]
pub enum Expiry {
    /// Entries older than the duration are stale.
    After(Duration),
    /// Entries for which the predicate holds, given their store time, are
    /// stale.
    Predicate(Arc<dyn Fn(SystemTime) -> bool + Send + Sync>),
}

impl Expiry {
    /// Whether an entry stored at `stored_at` is stale now.
    pub fn is_expired(&self, stored_at: SystemTime) -> bool {
        match self {
            Expiry::After(age) => match SystemTime::now().duration_since(stored_at) {
                Ok(elapsed) => elapsed >= *age,
                Err(_) => false,
            },
            Expiry::Predicate(predicate) => predicate(stored_at),
        }
    }
}

impl std::fmt::Debug for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expiry::After(age) => f.debug_tuple("After").field(age).finish(),
            Expiry::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Immutable checkpoint configuration.
///
/// One instance backs each decoration; method-style builders return
/// derived copies and never mutate in place.
#[derive(Clone, Debug)]
pub struct Checkpointer {
    pub storage: StorageKind,
    pub directory: PathBuf,
    /// Master switch: when false, calls pass straight through.
    pub when: bool,
    /// 0 quiet, 1 log refresh events, 2 also log hits.
    pub verbosity: u8,
    pub expiry: Option<Expiry>,
    /// When true, every referenced tracked value becomes a capturable.
    pub capture: bool,
    /// Pre-hashed static override; dependency traversal halts here.
    pub fn_hash_from: Option<String>,
}

impl Checkpointer {
    pub fn new() -> Self {
        Self {
            storage: StorageKind::Blob,
            directory: default_directory(),
            when: true,
            verbosity: 1,
            expiry: None,
            capture: false,
            fn_hash_from: None,
        }
    }

    pub fn storage(mut self, kind: StorageKind) -> Self {
        self.storage = kind;
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn when(mut self, when: bool) -> Self {
        self.when = when;
        self
    }

    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn expire_after(mut self, age: Duration) -> Self {
        self.expiry = Some(Expiry::After(age));
        self
    }

    pub fn expire_when(
        mut self,
        predicate: impl Fn(SystemTime) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.expiry = Some(Expiry::Predicate(Arc::new(predicate)));
        self
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Pins this function's fingerprint to the digest of `value` instead
    /// of automatic dependency traversal.
    pub fn fn_hash_from<T: HashValue + ?Sized>(mut self, value: &T) -> Self {
        self.fn_hash_from = Some(digest_of(value));
        self
    }

    pub(crate) fn resolve_storage(&self) -> Arc<dyn Storage> {
        match &self.storage {
            StorageKind::Memory => Arc::new(MemoryStorage),
            StorageKind::Blob => Arc::new(BlobStorage),
            StorageKind::Custom(storage) => storage.clone(),
        }
    }
}

impl Default for Checkpointer {
    fn default() -> Self {
        Self::new()
    }
}

/// Default root for persistent checkpoints: `$CHECKPOINTS_DIR`, else the
/// user cache directory, else the system temp directory.
pub fn default_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os("CHECKPOINTS_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("checkpoints")
}
