//! In-memory backend.
//!
//! Entries live in a process-global map shared by every handle, keyed by
//! the function's version directory, so the path layout matches the blob
//! backend without touching disk. The outer map sits behind a
//! `parking_lot::RwLock`; operations are point mutations.

use crate::error::CheckpointError;
use crate::storage::{CleanupStats, FnCtx, Storage};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

type CallMap = HashMap<String, (SystemTime, Arc<Vec<u8>>)>;

static ITEM_MAP: Lazy<RwLock<HashMap<PathBuf, CallMap>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub struct MemoryStorage;

fn missing(ctx: &FnCtx, call_hash: &str) -> CheckpointError {
    CheckpointError::Missing {
        call_id: format!("{}/{}", ctx.fn_id(), call_hash),
    }
}

impl Storage for MemoryStorage {
    fn store(&self, ctx: &FnCtx, call_hash: &str, data: Vec<u8>) -> Result<(), CheckpointError> {
        ITEM_MAP
            .write()
            .entry(ctx.version_path())
            .or_default()
            .insert(call_hash.to_string(), (SystemTime::now(), Arc::new(data)));
        Ok(())
    }

    fn exists(&self, ctx: &FnCtx, call_hash: &str) -> bool {
        ITEM_MAP
            .read()
            .get(&ctx.version_path())
            .is_some_and(|calls| calls.contains_key(call_hash))
    }

    fn load(&self, ctx: &FnCtx, call_hash: &str) -> Result<Vec<u8>, CheckpointError> {
        ITEM_MAP
            .read()
            .get(&ctx.version_path())
            .and_then(|calls| calls.get(call_hash))
            .map(|(_, data)| data.as_ref().clone())
            .ok_or_else(|| missing(ctx, call_hash))
    }

    fn delete(&self, ctx: &FnCtx, call_hash: &str) -> Result<(), CheckpointError> {
        if let Some(calls) = ITEM_MAP.write().get_mut(&ctx.version_path()) {
            calls.remove(call_hash);
        }
        Ok(())
    }

    fn checkpoint_date(
        &self,
        ctx: &FnCtx,
        call_hash: &str,
    ) -> Result<SystemTime, CheckpointError> {
        ITEM_MAP
            .read()
            .get(&ctx.version_path())
            .and_then(|calls| calls.get(call_hash))
            .map(|(stored_at, _)| *stored_at)
            .ok_or_else(|| missing(ctx, call_hash))
    }

    fn cleanup(
        &self,
        ctx: &FnCtx,
        invalidated: bool,
        expired: bool,
    ) -> Result<CleanupStats, CheckpointError> {
        let mut stats = CleanupStats::default();
        let current = ctx.version_path();
        let fn_path = ctx.fn_path();
        let mut map = ITEM_MAP.write();

        if invalidated {
            let stale: Vec<PathBuf> = map
                .keys()
                .filter(|key| key.parent() == Some(fn_path.as_path()) && **key != current)
                .cloned()
                .collect();
            for key in stale {
                map.remove(&key);
                stats.invalidated += 1;
            }
        }

        if expired && ctx.expiry.is_some() {
            for (key, calls) in map.iter_mut() {
                if key.parent() != Some(fn_path.as_path()) {
                    continue;
                }
                let stale: Vec<String> = calls
                    .iter()
                    .filter(|(_, (stored_at, _))| ctx.expired_at(*stored_at))
                    .map(|(call_hash, _)| call_hash.clone())
                    .collect();
                for call_hash in stale {
                    calls.remove(&call_hash);
                    stats.expired += 1;
                }
            }
        }

        Ok(stats)
    }

    fn clear(&self, ctx: &FnCtx) -> Result<(), CheckpointError> {
        let fn_path = ctx.fn_path();
        ITEM_MAP
            .write()
            .retain(|key, _| key.parent() != Some(fn_path.as_path()));
        Ok(())
    }
}
