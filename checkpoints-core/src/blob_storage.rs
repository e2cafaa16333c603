//! On-disk blob backend, the default.
//!
//! Each call becomes one file at
//! `<root>/<fn_dir>/<fn_hash>/<call_hash[..2]>/<call_hash[2..]>.blob`; the
//! two-character prefix spreads directory fan-out. Sibling `<fn_hash>`
//! directories are entries of prior source versions and are removed by
//! `cleanup(invalidated)`. Stores write to a sibling temp file and rename,
//! so readers never observe a partial blob.

use crate::error::CheckpointError;
use crate::storage::{CleanupStats, FnCtx, Storage};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct BlobStorage;

fn blob_path(ctx: &FnCtx, call_hash: &str) -> PathBuf {
    let split = call_hash.len().min(2);
    let (prefix, rest) = call_hash.split_at(split);
    ctx.version_path().join(prefix).join(format!("{rest}.blob"))
}

fn visit_blobs(
    dir: &Path,
    visit: &mut impl FnMut(&Path, SystemTime) -> Result<(), CheckpointError>,
) -> Result<(), CheckpointError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            visit_blobs(&path, visit)?;
        } else if path.extension().is_some_and(|ext| ext == "blob") {
            let modified = entry.metadata()?.modified()?;
            visit(&path, modified)?;
        }
    }
    Ok(())
}

fn prune_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            prune_empty_dirs(&path);
            // Fails while non-empty, which is exactly the intent.
            let _ = fs::remove_dir(&path);
        }
    }
}

impl Storage for BlobStorage {
    fn store(&self, ctx: &FnCtx, call_hash: &str, data: Vec<u8>) -> Result<(), CheckpointError> {
        let path = blob_path(ctx, call_hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("blob.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn exists(&self, ctx: &FnCtx, call_hash: &str) -> bool {
        blob_path(ctx, call_hash).is_file()
    }

    fn load(&self, ctx: &FnCtx, call_hash: &str) -> Result<Vec<u8>, CheckpointError> {
        Ok(fs::read(blob_path(ctx, call_hash))?)
    }

    fn delete(&self, ctx: &FnCtx, call_hash: &str) -> Result<(), CheckpointError> {
        match fs::remove_file(blob_path(ctx, call_hash)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn checkpoint_date(
        &self,
        ctx: &FnCtx,
        call_hash: &str,
    ) -> Result<SystemTime, CheckpointError> {
        Ok(fs::metadata(blob_path(ctx, call_hash))?.modified()?)
    }

    fn cleanup(
        &self,
        ctx: &FnCtx,
        invalidated: bool,
        expired: bool,
    ) -> Result<CleanupStats, CheckpointError> {
        let mut stats = CleanupStats::default();
        let fn_path = ctx.fn_path();
        if !fn_path.is_dir() {
            return Ok(stats);
        }

        if invalidated {
            for entry in fs::read_dir(&fn_path)? {
                let path = entry?.path();
                let is_current = path.file_name().is_some_and(|name| name == ctx.fn_hash.as_str());
                if path.is_dir() && !is_current {
                    fs::remove_dir_all(&path)?;
                    stats.invalidated += 1;
                }
            }
        }

        if expired && ctx.expiry.is_some() {
            visit_blobs(&fn_path, &mut |path, modified| {
                if ctx.expired_at(modified) {
                    fs::remove_file(path)?;
                    stats.expired += 1;
                }
                Ok(())
            })?;
            prune_empty_dirs(&fn_path);
        }

        Ok(stats)
    }

    fn clear(&self, ctx: &FnCtx) -> Result<(), CheckpointError> {
        match fs::remove_dir_all(ctx.fn_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
