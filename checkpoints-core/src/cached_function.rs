//! The per-function cache engine.
//!
//! A [`CachedFunction`] is the runtime half of a `#[checkpoint]`
//! decoration: the macro generates one handle per decorated item and
//! routes the wrapper and its companions (`get`, `rerun`, `set`, ...)
//! through it. The handle owns the configuration, the resolved storage
//! backend and the shared [`FunctionIdent`]; the generated code supplies
//! the argument digest and the computation closure per call.

use crate::awaitable::AwaitableValue;
use crate::call_hash;
use crate::checkpointer::Checkpointer;
use crate::console;
use crate::error::CheckpointError;
use crate::hashing::StructuralHash;
use crate::identity::{ident_of, FunctionIdent};
use crate::registry;
use crate::storage::{CleanupStats, FnCtx, Storage};
use colored::Color;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// Macro-supplied description of a decorated item.
pub struct FnSpec {
    /// Registry key, `module_path::name`.
    pub reg_key: &'static str,
    /// Source file of the decoration site, as given by `file!()`.
    pub file: &'static str,
    /// Display name; also the name segment of `fn_dir` after
    /// sanitization.
    pub name: &'static str,
    pub is_async: bool,
}

/// `<source-file-basename>/<sanitized-name>`.
pub fn fn_dir_for(file: &str, name: &str) -> String {
    let base = Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    format!("{base}/{}", sanitize_name(name))
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Handle wrapping one checkpointed function.
pub struct CachedFunction<R> {
    checkpointer: Checkpointer,
    storage: Arc<dyn Storage>,
    ident: &'static FunctionIdent,
    fn_dir: String,
    is_async: bool,
    _result: PhantomData<fn() -> R>,
}

impl<R> CachedFunction<R>
where
    R: Serialize + DeserializeOwned,
{
    pub fn new(checkpointer: Checkpointer, spec: FnSpec) -> Self {
        let storage = checkpointer.resolve_storage();
        let ident = ident_of(registry::expect(spec.reg_key));
        let fn_dir = fn_dir_for(spec.file, spec.name);
        Self {
            checkpointer,
            storage,
            ident,
            fn_dir,
            is_async: spec.is_async,
            _result: PhantomData,
        }
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    /// The shared identity object. All call sites of a decorated item see
    /// this same instance.
    pub fn ident(&self) -> &'static FunctionIdent {
        self.ident
    }

    pub fn fn_dir(&self) -> &str {
        &self.fn_dir
    }

    /// Whether the wrapped callable is async-style; such functions store
    /// their results through [`AwaitableValue`].
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Current composed fingerprint.
    pub fn fn_hash(&self) -> String {
        self.ident.fn_hash()
    }

    /// Resets identity caches and returns the fresh fingerprint.
    pub fn reinit(&self, recursive: bool) -> String {
        self.ident.reinit(recursive)
    }

    /// Digests one call from its sorted named arguments plus the
    /// function's captured values.
    pub fn call_hash_with(&self, named: impl FnOnce(&mut StructuralHash)) -> String {
        call_hash::call_hash(named, &self.ident.capturables())
    }

    /// Runs the call state machine: serve the stored entry, or execute and
    /// store. `rerun` forces execution. A corrupt entry is deleted, logged
    /// and recomputed once.
    pub fn invoke(
        &self,
        call_hash: &str,
        rerun: bool,
        compute: impl FnOnce() -> R,
    ) -> Result<R, CheckpointError> {
        if !self.checkpointer.when {
            return Ok(compute());
        }
        let ctx = self.fn_ctx();
        let call_id = self.call_id(&ctx, call_hash);
        if !self.needs_refresh(&ctx, call_hash, rerun) {
            match self.load_value(&ctx, &call_id, call_hash) {
                Ok(value) => {
                    self.log(2, "REMEMBERED", &call_id, Color::Green);
                    return Ok(value);
                }
                Err(err) if err.is_corruption() => {
                    self.log(1, "CORRUPTED", &call_id, Color::Yellow);
                    self.storage.delete(&ctx, call_hash)?;
                }
                Err(err) => return Err(err),
            }
        }
        self.log(1, "MEMORIZING", &call_id, Color::Blue);
        let result = compute();
        let bytes = self.encode(&result)?;
        self.storage.store(&ctx, call_hash, bytes)?;
        Ok(result)
    }

    /// As [`invoke`](Self::invoke) for an async computation: the future
    /// runs only on the execute path, and its resolved value is stored as
    /// an [`AwaitableValue`]. Retrieval yields an already-resolved future,
    /// which this async fn is.
    pub async fn invoke_async<Fut>(
        &self,
        call_hash: &str,
        rerun: bool,
        compute: impl FnOnce() -> Fut,
    ) -> Result<R, CheckpointError>
    where
        Fut: Future<Output = R>,
    {
        if !self.checkpointer.when {
            return Ok(compute().await);
        }
        let ctx = self.fn_ctx();
        let call_id = self.call_id(&ctx, call_hash);
        if !self.needs_refresh(&ctx, call_hash, rerun) {
            match self.load_value(&ctx, &call_id, call_hash) {
                Ok(value) => {
                    self.log(2, "REMEMBERED", &call_id, Color::Green);
                    return Ok(value);
                }
                Err(err) if err.is_corruption() => {
                    self.log(1, "CORRUPTED", &call_id, Color::Yellow);
                    self.storage.delete(&ctx, call_hash)?;
                }
                Err(err) => return Err(err),
            }
        }
        self.log(1, "MEMORIZING", &call_id, Color::Blue);
        let result = compute().await;
        let bytes = self.encode(&AwaitableValue::new(&result))?;
        self.storage.store(&ctx, call_hash, bytes)?;
        Ok(result)
    }

    /// Load-only access. Fails with [`CheckpointError::Missing`] when no
    /// entry exists and [`CheckpointError::Corrupted`] when one exists but
    /// cannot be read back.
    pub fn get(&self, call_hash: &str) -> Result<R, CheckpointError> {
        let ctx = self.fn_ctx();
        let call_id = self.call_id(&ctx, call_hash);
        if !self.storage.exists(&ctx, call_hash) {
            return Err(CheckpointError::Missing { call_id });
        }
        self.load_value(&ctx, &call_id, call_hash)
    }

    pub fn get_or(&self, default: R, call_hash: &str) -> R {
        self.get(call_hash).unwrap_or(default)
    }

    /// Write-only access: stores `value` as the entry for this call.
    pub fn set(&self, value: &R, call_hash: &str) -> Result<(), CheckpointError> {
        let ctx = self.fn_ctx();
        let bytes = self.encode(value)?;
        self.storage.store(&ctx, call_hash, bytes)
    }

    /// As [`set`](Self::set), wrapping the value the way the async execute
    /// path does.
    pub fn set_awaitable(&self, value: &R, call_hash: &str) -> Result<(), CheckpointError> {
        let ctx = self.fn_ctx();
        let bytes = self.encode(&AwaitableValue::new(value))?;
        self.storage.store(&ctx, call_hash, bytes)
    }

    pub fn exists(&self, call_hash: &str) -> bool {
        let ctx = self.fn_ctx();
        self.storage.exists(&ctx, call_hash)
    }

    pub fn delete(&self, call_hash: &str) -> Result<(), CheckpointError> {
        let ctx = self.fn_ctx();
        self.storage.delete(&ctx, call_hash)
    }

    /// Sweeps stored entries; see [`Storage::cleanup`].
    pub fn cleanup(
        &self,
        invalidated: bool,
        expired: bool,
    ) -> Result<CleanupStats, CheckpointError> {
        let ctx = self.fn_ctx();
        let stats = self.storage.cleanup(&ctx, invalidated, expired)?;
        if self.checkpointer.verbosity >= 1 {
            if invalidated {
                console::log_line(&format!(
                    "Removed {} invalidated version(s) for {}",
                    stats.invalidated, self.fn_dir
                ));
            }
            if expired {
                console::log_line(&format!(
                    "Removed {} expired checkpoint(s) for {}",
                    stats.expired, self.fn_dir
                ));
            }
        }
        Ok(stats)
    }

    /// Removes every stored entry for this function across fingerprints.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        let ctx = self.fn_ctx();
        self.storage.clear(&ctx)
    }

    fn fn_ctx(&self) -> FnCtx {
        FnCtx {
            directory: self.checkpointer.directory.clone(),
            fn_dir: self.fn_dir.clone(),
            fn_hash: self.ident.fn_hash(),
            expiry: self.checkpointer.expiry.clone(),
        }
    }

    fn call_id(&self, ctx: &FnCtx, call_hash: &str) -> String {
        format!("{}/{}", ctx.fn_id(), call_hash)
    }

    fn needs_refresh(&self, ctx: &FnCtx, call_hash: &str, rerun: bool) -> bool {
        rerun
            || !self.storage.exists(ctx, call_hash)
            || ctx.expired(self.storage.as_ref(), call_hash)
    }

    fn load_value(
        &self,
        ctx: &FnCtx,
        call_id: &str,
        call_hash: &str,
    ) -> Result<R, CheckpointError> {
        let bytes = self.storage.load(ctx, call_hash)?;
        self.decode(&bytes, call_id)
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CheckpointError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|err| CheckpointError::Encode(err.to_string()))
    }

    fn decode(&self, bytes: &[u8], call_id: &str) -> Result<R, CheckpointError> {
        match bincode::serde::decode_from_slice::<R, _>(bytes, bincode::config::standard()) {
            Ok((value, _)) => Ok(value),
            Err(_) => Err(CheckpointError::Corrupted {
                call_id: call_id.to_string(),
            }),
        }
    }

    fn log(&self, min_verbosity: u8, title: &str, call_id: &str, color: Color) {
        if self.checkpointer.verbosity >= min_verbosity {
            console::log_event(title, call_id, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpointer::StorageKind;
    use crate::registry::Registration;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn quiet_memory() -> Checkpointer {
        Checkpointer::new()
            .storage(StorageKind::Memory)
            .verbosity(0)
            .directory("/engine-tests")
    }

    inventory::submit! {
        Registration::checkpoint(
            "checkpoints_core::cached_function::tests::double",
            "fn double x + x",
            &[],
            quiet_memory,
        )
    }

    fn handle() -> CachedFunction<u64> {
        CachedFunction::new(
            quiet_memory(),
            FnSpec {
                reg_key: "checkpoints_core::cached_function::tests::double",
                file: "cached_function.rs",
                name: "double",
                is_async: false,
            },
        )
    }

    fn hash_of(handle: &CachedFunction<u64>, x: u64) -> String {
        handle.call_hash_with(|h| {
            h.update("x");
            h.update(&x);
        })
    }

    #[test]
    #[serial]
    fn test_invoke_computes_once_then_serves_stored_value() {
        let handle = handle();
        handle.clear().unwrap();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            8u64
        };
        let hash = hash_of(&handle, 4);
        assert_eq!(handle.invoke(&hash, false, compute).unwrap(), 8);
        assert_eq!(handle.invoke(&hash, false, compute).unwrap(), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.exists(&hash));
    }

    #[test]
    #[serial]
    fn test_rerun_overwrites_the_entry() {
        let handle = handle();
        handle.clear().unwrap();
        let hash = hash_of(&handle, 5);
        assert_eq!(handle.invoke(&hash, false, || 1).unwrap(), 1);
        assert_eq!(handle.invoke(&hash, true, || 2).unwrap(), 2);
        assert_eq!(handle.get(&hash).unwrap(), 2);
    }

    #[test]
    #[serial]
    fn test_get_set_delete_roundtrip() {
        let handle = handle();
        handle.clear().unwrap();
        let hash = hash_of(&handle, 6);
        assert!(matches!(
            handle.get(&hash),
            Err(CheckpointError::Missing { .. })
        ));
        assert_eq!(handle.get_or(99, &hash), 99);
        handle.set(&12, &hash).unwrap();
        assert_eq!(handle.get(&hash).unwrap(), 12);
        handle.delete(&hash).unwrap();
        assert!(!handle.exists(&hash));
        handle.delete(&hash).unwrap();
    }

    #[test]
    #[serial]
    fn test_corrupt_entry_is_recomputed_once() {
        let handle = handle();
        handle.clear().unwrap();
        let hash = hash_of(&handle, 7);
        assert_eq!(handle.invoke(&hash, false, || 14).unwrap(), 14);

        // Truncate the stored bytes underneath the engine.
        let ctx = handle.fn_ctx();
        handle.storage.store(&ctx, &hash, Vec::new()).unwrap();

        let calls = AtomicUsize::new(0);
        let value = handle
            .invoke(&hash, false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                14u64
            })
            .unwrap();
        assert_eq!(value, 14);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.get(&hash).unwrap(), 14);
    }

    #[test]
    #[serial]
    fn test_disabled_configuration_passes_through() {
        let handle = CachedFunction::<u64>::new(
            quiet_memory().when(false),
            FnSpec {
                reg_key: "checkpoints_core::cached_function::tests::double",
                file: "cached_function.rs",
                name: "double",
                is_async: false,
            },
        );
        let hash = hash_of(&handle, 8);
        assert_eq!(handle.invoke(&hash, false, || 16).unwrap(), 16);
        assert!(!handle.exists(&hash));
    }

    #[test]
    #[serial]
    fn test_expired_entries_are_recomputed() {
        let handle = CachedFunction::<u64>::new(
            quiet_memory().expire_after(Duration::from_secs(0)),
            FnSpec {
                reg_key: "checkpoints_core::cached_function::tests::double",
                file: "cached_function.rs",
                name: "double",
                is_async: false,
            },
        );
        handle.clear().unwrap();
        let hash = hash_of(&handle, 9);
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            18u64
        };
        assert_eq!(handle.invoke(&hash, false, compute).unwrap(), 18);
        assert_eq!(handle.invoke(&hash, false, compute).unwrap(), 18);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fn_dir_shape() {
        assert_eq!(
            fn_dir_for("src/geometry/area.rs", "Circle::area"),
            "area.rs/Circle--area"
        );
        assert_eq!(fn_dir_for("lib.rs", "square"), "lib.rs/square");
    }
}
