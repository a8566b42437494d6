use std::path::Path;

use tracing::{debug, warn};
use wasmtime::{Config, Engine, Module};

use super::cache::{cache_key, entry_path, write_entry};
use crate::{
    TRACE_TARGET_SANDBOX,
    error::{Error, Result},
};

/// Engine shared by a template and all of its sessions. Epoch interruption
/// lets long guest calls yield back to the async runtime.
pub fn new_engine() -> Result<Engine> {
    let mut cfg = Config::default();
    cfg.async_support(true)
        .epoch_interruption(true)
        .table_lazy_init(false)
        .generate_address_map(false)
        .wasm_backtrace(false)
        .native_unwind_info(false)
        .cranelift_opt_level(wasmtime::OptLevel::Speed);
    Engine::new(&cfg).map_err(Error::Wasm)
}

/// Loads a precompiled artifact from `cache` when one matches, otherwise
/// compiles `wasm` (binary or text) and stores the result there.
pub async fn load_or_compile(engine: &Engine, wasm: &[u8], cache: Option<&Path>) -> Result<Module> {
    let Some(cache_dir) = cache else {
        return compile(engine, wasm).await;
    };

    tokio::fs::create_dir_all(cache_dir).await?;
    let path = entry_path(cache_dir, &cache_key(engine, wasm));

    // SAFETY: cache entries are only written by `Module::serialize` for an
    // engine with the same compatibility hash, which is part of the key. A
    // corrupt or foreign file fails to deserialize and is recompiled.
    match unsafe { Module::deserialize_file(engine, &path) } {
        Ok(module) => {
            debug!(target: TRACE_TARGET_SANDBOX, path = %path.display(), "loaded cached module");
            return Ok(module);
        }
        Err(error) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
            warn!(
                target: TRACE_TARGET_SANDBOX,
                path = %path.display(),
                %error,
                "discarding unusable cached module"
            );
        }
        Err(_) => {}
    }

    let module = compile(engine, wasm).await?;
    let bytes = module.serialize().map_err(Error::Wasm)?;
    write_entry(&path, &bytes).await?;
    Ok(module)
}

async fn compile(engine: &Engine, wasm: &[u8]) -> Result<Module> {
    let engine = engine.clone();
    let wasm = wasm.to_vec();
    tokio::task::spawn_blocking(move || Module::new(&engine, &wasm))
        .await
        .map_err(|e| Error::Wasm(e.into()))?
        .map_err(Error::Wasm)
}
