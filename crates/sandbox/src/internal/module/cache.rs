use std::{
    collections::hash_map::DefaultHasher,
    fmt::Write as _,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use sha2::{Digest, Sha256};
use wasmtime::Engine;

use crate::error::Result;

const KEY_SCHEMA: &[u8] = b"rumble-module-v1\0";

fn engine_fingerprint(engine: &Engine) -> u64 {
    let mut hasher = DefaultHasher::new();
    engine.precompile_compatibility_hash().hash(&mut hasher);
    hasher.finish()
}

/// Hex SHA-256 over the wasm bytes and everything in the engine that makes
/// a precompiled artifact incompatible.
pub fn cache_key(engine: &Engine, wasm: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(KEY_SCHEMA);
    h.update(Sha256::digest(wasm));
    h.update(engine_fingerprint(engine).to_le_bytes());

    let digest = h.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut key, "{b:02x}");
    }
    key
}

pub fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.cwasm"))
}

/// Writes through a uniquely named temporary file and renames it into
/// place, so readers never observe a partial artifact.
pub async fn write_entry(path: &Path, bytes: &[u8]) -> Result<()> {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("cwasm.tmp-{}-{sequence}", std::process::id()));

    tokio::fs::write(&tmp, bytes).await?;
    match tokio::fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        // Another writer got there first with identical content.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(e.into())
        }
    }
}
