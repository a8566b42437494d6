use std::{
    io,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use wasmtime::Engine;

const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Engines whose epoch is advanced by the ticker thread.
static ENGINES: Mutex<Vec<(u64, Engine)>> = parking_lot::const_mutex(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Keeps one engine ticking until dropped.
pub struct EpochRegistration {
    id: u64,
}

impl Drop for EpochRegistration {
    fn drop(&mut self) {
        ENGINES.lock().retain(|(id, _)| *id != self.id);
    }
}

fn tick_forever() {
    // A plain thread keeps ticks flowing even when the async runtime is a
    // single busy thread.
    loop {
        thread::park_timeout(EPOCH_TICK);
        let engines: Vec<Engine> = ENGINES.lock().iter().map(|(_, e)| e.clone()).collect();
        for engine in engines {
            engine.increment_epoch();
        }
    }
}

fn ensure_ticker() -> io::Result<()> {
    static TICKER: OnceLock<Result<(), (io::ErrorKind, String)>> = OnceLock::new();

    TICKER
        .get_or_init(|| {
            thread::Builder::new()
                .name("rumble-epoch-ticker".to_owned())
                .spawn(tick_forever)
                .map(drop)
                .map_err(|e| (e.kind(), e.to_string()))
        })
        .clone()
        .map_err(|(kind, message)| io::Error::new(kind, message))
}

/// Starts advancing `engine`'s epoch, spawning the shared ticker thread on
/// first use.
pub fn register(engine: Engine) -> io::Result<Arc<EpochRegistration>> {
    ensure_ticker()?;
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    ENGINES.lock().push((id, engine));
    Ok(Arc::new(EpochRegistration { id }))
}
