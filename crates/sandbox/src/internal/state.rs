use wasmtime::{Engine, Linker, Store};
use wasmtime_wasi::{WasiCtxBuilder, p1::WasiP1Ctx};

use super::{capture::CaptureOutput, module::ModuleConfig, resource::MemoryLimiter};

/// Per-session store data: the WASI preview 1 context with captured stdio
/// and the memory limiter.
pub struct SessionState {
    pub limiter: MemoryLimiter,
    wasi: WasiP1Ctx,
    stdout: CaptureOutput,
    stderr: CaptureOutput,
}

impl SessionState {
    /// Linker exposing the WASI preview 1 imports.
    ///
    /// # Errors
    ///
    /// Returns an error if the WASI shims fail to link.
    pub fn new_linker(engine: &Engine) -> anyhow::Result<Linker<Self>> {
        let mut linker = Linker::<Self>::new(engine);
        wasmtime_wasi::p1::add_to_linker_async(&mut linker, |s| &mut s.wasi)?;
        Ok(linker)
    }

    /// A fresh store with no preopened directories, an empty stdin and
    /// in-memory stdout/stderr. Calls yield to the async runtime at every
    /// epoch tick.
    pub fn new_store(engine: &Engine, cfg: &ModuleConfig) -> Store<Self> {
        let stdout = CaptureOutput::new(cfg.capture_capacity);
        let stderr = CaptureOutput::new(cfg.capture_capacity);

        let mut builder = WasiCtxBuilder::new();
        for (k, v) in &cfg.env {
            builder.env(k, v);
        }
        let wasi = builder
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .build_p1();

        let mut store = Store::new(
            engine,
            Self {
                limiter: MemoryLimiter::new(cfg.max_memory),
                wasi,
                stdout,
                stderr,
            },
        );
        store.limiter(|s| &mut s.limiter);
        store.epoch_deadline_async_yield_and_update(1);
        store
    }

    pub const fn stdout(&self) -> &CaptureOutput {
        &self.stdout
    }

    pub const fn stderr(&self) -> &CaptureOutput {
        &self.stderr
    }
}
