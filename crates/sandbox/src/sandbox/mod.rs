//! Wasm sandbox lifecycle.
//!
//! Typical flow:
//! 1. Build a [`SandboxTemplate`] with [`SandboxTemplateBuilder`]; this
//!    compiles (or loads from the cache) the guest once.
//! 2. [`SandboxTemplate::instantiate`] a [`Session`] per game. Sessions share
//!    nothing but the compiled code.
//! 3. [`Session::init`] once, then [`Session::run_turn`] for every turn.
//!
//! Guest traps never surface as [`Error`]; they become
//! `ProgramError::InternalError` in the report, with the trap detail logged
//! at `warn`.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use rumble::{InitResult, ProgramError, TurnOutput, TurnResult, TurnState};
use tracing::{Instrument, debug, info_span, warn};
use wasmtime::{Engine, InstancePre, Store};

use crate::{
    TRACE_TARGET_GUEST, TRACE_TARGET_SANDBOX,
    error::{Error, Result},
    internal::{
        abi::GuestExports,
        module::{
            ModuleConfig,
            compile::{load_or_compile, new_engine},
            epoch::{self, EpochRegistration},
        },
        state::SessionState,
    },
    report::{InitReport, Phase, TurnReport},
};

/// Default bound on each of stdout and stderr captured per call.
pub const DEFAULT_CAPTURE_CAPACITY: usize = 1024 * 1024;

/// Builder for a reusable [`SandboxTemplate`].
#[derive(Debug, Default)]
pub struct SandboxTemplateBuilder {
    cache: Option<PathBuf>,
    max_memory: Option<usize>,
    capture_capacity: Option<usize>,
    env: Vec<(String, String)>,
}

impl SandboxTemplateBuilder {
    /// Set the optional compiled-module cache directory.
    ///
    /// When set, precompiled artifacts are stored there and reused across
    /// builds of the same wasm.
    #[must_use]
    pub fn cache(mut self, cache: Option<PathBuf>) -> Self {
        self.cache = cache;
        self
    }

    /// Set the per-session linear memory hard limit in bytes.
    ///
    /// Defaults to unlimited (`usize::MAX`).
    #[must_use]
    pub const fn max_memory(mut self, max_memory: usize) -> Self {
        self.max_memory = Some(max_memory);
        self
    }

    /// Bound the bytes kept from each of stdout and stderr per call.
    #[must_use]
    pub const fn capture_capacity(mut self, capacity: usize) -> Self {
        self.capture_capacity = Some(capacity);
        self
    }

    /// Add an environment variable visible to the guest.
    ///
    /// If the same key is set multiple times, the last value wins.
    #[must_use]
    pub fn env(mut self, k: impl AsRef<str>, v: impl AsRef<str>) -> Self {
        let (k, v) = (k.as_ref(), v.as_ref());
        if let Some(existing) = self.env.iter_mut().find(|(key, _)| key == k) {
            v.clone_into(&mut existing.1);
        } else {
            self.env.push((k.to_owned(), v.to_owned()));
        }
        self
    }

    /// # Errors
    /// Returns an error if the file cannot be read or the template cannot be
    /// built.
    pub async fn build(self, wasm: impl AsRef<Path>) -> Result<SandboxTemplate> {
        let bytes = tokio::fs::read(wasm.as_ref()).await?;
        self.build_from_bytes(&bytes).await
    }

    /// Build from in-memory wasm, binary or text format.
    ///
    /// # Errors
    /// Returns an error if compilation or linking fails.
    pub async fn build_from_bytes(self, wasm: &[u8]) -> Result<SandboxTemplate> {
        let cfg = ModuleConfig {
            cache: self.cache,
            max_memory: self.max_memory.unwrap_or(usize::MAX),
            capture_capacity: self.capture_capacity.unwrap_or(DEFAULT_CAPTURE_CAPACITY),
            env: self.env,
        };
        let span =
            info_span!(target: TRACE_TARGET_SANDBOX, "template.build", wasm_len = wasm.len());
        async move {
            let engine = new_engine()?;
            let module = load_or_compile(&engine, wasm, cfg.cache.as_deref()).await?;
            let linker = SessionState::new_linker(&engine).map_err(Error::Wasm)?;
            let pre = linker.instantiate_pre(&module).map_err(Error::Wasm)?;
            Engine::tls_eager_initialize();
            let ticker = epoch::register(engine.clone())?;
            Ok(SandboxTemplate {
                cfg,
                engine,
                pre,
                ticker,
            })
        }
        .instrument(span)
        .await
    }
}

/// Compiled guest that can instantiate many independent sessions.
pub struct SandboxTemplate {
    cfg: ModuleConfig,
    engine: Engine,
    pre: InstancePre<SessionState>,
    ticker: Arc<EpochRegistration>,
}

impl SandboxTemplate {
    #[must_use]
    pub fn builder() -> SandboxTemplateBuilder {
        SandboxTemplateBuilder::default()
    }

    /// Create a session with its own store, linear memory and stdio.
    ///
    /// # Errors
    /// Returns an error if instantiation fails or a protocol export is
    /// missing.
    pub async fn instantiate(&self) -> Result<Session> {
        let span = info_span!(target: TRACE_TARGET_SANDBOX, "session.instantiate");
        async {
            let mut store = SessionState::new_store(&self.engine, &self.cfg);
            let instance = self
                .pre
                .instantiate_async(&mut store)
                .await
                .map_err(Error::Wasm)?;
            let exports = GuestExports::resolve(&mut store, &instance)?;
            Ok(Session {
                store,
                exports,
                phase: Phase::Fresh,
                _ticker: Arc::clone(&self.ticker),
            })
        }
        .instrument(span)
        .await
    }
}

/// One game's guest instance.
pub struct Session {
    store: Store<SessionState>,
    exports: GuestExports,
    phase: Phase,
    /// Keeps the epoch ticker alive for the lifetime of this session.
    _ticker: Arc<EpochRegistration>,
}

impl Session {
    /// Runs the guest's init with `payload`. Any failure, trap included,
    /// faults the session.
    ///
    /// # Errors
    /// [`Error::AlreadyInitialized`] on a second call.
    pub async fn init(&mut self, payload: &[u8]) -> Result<InitReport> {
        self.phase.check_init()?;
        let span =
            info_span!(target: TRACE_TARGET_SANDBOX, "session.init", payload_len = payload.len());
        async {
            let reply = match self.exports.initialize(&mut self.store).await {
                Ok(()) => self.exports.call_init(&mut self.store, payload).await,
                Err(trap) => Err(trap),
            };
            let result: InitResult = match reply {
                Ok(bytes) => decode_reply(&bytes),
                Err(trap) => {
                    warn!(target: TRACE_TARGET_SANDBOX, error = ?trap, "guest trapped during init");
                    Err(ProgramError::InternalError)
                }
            };
            self.phase = Phase::after_init(&result);

            let stdout = self.store.data().stdout().drain();
            if !stdout.text.is_empty() {
                debug!(
                    target: TRACE_TARGET_GUEST,
                    stdout = %stdout.text,
                    "guest stdout during init"
                );
            }
            Ok(InitReport {
                result,
                diagnostics: self.diagnostics(),
            })
        }
        .instrument(span)
        .await
    }

    /// Runs one turn. A trap fails only this turn.
    ///
    /// # Errors
    /// [`Error::NotInitialized`] or [`Error::Faulted`] when the session
    /// cannot run turns.
    pub async fn run_turn(&mut self, state: &TurnState) -> Result<TurnReport> {
        self.phase.check_turn()?;
        let request = serde_json::to_vec(state)?;
        let span =
            info_span!(target: TRACE_TARGET_SANDBOX, "session.run_turn", turn = state.turn());
        async {
            self.store.data().stdout().clear();
            self.store.data().stderr().clear();

            let reply = self.exports.call_run_turn(&mut self.store, &request).await;
            let result: TurnResult = match reply {
                Ok(bytes) => decode_reply(&bytes),
                Err(trap) => {
                    warn!(target: TRACE_TARGET_SANDBOX, error = ?trap, "guest trapped during turn");
                    Err(ProgramError::InternalError)
                }
            };
            let result = result.map(|output| self.append_stdout(output));
            Ok(TurnReport {
                result,
                diagnostics: self.diagnostics(),
            })
        }
        .instrument(span)
        .await
    }

    /// Largest linear memory size granted to the guest so far.
    #[must_use]
    pub fn peak_memory(&self) -> usize {
        self.store.data().limiter.peak_memory()
    }

    fn append_stdout(&self, mut output: TurnOutput) -> TurnOutput {
        let stdout = self.store.data().stdout().drain();
        if stdout.dropped > 0 {
            warn!(target: TRACE_TARGET_SANDBOX, dropped = stdout.dropped, "guest stdout truncated");
        }
        output
            .logs
            .extend(stdout.text.lines().map(str::to_owned));
        output
    }

    fn diagnostics(&self) -> String {
        let stderr = self.store.data().stderr().drain();
        if !stderr.text.is_empty() {
            debug!(target: TRACE_TARGET_GUEST, stderr = %stderr.text, "guest stderr");
        }
        stderr.text
    }
}

fn decode_reply<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProgramError> {
    serde_json::from_slice::<Result<T, ProgramError>>(bytes)?
}
