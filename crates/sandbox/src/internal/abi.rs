//! Host side of the `__rr_*` linear-memory protocol.

use anyhow::Context as _;
use wasmtime::{Instance, Memory, Store, TypedFunc};

use super::state::SessionState;
use crate::error::{Error, Result};

pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_INITIALIZE: &str = "_initialize";
pub const EXPORT_PREALLOC: &str = "__rr_prealloc";
pub const EXPORT_IO_ADDR: &str = "__rr_io_addr";
pub const EXPORT_INIT: &str = "__rr_init";
pub const EXPORT_RUN_TURN: &str = "__rr_run_turn";

/// Typed handles to the guest's protocol exports.
pub struct GuestExports {
    memory: Memory,
    initialize: Option<TypedFunc<(), ()>>,
    prealloc: TypedFunc<u32, u32>,
    io_addr: TypedFunc<(), u32>,
    init: TypedFunc<(), u32>,
    run_turn: TypedFunc<(), u32>,
}

fn typed<P, R>(
    store: &mut Store<SessionState>,
    instance: &Instance,
    name: &'static str,
) -> Result<TypedFunc<P, R>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or(Error::MissingExport(name))?;
    func.typed(&*store)
        .with_context(|| format!("export `{name}` has the wrong signature"))
        .map_err(Error::Wasm)
}

impl GuestExports {
    /// # Errors
    /// [`Error::MissingExport`] for an absent export, [`Error::Wasm`] for one
    /// with the wrong signature.
    pub fn resolve(store: &mut Store<SessionState>, instance: &Instance) -> Result<Self> {
        let memory = instance
            .get_memory(&mut *store, EXPORT_MEMORY)
            .ok_or(Error::MissingExport(EXPORT_MEMORY))?;
        let initialize = if instance.get_func(&mut *store, EXPORT_INITIALIZE).is_some() {
            Some(typed(store, instance, EXPORT_INITIALIZE)?)
        } else {
            None
        };
        Ok(Self {
            memory,
            initialize,
            prealloc: typed(store, instance, EXPORT_PREALLOC)?,
            io_addr: typed(store, instance, EXPORT_IO_ADDR)?,
            init: typed(store, instance, EXPORT_INIT)?,
            run_turn: typed(store, instance, EXPORT_RUN_TURN)?,
        })
    }

    /// Runs the reactor constructor, if the guest has one.
    pub async fn initialize(&self, store: &mut Store<SessionState>) -> anyhow::Result<()> {
        if let Some(initialize) = &self.initialize {
            initialize.call_async(&mut *store, ()).await?;
        }
        Ok(())
    }

    pub async fn call_init(
        &self,
        store: &mut Store<SessionState>,
        payload: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        self.write_request(store, payload).await?;
        let len = self.init.call_async(&mut *store, ()).await?;
        self.read_reply(store, len).await
    }

    pub async fn call_run_turn(
        &self,
        store: &mut Store<SessionState>,
        request: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        self.write_request(store, request).await?;
        let len = self.run_turn.call_async(&mut *store, ()).await?;
        self.read_reply(store, len).await
    }

    async fn write_request(
        &self,
        store: &mut Store<SessionState>,
        bytes: &[u8],
    ) -> anyhow::Result<()> {
        let len = u32::try_from(bytes.len()).context("request does not fit in guest memory")?;
        let addr = self.prealloc.call_async(&mut *store, len).await?;
        self.memory
            .write(&mut *store, addr as usize, bytes)
            .context("guest input buffer lies outside linear memory")
    }

    async fn read_reply(
        &self,
        store: &mut Store<SessionState>,
        len: u32,
    ) -> anyhow::Result<Vec<u8>> {
        let addr = self.io_addr.call_async(&mut *store, ()).await? as usize;
        let reply = addr
            .checked_add(len as usize)
            .and_then(|end| self.memory.data(&*store).get(addr..end))
            .context("guest reply lies outside linear memory")?;
        Ok(reply.to_vec())
    }
}
