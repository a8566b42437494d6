//! Runs a [`GuestModule`] against turn states.
//!
//! A session moves `Uninitialized -> Validated -> Faulted`. Validation happens
//! in [`Driver::init`]; the guest's own `init` entry point needs a state, so
//! it runs at the start of the first turn and a failure there faults the
//! session. Within a turn every unit of our team is processed independently,
//! in roster order.

mod context;
mod module;

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

pub use context::{CallContext, DebugHandle};
pub use module::{EntryPoint, GuestFn, GuestModule, INIT_ENTRY, TURN_ENTRY};
use tracing::debug;

use crate::{
    action::Action,
    envelope::{DebugTable, ProgramError, ProgramResult, TurnOutput},
    error::GuestError,
    model::TurnState,
    value::Value,
};

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Uninitialized,
    Validated {
        module: GuestModule,
        init_pending: bool,
    },
    Faulted(ProgramError),
}

#[derive(Debug, Default)]
pub struct Driver {
    phase: Phase,
}

impl Driver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        matches!(self.phase, Phase::Validated { .. })
    }

    /// Whether a turn may run at all.
    ///
    /// # Errors
    /// `NoInitError` before a successful [`Driver::init`], or the fault of a
    /// failed session.
    pub fn ready(&self) -> ProgramResult<()> {
        match &self.phase {
            Phase::Uninitialized => Err(ProgramError::NoInitError),
            Phase::Faulted(err) => Err(err.clone()),
            Phase::Validated { .. } => Ok(()),
        }
    }

    /// Validates the module's entry points and takes ownership of it.
    ///
    /// # Errors
    /// `InitError` wrapping a contract violation when `turn` is missing or
    /// an entry point declares the wrong number of parameters. The session
    /// is faulted afterwards. Calling `init` twice is an `InternalError`.
    pub fn init(&mut self, module: GuestModule) -> ProgramResult<()> {
        if !matches!(self.phase, Phase::Uninitialized) {
            return Err(ProgramError::InternalError);
        }
        match validate(&module) {
            Ok(()) => {
                self.phase = Phase::Validated {
                    module,
                    init_pending: true,
                };
                Ok(())
            }
            Err(err) => self.fault(ProgramError::InitError(err.to_envelope(module.source()))),
        }
    }

    /// Marks the session as failed. Later turns return `err` unchanged.
    ///
    /// # Errors
    /// Always returns `err`.
    pub fn fault<T>(&mut self, err: ProgramError) -> ProgramResult<T> {
        self.phase = Phase::Faulted(err.clone());
        Err(err)
    }

    /// # Errors
    /// `NoInitError` before a successful [`Driver::init`], the fault of a
    /// failed session, or an `InitError` when the guest's `init` fails on
    /// this first turn. Per-unit failures are reported inside the output.
    pub fn run_turn(&mut self, state: TurnState) -> ProgramResult<TurnOutput> {
        let result = match &mut self.phase {
            Phase::Uninitialized => Err(ProgramError::NoInitError),
            Phase::Faulted(err) => Err(err.clone()),
            Phase::Validated {
                module,
                init_pending,
            } => run_turn(module, init_pending, Arc::new(state)),
        };
        match result {
            Err(err @ ProgramError::InitError(_)) => self.fault(err),
            other => other,
        }
    }
}

fn validate(module: &GuestModule) -> Result<(), GuestError> {
    let turn = module.entry(TURN_ENTRY).ok_or_else(|| {
        GuestError::contract(format!("the program must define a `{TURN_ENTRY}` function"))
    })?;
    if !(2..=3).contains(&turn.params()) {
        return Err(GuestError::contract(format!(
            "`{TURN_ENTRY}` must take (state, unit) or (state, unit, debug), but it takes {} \
             parameters",
            turn.params()
        ))
        .located(turn.line()));
    }
    if let Some(init) = module.entry(INIT_ENTRY)
        && init.params() != 1
    {
        return Err(GuestError::contract(format!(
            "`{INIT_ENTRY}` must take (state), but it takes {} parameters",
            init.params()
        ))
        .located(init.line()));
    }
    Ok(())
}

fn run_turn(
    module: &mut GuestModule,
    init_pending: &mut bool,
    state: Arc<TurnState>,
) -> ProgramResult<TurnOutput> {
    let source = module.source().to_owned();
    let mut output = TurnOutput::default();

    if *init_pending {
        // Cleared only once init returns, so a trapped init is retried.
        if let Some(init) = module.entry_mut(INIT_ENTRY) {
            let mut cx = CallContext::new(&mut output.logs, None);
            invoke(init, &mut cx, &[Value::State(Arc::clone(&state))])
                .map_err(|err| ProgramError::InitError(err.to_envelope(&source)))?;
        }
        *init_pending = false;
    }

    let Some(turn) = module.entry_mut(TURN_ENTRY) else {
        return Err(ProgramError::InternalError);
    };
    let wants_debug = turn.params() == 3;

    for id in state.ids_by_team(state.our_team()) {
        let Some(unit) = state.obj_by_id(id.as_str()) else {
            continue;
        };
        let mut table = DebugTable::new();
        let outcome = {
            let handle = wants_debug
                .then(|| DebugHandle::new(&mut table, &mut output.debug_inspections));
            let mut cx = CallContext::new(&mut output.logs, handle);
            let args = [Value::State(Arc::clone(&state)), Value::Obj(unit.clone())];
            let returned = invoke(turn, &mut cx, &args).and_then(into_action);
            match cx.take_violation() {
                Some(violation) => Err(violation.located(turn.line())),
                None => returned,
            }
        };
        if let Err(err) = &outcome {
            debug!(unit = %id, error = %err, "unit turn failed");
        }
        output
            .robot_actions
            .insert(id.clone(), outcome.map_err(|err| err.to_envelope(&source)));
        if !table.is_empty() {
            output.debug_tables.insert(id.clone(), table);
        }
    }
    Ok(output)
}

fn into_action(value: Value) -> Result<Option<Action>, GuestError> {
    match value {
        Value::Action(action) => Ok(Some(action)),
        Value::Null => Ok(None),
        other => Err(GuestError::contract(format!(
            "`{TURN_ENTRY}` must return an Action or null, got {}",
            other.kind()
        ))),
    }
}

/// Calls `entry`, turning a panic into a runtime error.
///
/// Only where panics unwind. On `wasm32-wasip1` they abort, the host sees a
/// trap and the whole turn becomes `InternalError`.
fn invoke(
    entry: &mut EntryPoint,
    cx: &mut CallContext<'_>,
    args: &[Value],
) -> Result<Value, GuestError> {
    let line = entry.line();
    panic::catch_unwind(AssertUnwindSafe(|| entry.call(cx, args)))
        .unwrap_or_else(|payload| Err(GuestError::runtime(panic_message(&*payload)).located(line)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "the program panicked".to_owned())
}
