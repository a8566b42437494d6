use std::{collections::BTreeMap, fmt};

use super::context::CallContext;
use crate::{
    action::Action,
    error::GuestError,
    model::{GameObject, TurnState},
    value::{NULL, Value},
};

pub const TURN_ENTRY: &str = "turn";
pub const INIT_ENTRY: &str = "init";

pub type GuestFn =
    dyn FnMut(&mut CallContext<'_>, &[Value]) -> Result<Value, GuestError> + Send + 'static;

/// A named callable exported by guest code, with the parameter count it
/// declares.
pub struct EntryPoint {
    params: usize,
    line: Option<usize>,
    func: Box<GuestFn>,
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("params", &self.params)
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

impl EntryPoint {
    /// A dynamically typed entry point. The driver passes exactly `params`
    /// arguments.
    pub fn new<F>(params: usize, func: F) -> Self
    where
        F: FnMut(&mut CallContext<'_>, &[Value]) -> Result<Value, GuestError> + Send + 'static,
    {
        Self {
            params,
            line: None,
            func: Box::new(func),
        }
    }

    /// `turn(state, unit)`; returning `None` means no action.
    pub fn turn<F>(mut func: F) -> Self
    where
        F: FnMut(
                &mut CallContext<'_>,
                &TurnState,
                &GameObject,
            ) -> Result<Option<Action>, GuestError>
            + Send
            + 'static,
    {
        Self::new(2, move |cx, args| {
            let state = arg(args, 0).as_state(TURN_ENTRY)?;
            let unit = arg(args, 1).as_obj(TURN_ENTRY)?;
            Ok(func(cx, state, unit)?.into())
        })
    }

    /// `turn(state, unit, debug)`; the call context carries a debug handle
    /// scoped to `unit`.
    pub fn turn_with_debug<F>(func: F) -> Self
    where
        F: FnMut(
                &mut CallContext<'_>,
                &TurnState,
                &GameObject,
            ) -> Result<Option<Action>, GuestError>
            + Send
            + 'static,
    {
        Self {
            params: 3,
            ..Self::turn(func)
        }
    }

    /// `init(state)`, run once before the first turn.
    pub fn init<F>(mut func: F) -> Self
    where
        F: FnMut(&mut CallContext<'_>, &TurnState) -> Result<(), GuestError> + Send + 'static,
    {
        Self::new(1, move |cx, args| {
            func(cx, arg(args, 0).as_state(INIT_ENTRY)?)?;
            Ok(Value::Null)
        })
    }

    /// Source line of the callable's definition, used to locate errors that
    /// carry no line of their own.
    #[must_use]
    pub const fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    #[must_use]
    pub const fn params(&self) -> usize {
        self.params
    }

    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        self.line
    }

    pub(crate) fn call(
        &mut self,
        cx: &mut CallContext<'_>,
        args: &[Value],
    ) -> Result<Value, GuestError> {
        (self.func)(cx, args).map_err(|err| err.located(self.line))
    }
}

/// The callables a guest program defines, keyed by name.
#[derive(Debug)]
pub struct GuestModule {
    source: String,
    entries: BTreeMap<String, EntryPoint>,
}

impl Default for GuestModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestModule {
    pub const DEFAULT_SOURCE: &'static str = "<robot>";

    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Self::DEFAULT_SOURCE.to_owned(),
            entries: BTreeMap::new(),
        }
    }

    /// Names the guest's own source file; trace frames in this file are
    /// the ones used to locate errors.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn define(mut self, name: impl Into<String>, entry: EntryPoint) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&EntryPoint> {
        self.entries.get(name)
    }

    pub(crate) fn entry_mut(&mut self, name: &str) -> Option<&mut EntryPoint> {
        self.entries.get_mut(name)
    }
}
