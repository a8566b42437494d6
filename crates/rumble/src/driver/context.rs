use std::fmt::Display;

use crate::{
    envelope::DebugTable,
    error::GuestError,
    model::{GameObject, Id},
    value::Value,
};

/// Sinks available to one entry-point call.
///
/// The log is shared by the whole turn; the debug handle, when present,
/// belongs to the unit being processed.
pub struct CallContext<'a> {
    logs: &'a mut Vec<String>,
    debug: Option<DebugHandle<'a>>,
}

impl<'a> CallContext<'a> {
    pub(crate) const fn new(logs: &'a mut Vec<String>, debug: Option<DebugHandle<'a>>) -> Self {
        Self { logs, debug }
    }

    pub fn log(&mut self, line: impl Display) {
        self.logs.push(line.to_string());
    }

    /// Logs several values on one line, space separated.
    pub fn log_values(&mut self, values: &[Value]) {
        let line = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        self.logs.push(line);
    }

    /// # Errors
    /// Returns a contract violation when the turn entry point did not
    /// declare a debug parameter.
    pub fn debug(&mut self) -> Result<&mut DebugHandle<'a>, GuestError> {
        self.debug.as_mut().ok_or_else(|| {
            GuestError::contract("debug is only available to a turn that takes a debug parameter")
        })
    }

    pub(crate) fn take_violation(&mut self) -> Option<GuestError> {
        self.debug.as_mut().and_then(|debug| debug.violation.take())
    }
}

/// Per-unit debug channel.
pub struct DebugHandle<'a> {
    table: &'a mut DebugTable,
    inspections: &'a mut Vec<Id>,
    violation: Option<GuestError>,
}

impl<'a> DebugHandle<'a> {
    pub(crate) const fn new(table: &'a mut DebugTable, inspections: &'a mut Vec<Id>) -> Self {
        Self {
            table,
            inspections,
            violation: None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Display) {
        self.table.insert(key.into(), value.to_string());
    }

    /// Records `value`, coerced to a string, under `key`.
    ///
    /// # Errors
    /// A non-string key is a contract violation. It fails the unit even if
    /// the caller drops the error.
    pub fn record(&mut self, key: &Value, value: &Value) -> Result<(), GuestError> {
        match key {
            Value::Str(key) => {
                self.set(key.clone(), value);
                Ok(())
            }
            other => Err(self.violate(GuestError::contract(format!(
                "debug keys must be strings, got {}",
                other.kind()
            )))),
        }
    }

    pub fn locate_obj(&mut self, unit: &GameObject) {
        self.inspections.push(unit.id().clone());
    }

    /// Marks another unit as inspected this turn.
    ///
    /// # Errors
    /// A non-object argument is a type mismatch that fails the unit.
    pub fn locate(&mut self, unit: &Value) -> Result<(), GuestError> {
        match unit.as_obj("debug.locate") {
            Ok(obj) => {
                self.locate_obj(obj);
                Ok(())
            }
            Err(err) => Err(self.violate(err)),
        }
    }

    fn violate(&mut self, err: GuestError) -> GuestError {
        self.violation.get_or_insert_with(|| err.clone());
        err
    }
}
