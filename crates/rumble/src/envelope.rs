//! Wire envelopes exchanged between the orchestrator and a guest.
//!
//! Results are serialized with serde's externally tagged `Result` form, so a
//! success reads `{"Ok": ...}` and a failure `{"Err": ...}`.

use std::{collections::BTreeMap, io};

use serde::{Deserialize, Serialize};

use crate::{action::Action, model::Id};

pub const INIT_PREFIX: &str = "__rr_init:";
pub const OUTPUT_PREFIX: &str = "__rr_output:";

/// `(line, column)`; lines are 1-based.
pub type Position = (usize, Option<usize>);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorLoc {
    pub start: Position,
    pub end: Option<Position>,
}

impl ErrorLoc {
    #[must_use]
    pub const fn line(line: usize) -> Self {
        Self {
            start: (line, None),
            end: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub loc: Option<ErrorLoc>,
    pub summary: String,
    pub details: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            loc: None,
            summary: summary.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_loc(mut self, loc: ErrorLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("the program failed to initialize: {}", .0.summary)]
    InitError(ErrorEnvelope),
    #[error("internal error while running the program")]
    InternalError,
    #[error("the program produced no output")]
    NoData,
    #[error("the program did not report its initialization")]
    NoInitError,
    #[error("malformed data: {0}")]
    DataError(String),
    #[error("i/o error: {0}")]
    #[serde(rename = "IO")]
    Io(String),
}

impl From<serde_json::Error> for ProgramError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataError(err.to_string())
    }
}

impl From<io::Error> for ProgramError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

pub type ProgramResult<T> = Result<T, ProgramError>;

/// Outcome of one unit's turn call: an action, an explicit no-op, or the
/// guest's error.
pub type ActionResult = Result<Option<Action>, ErrorEnvelope>;

pub type DebugTable = BTreeMap<String, String>;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutput {
    pub robot_actions: BTreeMap<Id, ActionResult>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub debug_tables: BTreeMap<Id, DebugTable>,
    #[serde(default)]
    pub debug_inspections: Vec<Id>,
}

pub type InitResult = ProgramResult<()>;
pub type TurnResult = ProgramResult<TurnOutput>;
