//! Robot turn protocol: the game model guest programs see, the driver that
//! runs a program's entry points for each of its units, and the wire
//! envelopes exchanged with the orchestrator.
//!
//! A robot crate builds a [`GuestModule`] and exports it with
//! [`export_robot!`] for the wasm sandbox, or runs it over stdin/stdout with
//! [`stdio::run_main`].

pub mod abi;
pub mod action;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod geom;
pub mod model;
pub mod stdio;
pub mod value;

pub use action::{Action, ActionType};
pub use driver::{CallContext, DebugHandle, Driver, EntryPoint, GuestModule};
pub use envelope::{
    ActionResult, DebugTable, ErrorEnvelope, ErrorLoc, INIT_PREFIX, InitResult, OUTPUT_PREFIX,
    ProgramError, ProgramResult, TurnOutput, TurnResult,
};
pub use error::{Frame, GuestError};
pub use geom::{Coords, Direction};
pub use model::{GameObject, Id, ObjDetails, ObjKind, StateError, Team, TurnState};
pub use value::{Value, ValueKind};
