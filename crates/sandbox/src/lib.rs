//! Host harness for robot programs.
//!
//! [`sandbox`] runs a wasm guest under wasmtime with WASI preview 1 and the
//! `__rr_*` linear-memory protocol; [`process`] talks the line-oriented
//! variant of the same protocol to a child process. Both produce the same
//! [`InitReport`] and [`TurnReport`] shapes.

mod internal;

pub mod error;
pub mod process;
pub mod report;
pub mod sandbox;

pub const TRACE_TARGET_SANDBOX: &str = "rumble::sandbox";
pub const TRACE_TARGET_GUEST: &str = "rumble::guest";

pub use error::{Error, Result};
pub use process::ProcessSession;
pub use report::{InitReport, TurnReport};
pub use sandbox::{SandboxTemplate, SandboxTemplateBuilder, Session};
