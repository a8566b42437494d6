//! Guest side of the linear-memory protocol.
//!
//! The host reserves an input buffer with `__rr_prealloc(len)`, writes the
//! request into it, then calls `__rr_init` or `__rr_run_turn`. Both return
//! the byte length of the JSON reply, which the host reads from
//! `__rr_io_addr()`. A single buffer serves both directions and belongs to
//! whichever call is in flight. [`export_robot!`](crate::export_robot) wires
//! these exports to a [`GuestRuntime`] held in a [`RuntimeSlot`].
//!
//! On `wasm32-wasip1` a panic aborts, so the host sees a trap and the call
//! never returns. The slot keeps no borrow flag, which leaves the runtime
//! usable by the next export call.

use std::cell::UnsafeCell;

use serde::Serialize;
use tracing::debug;

use crate::{
    driver::{Driver, GuestModule},
    envelope::{InitResult, ProgramError, TurnResult},
    error::GuestError,
    model::TurnState,
};

/// Builds the guest module from the init payload (for instance a source
/// program to interpret).
pub type RobotFactory = fn(&[u8]) -> Result<GuestModule, GuestError>;

const INTERNAL_ERROR_REPLY: &[u8] = br#"{"Err":"InternalError"}"#;

/// Builds the module and hands it to `driver`, faulting the session when
/// the factory fails.
///
/// # Errors
/// `InitError` when the factory or validation fails.
pub fn load(factory: RobotFactory, payload: &[u8], driver: &mut Driver) -> InitResult {
    match factory(payload) {
        Ok(module) => driver.init(module),
        Err(err) => driver.fault(ProgramError::InitError(
            err.to_envelope(GuestModule::DEFAULT_SOURCE),
        )),
    }
}

/// Decodes one serialized turn state and runs it.
///
/// The session's own error (`NoInitError`, or the fault of a failed init)
/// takes precedence over a malformed state.
///
/// # Errors
/// `DataError` for a malformed state, otherwise whatever the driver reports.
pub fn run_serialized_turn(driver: &mut Driver, input: &[u8]) -> TurnResult {
    driver.ready()?;
    let state: TurnState = serde_json::from_slice(input)?;
    driver.run_turn(state)
}

#[derive(Debug)]
pub struct GuestRuntime {
    factory: RobotFactory,
    driver: Driver,
    io: Vec<u8>,
}

impl GuestRuntime {
    #[must_use]
    pub const fn new(factory: RobotFactory) -> Self {
        Self {
            factory,
            driver: Driver::new(),
            io: Vec::new(),
        }
    }

    /// Resizes the shared buffer to `len` zeroed bytes and returns its
    /// address.
    pub fn prealloc(&mut self, len: u32) -> *mut u8 {
        self.io.clear();
        self.io.resize(len as usize, 0);
        self.io.as_mut_ptr()
    }

    pub fn io_addr(&mut self) -> *mut u8 {
        self.io.as_mut_ptr()
    }

    #[must_use]
    pub fn io(&self) -> &[u8] {
        &self.io
    }

    /// Treats the buffer as the init payload; returns the reply length.
    pub fn init(&mut self) -> u32 {
        let payload = std::mem::take(&mut self.io);
        let result = load(self.factory, &payload, &mut self.driver);
        if let Err(err) = &result {
            debug!(error = %err, "init failed");
        }
        self.reply(&result)
    }

    /// Treats the buffer as a serialized turn state; returns the reply
    /// length.
    pub fn run_turn(&mut self) -> u32 {
        let result = run_serialized_turn(&mut self.driver, &self.io);
        self.reply(&result)
    }

    fn reply<T: Serialize>(&mut self, value: &T) -> u32 {
        self.io.clear();
        if serde_json::to_writer(&mut self.io, value).is_err() {
            self.io.clear();
            self.io.extend_from_slice(INTERNAL_ERROR_REPLY);
        }
        u32::try_from(self.io.len()).unwrap_or(0)
    }
}

/// Owner of the runtime behind the exports.
///
/// Unlike a `RefCell`, nothing is left marked as borrowed when a call traps
/// halfway through, so the session keeps working after a failed turn.
pub struct RuntimeSlot(UnsafeCell<GuestRuntime>);

impl RuntimeSlot {
    #[must_use]
    pub const fn new(factory: RobotFactory) -> Self {
        Self(UnsafeCell::new(GuestRuntime::new(factory)))
    }

    /// Runs `f` with exclusive access to the runtime.
    ///
    /// # Safety
    /// No other `enter` on the same slot may be running, which holds for
    /// export calls since the host never re-enters the guest.
    pub unsafe fn enter<R>(&self, f: impl FnOnce(&mut GuestRuntime) -> R) -> R {
        // SAFETY: exclusivity is the caller's obligation.
        f(unsafe { &mut *self.0.get() })
    }
}

/// Exports the `__rr_*` entry points for a robot built by `$factory`, a
/// [`RobotFactory`].
#[macro_export]
macro_rules! export_robot {
    ($factory:path) => {
        ::std::thread_local! {
            static __RUMBLE_RUNTIME: $crate::abi::RuntimeSlot =
                const { $crate::abi::RuntimeSlot::new($factory) };
        }

        fn __rumble_enter<R>(f: impl FnOnce(&mut $crate::abi::GuestRuntime) -> R) -> R {
            // SAFETY: only the exports below call this, one host call at a time.
            __RUMBLE_RUNTIME.with(|slot| unsafe { slot.enter(f) })
        }

        #[unsafe(export_name = "__rr_prealloc")]
        pub extern "C" fn __rumble_prealloc(len: u32) -> *mut u8 {
            __rumble_enter(|runtime| runtime.prealloc(len))
        }

        #[unsafe(export_name = "__rr_io_addr")]
        pub extern "C" fn __rumble_io_addr() -> *mut u8 {
            __rumble_enter(|runtime| runtime.io_addr())
        }

        #[unsafe(export_name = "__rr_init")]
        pub extern "C" fn __rumble_init() -> u32 {
            __rumble_enter(|runtime| runtime.init())
        }

        #[unsafe(export_name = "__rr_run_turn")]
        pub extern "C" fn __rumble_run_turn() -> u32 {
            __rumble_enter(|runtime| runtime.run_turn())
        }
    };
}
