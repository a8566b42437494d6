//! Guest side of the line-oriented process transport.
//!
//! The program reads one JSON turn state per stdin line and answers each with
//! a single stdout line: `__rr_init:` followed by the init result once, then
//! `__rr_output:` followed by a turn result per state. A failed init exits
//! non-zero without reading any state.

use std::{
    fs,
    io::{self, BufRead, Write},
    process::ExitCode,
};

use serde::Serialize;

use crate::{
    abi::{RobotFactory, load, run_serialized_turn},
    driver::Driver,
    envelope::{INIT_PREFIX, InitResult, OUTPUT_PREFIX, ProgramError},
};

fn write_line<W: Write, T: Serialize>(output: &mut W, prefix: &str, value: &T) -> io::Result<()> {
    output.write_all(prefix.as_bytes())?;
    serde_json::to_writer(&mut *output, value)?;
    output.write_all(b"\n")?;
    output.flush()
}

/// Runs a whole session over `input`/`output` and returns the init result.
///
/// # Errors
/// Only I/O failures on the streams themselves; protocol failures are
/// written to `output`.
pub fn run_lines<R: BufRead, W: Write>(
    factory: RobotFactory,
    payload: &[u8],
    input: R,
    mut output: W,
) -> io::Result<InitResult> {
    let mut driver = Driver::new();
    let init = load(factory, payload, &mut driver);
    write_line(&mut output, INIT_PREFIX, &init)?;
    if init.is_err() {
        return Ok(init);
    }

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let result = run_serialized_turn(&mut driver, line.as_bytes());
        write_line(&mut output, OUTPUT_PREFIX, &result)?;
    }
    Ok(init)
}

/// `main` for a robot binary. The optional first argument names a file whose
/// contents are the init payload.
#[must_use]
pub fn run_main(factory: RobotFactory) -> ExitCode {
    let payload = match std::env::args_os().nth(1).map(fs::read).transpose() {
        Ok(payload) => payload.unwrap_or_default(),
        Err(err) => {
            let init: InitResult = Err(ProgramError::from(err));
            let _ = write_line(&mut io::stdout().lock(), INIT_PREFIX, &init);
            return ExitCode::FAILURE;
        }
    };

    match run_lines(factory, &payload, io::stdin().lock(), io::stdout().lock()) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(_)) => ExitCode::FAILURE,
        Err(err) => {
            let _ = writeln!(io::stderr(), "robot i/o error: {err}");
            ExitCode::FAILURE
        }
    }
}
