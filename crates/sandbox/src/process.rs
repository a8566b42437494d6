//! Line-oriented transport to a robot running as a child process.
//!
//! The child prints `__rr_init:<InitResult>` once, then answers each JSON
//! turn state written to its stdin with `__rr_output:<TurnResult>`. Any other
//! stdout line printed before the reply is kept as a log line of that turn.

use std::{io, process::Stdio};

use rumble::{
    INIT_PREFIX, InitResult, OUTPUT_PREFIX, ProgramError, TurnOutput, TurnResult, TurnState,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
};
use tracing::{Instrument, debug, info_span};

use crate::{
    TRACE_TARGET_SANDBOX,
    error::Result,
    report::{InitReport, Phase, TurnReport},
};

/// Host end of one process session.
pub struct ProcessSession<W, R> {
    input: W,
    output: R,
    phase: Phase,
    line: String,
}

/// Starts `cmd` with piped stdin/stdout; stderr is inherited.
///
/// # Errors
/// Returns an error if the process cannot be spawned.
pub fn spawn(
    cmd: &mut Command,
) -> Result<(ProcessSession<ChildStdin, BufReader<ChildStdout>>, Child)> {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("child stdin is not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout is not piped"))?;
    Ok((ProcessSession::new(stdin, BufReader::new(stdout)), child))
}

impl<W, R> ProcessSession<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    pub const fn new(input: W, output: R) -> Self {
        Self {
            input,
            output,
            phase: Phase::Fresh,
            line: String::new(),
        }
    }

    /// Reads the init line. Anything but `{"Ok":null}` faults the session.
    ///
    /// # Errors
    /// [`Error::AlreadyInitialized`](crate::Error::AlreadyInitialized) on a
    /// second call.
    pub async fn init(&mut self) -> Result<InitReport> {
        self.phase.check_init()?;
        let span = info_span!(target: TRACE_TARGET_SANDBOX, "process.init");
        let result = self.read_init().instrument(span).await;
        self.phase = Phase::after_init(&result);
        Ok(InitReport {
            result,
            diagnostics: String::new(),
        })
    }

    /// Sends one turn state and waits for its reply.
    ///
    /// # Errors
    /// [`Error::NotInitialized`](crate::Error::NotInitialized) or
    /// [`Error::Faulted`](crate::Error::Faulted) when the session cannot run
    /// turns, [`Error::Encode`](crate::Error::Encode) if the state cannot be
    /// serialized.
    pub async fn run_turn(&mut self, state: &TurnState) -> Result<TurnReport> {
        self.phase.check_turn()?;
        let mut request = serde_json::to_vec(state)?;
        request.push(b'\n');
        let span =
            info_span!(target: TRACE_TARGET_SANDBOX, "process.run_turn", turn = state.turn());
        let result = self.exchange(&request).instrument(span).await;
        Ok(TurnReport {
            result,
            diagnostics: String::new(),
        })
    }

    async fn read_init(&mut self) -> InitResult {
        let Some(line) = self.next_line().await? else {
            return Err(ProgramError::NoData);
        };
        let Some(body) = line.strip_prefix(INIT_PREFIX) else {
            debug!(target: TRACE_TARGET_SANDBOX, line = %line, "first line is not an init reply");
            return Err(ProgramError::NoInitError);
        };
        serde_json::from_str::<InitResult>(body)?
    }

    async fn exchange(&mut self, request: &[u8]) -> TurnResult {
        self.input.write_all(request).await?;
        self.input.flush().await?;

        let mut printed = Vec::new();
        loop {
            let Some(line) = self.next_line().await? else {
                return Err(ProgramError::NoData);
            };
            if let Some(body) = line.strip_prefix(OUTPUT_PREFIX) {
                let mut output: TurnOutput = serde_json::from_str::<TurnResult>(body)??;
                output.logs.append(&mut printed);
                return Ok(output);
            }
            printed.push(line);
        }
    }

    /// Next stdout line without its terminator, `None` at EOF.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.line.clear();
        if self.output.read_line(&mut self.line).await? == 0 {
            return Ok(None);
        }
        let line = self.line.trim_end_matches(['\n', '\r']);
        Ok(Some(line.to_owned()))
    }
}
