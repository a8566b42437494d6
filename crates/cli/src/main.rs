//! `rumble`: run a robot against a file of turn states and print its
//! replies as `__rr_init:`/`__rr_output:` lines.

use std::{
    io::{self, Write as _},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rumble::{INIT_PREFIX, OUTPUT_PREFIX, ProgramError, TurnResult, TurnState};
use rumble_sandbox::{SandboxTemplate, process};
use serde::Serialize;
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{
    EnvFilter, Layer as _, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

#[derive(Parser, Debug)]
#[command(name = "rumble")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a wasm robot in the sandbox
    Wasm {
        /// Guest module (.wasm or .wat)
        guest: PathBuf,

        /// Turn states, one JSON document per line
        states: PathBuf,

        /// File whose contents are passed to the robot's init
        #[arg(long)]
        payload: Option<PathBuf>,

        /// Directory for precompiled modules
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Linear memory limit in bytes
        #[arg(long)]
        max_memory: Option<usize>,

        /// Abandon the game when a turn runs longer than this (milliseconds)
        #[arg(long)]
        turn_timeout: Option<u64>,
    },

    /// Run a robot program speaking the line protocol
    Process {
        /// Turn states, one JSON document per line
        states: PathBuf,

        /// Program and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env()
        .context("invalid RUST_LOG")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_filter(filter),
        )
        .try_init()
        .context("failed to install tracing subscriber")
}

async fn read_states(path: &Path) -> Result<Vec<TurnState>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid turn state", path.display(), index + 1))
        })
        .collect()
}

fn emit<T: Serialize>(prefix: &str, value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(prefix.as_bytes())?;
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

struct WasmRun {
    guest: PathBuf,
    states: PathBuf,
    payload: Option<PathBuf>,
    cache: Option<PathBuf>,
    max_memory: Option<usize>,
    turn_timeout: Option<Duration>,
}

async fn run_wasm(run: WasmRun) -> Result<ExitCode> {
    let states = read_states(&run.states).await?;
    let payload = match &run.payload {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => Vec::new(),
    };

    let mut builder = SandboxTemplate::builder().cache(run.cache);
    if let Some(max_memory) = run.max_memory {
        builder = builder.max_memory(max_memory);
    }
    let template = builder
        .build(&run.guest)
        .await
        .with_context(|| format!("failed to load {}", run.guest.display()))?;
    let mut session = template.instantiate().await?;

    let init = session.init(&payload).await?;
    emit(INIT_PREFIX, &init.result)?;
    if init.result.is_err() {
        return Ok(ExitCode::FAILURE);
    }

    for state in &states {
        let turn = session.run_turn(state);
        let report = match run.turn_timeout {
            Some(limit) => {
                if let Ok(report) = tokio::time::timeout(limit, turn).await {
                    report?
                } else {
                    // The interrupted instance is unusable from here on.
                    warn!(turn = state.turn(), ?limit, "turn timed out, abandoning the game");
                    let timed_out: TurnResult = Err(ProgramError::InternalError);
                    emit(OUTPUT_PREFIX, &timed_out)?;
                    return Ok(ExitCode::FAILURE);
                }
            }
            None => turn.await?,
        };
        emit(OUTPUT_PREFIX, &report.result)?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_process(states: &Path, command: &[String]) -> Result<ExitCode> {
    let states = read_states(states).await?;
    let (program, args) = command.split_first().context("missing robot program")?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    let (mut session, mut child) =
        process::spawn(&mut cmd).with_context(|| format!("failed to start {program}"))?;

    let init = session.init().await?;
    emit(INIT_PREFIX, &init.result)?;
    if init.result.is_err() {
        return Ok(ExitCode::FAILURE);
    }

    for state in &states {
        let report = session.run_turn(state).await?;
        emit(OUTPUT_PREFIX, &report.result)?;
    }

    drop(session);
    let status = child.wait().await?;
    if !status.success() {
        warn!(%status, "robot exited unsuccessfully");
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing()?;

    match Args::parse().command {
        Commands::Wasm {
            guest,
            states,
            payload,
            cache,
            max_memory,
            turn_timeout,
        } => {
            run_wasm(WasmRun {
                guest,
                states,
                payload,
                cache,
                max_memory,
                turn_timeout: turn_timeout.map(Duration::from_millis),
            })
            .await
        }
        Commands::Process { states, command } => run_process(&states, &command).await,
    }
}
