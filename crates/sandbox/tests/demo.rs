mod common;

use std::{
    path::{Path, PathBuf},
    sync::Once,
};

use anyhow::{Context, Result};
use rumble::{Action, Coords, Direction, Id, InitResult, ProgramError, Team, TurnState};
use rumble_sandbox::{SandboxTemplate, Session};

fn workspace_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .context("failed to resolve workspace root from CARGO_MANIFEST_DIR")
}

fn print_skip_once(path: &Path) {
    static SKIP: Once = Once::new();
    SKIP.call_once(|| {
        eprintln!(
            "skipping demo robot tests: '{}' is missing. Build it with \
             `cargo build -p robot-demo --lib --release --target wasm32-wasip1`.",
            path.display()
        );
    });
}

/// Instantiates the demo robot, or `None` when it has not been built.
async fn demo_session(payload: &[u8]) -> Result<Option<(Session, InitResult)>> {
    let wasm = workspace_root()?
        .join("target")
        .join("wasm32-wasip1")
        .join("release")
        .join("robot_demo.wasm");
    if !wasm.is_file() {
        print_skip_once(&wasm);
        return Ok(None);
    }

    let template = SandboxTemplate::builder()
        .cache(Some(workspace_root()?.join("target").join("cache")))
        .build(&wasm)
        .await
        .context("failed to build demo template")?;
    let mut session = template.instantiate().await?;
    let init = session.init(payload).await?.result;
    Ok(Some((session, init)))
}

#[tokio::test]
async fn demo_hunter_attacks() -> Result<()> {
    let Some((mut session, init)) = demo_session(b"hunt").await? else {
        return Ok(());
    };
    assert_eq!(init, Ok(()));

    let state = TurnState::builder(Team::Blue)
        .unit("b1", Coords::new(4, 4), Team::Blue, 5)
        .unit("r1", Coords::new(4, 5), Team::Red, 5)
        .build();
    let output = session.run_turn(&state).await?.result.context("turn failed")?;
    assert_eq!(
        output.robot_actions[&Id::from("b1")],
        Ok(Some(Action::attack(Direction::South)))
    );
    assert_eq!(output.logs, ["hunting for team Blue"]);
    Ok(())
}

#[tokio::test]
async fn demo_patrol_prints_to_logs() -> Result<()> {
    let Some((mut session, init)) = demo_session(b"patrol").await? else {
        return Ok(());
    };
    assert_eq!(init, Ok(()));

    for turn in 1..=2 {
        let state = TurnState::builder(Team::Red)
            .turn(turn)
            .unit("r1", Coords::new(3, 3), Team::Red, 5)
            .build();
        let output = session.run_turn(&state).await?.result.context("turn failed")?;
        assert_eq!(output.logs, ["r1 at x=3"]);
    }
    Ok(())
}

#[tokio::test]
async fn demo_recovers_after_a_panicking_turn() -> Result<()> {
    let Some((mut session, init)) = demo_session(b"fragile").await? else {
        return Ok(());
    };
    assert_eq!(init, Ok(()));

    // Panics abort inside the sandbox, so the whole turn is lost.
    let doomed = TurnState::builder(Team::Blue)
        .unit("b1", Coords::new(4, 4), Team::Blue, 5)
        .unit("boom", Coords::new(0, 0), Team::Blue, 5)
        .unit("r1", Coords::new(4, 5), Team::Red, 5)
        .build();
    let report = session.run_turn(&doomed).await?;
    assert_eq!(report.result, Err(ProgramError::InternalError));
    assert!(report.diagnostics.contains("boom blew up"), "{}", report.diagnostics);

    let state = TurnState::builder(Team::Blue)
        .turn(2)
        .unit("b1", Coords::new(4, 4), Team::Blue, 5)
        .unit("r1", Coords::new(4, 5), Team::Red, 5)
        .build();
    let output = session.run_turn(&state).await?.result.context("turn failed")?;
    assert_eq!(
        output.robot_actions[&Id::from("b1")],
        Ok(Some(Action::attack(Direction::South)))
    );
    Ok(())
}

#[tokio::test]
async fn demo_unknown_mode_fails_init() -> Result<()> {
    let Some((mut session, init)) = demo_session(b"sprint").await? else {
        return Ok(());
    };
    assert!(matches!(init, Err(ProgramError::InitError(_))), "{init:?}");
    assert!(session.run_turn(&common::sample_state(1)).await.is_err());
    Ok(())
}
