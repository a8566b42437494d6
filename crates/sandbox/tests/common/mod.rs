#![allow(dead_code)]

use std::fmt::Write as _;

use anyhow::{Context, Result};
use rumble::{Coords, Team, TurnState};
use rumble_sandbox::{SandboxTemplate, SandboxTemplateBuilder, Session};

pub const OK_INIT: &str = r#"{"Ok":null}"#;
pub const EMPTY_TURN: &str =
    r#"{"Ok":{"robot_actions":{},"logs":[],"debug_tables":{},"debug_inspections":[]}}"#;

/// Where the guest places the host's request.
const INPUT_ADDR: u32 = 32 * 1024;

/// A hand-written guest speaking the `__rr_*` protocol.
///
/// Both replies are fixed data segments; `init_body` and `turn_body` run
/// before the reply is selected and may call `$print (fd ptr len)`,
/// `$print_note (fd)` and read the `$turns` counter (already incremented for
/// the current turn) or `$inlen` (length of the last request).
pub struct Guest {
    init_reply: String,
    turn_reply: String,
    note: String,
    init_body: String,
    turn_body: String,
    extra: String,
}

impl Default for Guest {
    fn default() -> Self {
        Self {
            init_reply: OK_INIT.to_owned(),
            turn_reply: EMPTY_TURN.to_owned(),
            note: "note\n".to_owned(),
            init_body: String::new(),
            turn_body: String::new(),
            extra: String::new(),
        }
    }
}

impl Guest {
    pub fn init_reply(mut self, reply: &str) -> Self {
        reply.clone_into(&mut self.init_reply);
        self
    }

    pub fn turn_reply(mut self, reply: &str) -> Self {
        reply.clone_into(&mut self.turn_reply);
        self
    }

    pub fn note(mut self, note: &str) -> Self {
        note.clone_into(&mut self.note);
        self
    }

    pub fn init_body(mut self, body: &str) -> Self {
        body.clone_into(&mut self.init_body);
        self
    }

    pub fn turn_body(mut self, body: &str) -> Self {
        body.clone_into(&mut self.turn_body);
        self
    }

    /// Extra module-level fields.
    pub fn extra(mut self, extra: &str) -> Self {
        extra.clone_into(&mut self.extra);
        self
    }

    pub fn wat(&self) -> String {
        format!(
            r#"(module
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (global $out (mut i32) (i32.const 0))
  (global $turns (mut i32) (i32.const 0))
  (global $inlen (mut i32) (i32.const 0))
  (data (i32.const 2048) "{init}")
  (data (i32.const 8192) "{turn}")
  (data (i32.const 16384) "{note}")
  (func $print (param $fd i32) (param $ptr i32) (param $len i32)
    (i32.store (i32.const 0) (local.get $ptr))
    (i32.store (i32.const 4) (local.get $len))
    (drop (call $fd_write (local.get $fd) (i32.const 0) (i32.const 1) (i32.const 8))))
  (func $print_note (param $fd i32)
    (call $print (local.get $fd) (i32.const 16384) (i32.const {note_len})))
  (func (export "__rr_prealloc") (param $len i32) (result i32)
    (global.set $inlen (local.get $len))
    (i32.const {input}))
  (func (export "__rr_io_addr") (result i32)
    (global.get $out))
  (func (export "__rr_init") (result i32)
    {init_body}
    (global.set $out (i32.const 2048))
    (i32.const {init_len}))
  (func (export "__rr_run_turn") (result i32)
    (global.set $turns (i32.add (global.get $turns) (i32.const 1)))
    {turn_body}
    (global.set $out (i32.const 8192))
    (i32.const {turn_len}))
  {extra}
)"#,
            init = escape(&self.init_reply),
            turn = escape(&self.turn_reply),
            note = escape(&self.note),
            note_len = self.note.len(),
            input = INPUT_ADDR,
            init_body = self.init_body,
            init_len = self.init_reply.len(),
            turn_body = self.turn_body,
            turn_len = self.turn_reply.len(),
            extra = self.extra,
        )
    }

    pub async fn template(&self) -> Result<SandboxTemplate> {
        self.template_with(SandboxTemplate::builder()).await
    }

    pub async fn template_with(&self, builder: SandboxTemplateBuilder) -> Result<SandboxTemplate> {
        builder
            .build_from_bytes(self.wat().as_bytes())
            .await
            .context("failed to build template from test guest")
    }

    /// A session that has already completed a successful init.
    pub async fn ready_session(&self) -> Result<Session> {
        let template = self.template().await?;
        let mut session = template
            .instantiate()
            .await
            .context("failed to instantiate session")?;
        let report = session.init(b"").await.context("init failed")?;
        anyhow::ensure!(report.result.is_ok(), "unexpected init result: {report:?}");
        Ok(session)
    }
}

/// Escapes `s` as a WAT string literal body.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "\\{b:02x}");
        }
    }
    out
}

pub fn sample_state(turn: u64) -> TurnState {
    TurnState::builder(Team::Red)
        .turn(turn)
        .unit("r1", Coords::new(3, 4), Team::Red, 5)
        .unit("b1", Coords::new(3, 6), Team::Blue, 5)
        .terrain("w1", Coords::new(0, 0))
        .build()
}
