//! In-memory stdout/stderr for a session.
//!
//! The guest writes into a shared byte buffer bounded by a capacity; bytes
//! past the capacity are counted and dropped instead of failing the write.
//! The session drains the buffer between calls.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use wasmtime_wasi::{
    cli::{IsTerminal, StdoutStream},
    p2::{OutputStream, Pollable, StreamResult},
};

/// Largest single write the guest is offered.
const WRITE_BUDGET: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    dropped: usize,
}

/// Drained contents of a capture buffer.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
    pub text: String,
    /// Bytes discarded because the buffer was full.
    pub dropped: usize,
}

#[derive(Clone, Debug)]
pub struct CaptureOutput {
    captured: Arc<Mutex<Captured>>,
    capacity: usize,
}

impl CaptureOutput {
    pub fn new(capacity: usize) -> Self {
        Self {
            captured: Arc::new(Mutex::new(Captured::default())),
            capacity,
        }
    }

    fn append(&self, bytes: &[u8]) {
        let mut captured = self.captured.lock();
        let room = self.capacity.saturating_sub(captured.bytes.len());
        let kept = bytes.len().min(room);
        captured.bytes.extend_from_slice(&bytes[..kept]);
        captured.dropped += bytes.len() - kept;
    }

    /// Empties the buffer, decoding it lossily as UTF-8.
    pub fn drain(&self) -> Drained {
        let mut captured = self.captured.lock();
        let bytes = std::mem::take(&mut captured.bytes);
        Drained {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            dropped: std::mem::take(&mut captured.dropped),
        }
    }

    pub fn clear(&self) {
        let mut captured = self.captured.lock();
        captured.bytes.clear();
        captured.dropped = 0;
    }

    fn writer(&self) -> CaptureWriter {
        CaptureWriter {
            output: self.clone(),
        }
    }
}

impl StdoutStream for CaptureOutput {
    fn async_stream(&self) -> Box<dyn AsyncWrite + Send + Sync> {
        Box::new(self.writer())
    }

    fn p2_stream(&self) -> Box<dyn OutputStream> {
        Box::new(self.writer())
    }
}

impl IsTerminal for CaptureOutput {
    fn is_terminal(&self) -> bool {
        false
    }
}

pub struct CaptureWriter {
    output: CaptureOutput,
}

impl OutputStream for CaptureWriter {
    fn write(&mut self, bytes: Bytes) -> StreamResult<()> {
        self.output.append(&bytes);
        Ok(())
    }

    fn flush(&mut self) -> StreamResult<()> {
        Ok(())
    }

    fn check_write(&mut self) -> StreamResult<usize> {
        Ok(WRITE_BUDGET)
    }
}

#[async_trait::async_trait]
impl Pollable for CaptureWriter {
    async fn ready(&mut self) {}
}

impl AsyncWrite for CaptureWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.output.append(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt as _;

    use super::*;

    #[test]
    fn writes_are_shared_with_the_output() {
        let output = CaptureOutput::new(1024);
        let mut stream = output.p2_stream();
        stream.write(Bytes::from_static(b"hello ")).unwrap();
        stream.write(Bytes::from_static(b"world")).unwrap();
        stream.flush().unwrap();
        assert_eq!(output.drain().text, "hello world");
        assert_eq!(output.drain(), Drained::default());
    }

    #[test]
    fn overflow_is_dropped_and_counted() {
        let output = CaptureOutput::new(4);
        let mut stream = output.p2_stream();
        stream.write(Bytes::from_static(b"abcdef")).unwrap();
        assert_eq!(
            output.drain(),
            Drained {
                text: "abcd".to_owned(),
                dropped: 2
            }
        );
    }

    #[test]
    fn clear_discards_pending_bytes() {
        let output = CaptureOutput::new(16);
        output.p2_stream().write(Bytes::from_static(b"stale")).unwrap();
        output.clear();
        assert!(output.drain().text.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let output = CaptureOutput::new(16);
        output.p2_stream().write(Bytes::from_static(b"a\xffb")).unwrap();
        assert_eq!(output.drain().text, "a\u{fffd}b");
    }

    #[tokio::test]
    async fn async_stream_appends() {
        let output = CaptureOutput::new(16);
        let mut stream = Box::into_pin(output.async_stream());
        stream.write_all(b"line\n").await.unwrap();
        assert_eq!(output.drain().text, "line\n");
    }
}
