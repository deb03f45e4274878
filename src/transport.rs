//! Byte-stream transport to the remote multiplexer.
//!
//! The engine never sees the transport; the client loop reads chunks here
//! and feeds them to the framer, and writes whatever the engine staged in
//! its outbound buffer. The usual instantiation is a `tmux -C` child
//! process speaking over stdio; tests use an in-memory duplex stream.

use std::process::Stdio;

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};

/// A bidirectional byte stream.
pub struct Transport {
    reader: Box<dyn AsyncRead + Unpin + Send>,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

impl Transport {
    /// Spawn the multiplexer in control mode attached to `target`.
    ///
    /// stderr goes to the null device: once the TUI owns the terminal the
    /// child has nowhere sensible to print, and protocol-level errors
    /// arrive in-band as `%error` replies anyway.
    pub fn process(bin: &str, socket: Option<&str>, target: &str) -> Result<(Self, Child)> {
        let mut cmd = Command::new(bin);
        if let Some(name) = socket {
            cmd.args(["-L", name]);
        }
        cmd.args(["-C", "attach-session", "-t", target])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        log::info!("spawning {bin} -C attach-session -t {target}");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {bin} in control mode"))?;

        let stdin = child.stdin.take().context("control-mode child has no stdin")?;
        let stdout = child.stdout.take().context("control-mode child has no stdout")?;

        Ok((
            Self { reader: Box::new(stdout), writer: Box::new(stdin) },
            child,
        ))
    }

    /// Wrap any duplex byte stream (tests use `tokio::io::duplex`).
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self { reader: Box::new(reader), writer: Box::new(writer) }
    }

    /// Read a chunk into `buf`; returns 0 at end of stream.
    pub async fn read_chunk(&mut self, buf: &mut BytesMut) -> std::io::Result<usize> {
        self.reader.read_buf(buf).await
    }

    /// Write `bytes` and flush.
    pub async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}
