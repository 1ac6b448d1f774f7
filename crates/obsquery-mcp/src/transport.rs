//! Newline-delimited JSON-RPC framing over async byte streams.
//!
//! [`StdioTransport::stdio`] is the only place in the workspace that takes
//! the process's standard output, and the handle stays private to the
//! transport. Diagnostics go to standard error through
//! `obsquery_lib::init_logging`.

use std::io;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{
    stdin, stdout, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin,
    Stdout,
};

/// One frame read from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(Value),
    /// The line was not valid JSON; carries the parse error.
    Malformed(String),
}

pub struct FrameTransport<R, W> {
    reader: R,
    writer: W,
}

/// The transport the server binary runs on.
pub type StdioTransport = FrameTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        FrameTransport {
            reader: BufReader::new(stdin()),
            writer: stdout(),
        }
    }
}

impl<R, W> FrameTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Read the next non-blank frame. Returns Ok(None) on EOF.
    ///
    /// Frames are read as raw bytes, so a line that is not UTF-8 surfaces as
    /// [`Inbound::Malformed`] like any other unparsable frame.
    pub async fn read_message(&mut self) -> Result<Option<Inbound>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let bytes = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .context("failed to read frame")?;
            if bytes == 0 {
                return Ok(None);
            }
            let frame = buf.trim_ascii();
            if frame.is_empty() {
                continue;
            }
            return Ok(Some(match serde_json::from_slice(frame) {
                Ok(value) => Inbound::Message(value),
                Err(e) => Inbound::Malformed(e.to_string()),
            }));
        }
    }

    /// Write one frame followed by a newline and flush it.
    pub async fn write_message(&mut self, message: &Value) -> Result<()> {
        let mut frame = serde_json::to_vec(message)?;
        frame.push(b'\n');
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// True when `err` means the client closed its end of the pipe.
pub fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io_err| io_err.kind() == io::ErrorKind::BrokenPipe)
}
