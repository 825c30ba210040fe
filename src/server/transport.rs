//! Newline-delimited JSON transport.
//!
//! One JSON-RPC message per line in each direction. Generic over the reader
//! and writer so the server can run on stdio or on in-memory pipes.

use crate::server::protocol::{JsonRpcRequest, JsonRpcResponse};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

/// A line read from the peer.
#[derive(Debug)]
pub enum Inbound {
    Request(JsonRpcRequest),
    /// The line was not a JSON-RPC request; carries the parse error.
    Malformed(String),
}

pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

impl LineTransport<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Next non-blank line, or `None` at end of input.
    ///
    /// A line that is not UTF-8 is reported as [`Inbound::Malformed`] rather
    /// than as an I/O error, so one bad line does not end the session.
    pub async fn read_message(&mut self) -> io::Result<Option<Inbound>> {
        loop {
            let mut buf = Vec::new();
            if self.reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(None);
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => return Ok(Some(Inbound::Malformed(format!("invalid UTF-8: {e}")))),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => Inbound::Request(request),
                Err(e) => Inbound::Malformed(e.to_string()),
            }));
        }
    }

    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let line = serde_json::to_string(response)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}
