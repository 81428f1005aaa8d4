//! Line-oriented console transport.
//!
//! Stands in for the radio link during development and demos. Each stdin
//! line is one inbound message:
//!
//! ```text
//! !a1b2c3d4: what's the weather like?      direct message
//! #1 !a1b2c3d4: @ai what's a good antenna?   channel 1
//! ```
//!
//! Outbound segments are written to stdout as `[dm:!a1b2c3d4] text`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

use meshrelay_core::transport::Transport;
use meshrelay_types::error::TransportError;
use meshrelay_types::message::{Destination, InboundMessage};

pub struct ConsoleTransport<R, W> {
    own_id: String,
    lines: Mutex<Lines<R>>,
    out: Mutex<W>,
}

impl ConsoleTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio(own_id: impl Into<String>) -> Self {
        Self::new(own_id, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(own_id: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            own_id: own_id.into(),
            lines: Mutex::new(reader.lines()),
            out: Mutex::new(writer),
        }
    }

    pub fn into_writer(self) -> W {
        self.out.into_inner()
    }
}

/// Parse one console line. `None` for blank or malformed lines.
pub fn parse_line(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (channel, rest) = match line.strip_prefix('#') {
        Some(tagged) => {
            let (index, rest) = tagged.split_once(char::is_whitespace)?;
            (Some(index.parse::<u32>().ok()?), rest.trim_start())
        }
        None => (None, line),
    };

    let (sender, text) = rest.split_once(':')?;
    let sender = sender.trim();
    let text = text.trim();
    if sender.is_empty() || sender.contains(char::is_whitespace) || text.is_empty() {
        return None;
    }

    Some(InboundMessage {
        user_id: sender.to_string(),
        sender_name: sender.trim_start_matches('!').to_string(),
        channel: channel.unwrap_or(0),
        text: text.to_string(),
        is_direct_message: channel.is_none(),
    })
}

impl<R, W> Transport for ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn own_id(&self) -> &str {
        &self.own_id
    }

    async fn receive(&self) -> Result<Option<InboundMessage>, TransportError> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = lines.next_line().await.map_err(|e| {
                tracing::error!(error = %e, "Console read failed");
                TransportError::Disconnected
            })?;
            let Some(line) = line else {
                return Ok(None);
            };
            match parse_line(&line) {
                Some(message) => return Ok(Some(message)),
                None if line.trim().is_empty() => continue,
                None => {
                    tracing::warn!(line = %line, "Ignoring malformed console line (expected '[#ch] <node>: <text>')");
                }
            }
        }
    }

    async fn send(&self, destination: &Destination, text: &str) -> Result<(), TransportError> {
        let mut out = self.out.lock().await;
        let line = format!("[{destination}] {text}\n");
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }
}
