//! CLI channel: JSON lines on stdin in, rendered parts on stdout out.
//!
//! Each input line is one [`InboundLine`]:
//!
//! ```text
//! {"type":"event","platform":"discord","raw_message":{...}}
//! {"type":"command","group_id":"123456","text":"/bridge status"}
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::MessageSender;
use crate::error::ChannelError;
use crate::pipeline::types::{ContentPart, RawEvent};

/// One line of stdin input.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundLine {
    /// A raw event from the source platform.
    Event(RawEvent),
    /// A bridge command issued from a destination group.
    Command {
        #[serde(default)]
        group_id: Option<String>,
        text: String,
    },
}

/// Parse a single input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<InboundLine, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

pub type InboundStream = Pin<Box<dyn Stream<Item = InboundLine> + Send>>;

/// Reads [`InboundLine`]s from stdin (or any buffered reader).
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }

    pub fn start(&self) -> InboundStream {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    /// Spawn a reader task over `reader`. Malformed lines are logged and
    /// skipped; the stream ends at EOF.
    pub fn from_reader<R>(reader: R) -> InboundStream
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_line(&line) {
                        None => continue,
                        Some(Ok(inbound)) => {
                            if tx.send(inbound).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Skipping malformed input line");
                        }
                    },
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes outbound parts to stdout. Registered as the fallback adapter
/// when no real transport is configured.
pub struct StdoutSender {
    name: String,
}

impl StdoutSender {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Plain-text rendering of a part sequence.
pub fn render_parts(parts: &[ContentPart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            ContentPart::Text { text } => out.push_str(text),
            ContentPart::Image { url } => {
                out.push_str("\n[image] ");
                out.push_str(url);
            }
        }
    }
    out
}

#[async_trait]
impl MessageSender for StdoutSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, address: &str, parts: &[ContentPart]) -> Result<(), ChannelError> {
        println!("── {} ──\n{}\n", address, render_parts(parts));
        Ok(())
    }
}
