//! [`MessageSink`] implementations.
//!
//! - [`ChannelSink`]: forwards each reply batch over a tokio channel
//! - [`StdoutSink`]: prints replies for the CLI

use std::io::Write;

use tokio::sync::mpsc;
use tracing::warn;

use crate::chat::MessageSink;

/// Sink that forwards every batch to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<String>>,
}

impl ChannelSink {
    /// Create a sink and the receiver the host reads batches from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn send_message(&self, replies: Vec<String>) {
        if self.tx.send(replies).is_err() {
            warn!("reply receiver closed, dropping replies");
        }
    }
}

/// Sink that prints each reply on its own line, prefixed by a label.
#[derive(Debug, Clone)]
pub struct StdoutSink {
    label: String,
}

impl StdoutSink {
    /// Create a sink printing `"{label}> {reply}"` lines.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl MessageSink for StdoutSink {
    fn send_message(&self, replies: Vec<String>) {
        let stdout = std::io::stdout();
        if let Err(e) = write_replies(&mut stdout.lock(), &self.label, &replies) {
            warn!(error = %e, "failed to print replies");
        }
    }
}

/// Write one `"{label}> {reply}"` line per reply, then flush.
fn write_replies(out: &mut impl Write, label: &str, replies: &[String]) -> std::io::Result<()> {
    for reply in replies {
        writeln!(out, "{label}> {reply}")?;
    }
    out.flush()
}
