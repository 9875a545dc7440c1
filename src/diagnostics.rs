//! Fire-and-forget diagnostics sink
//!
//! Connection events (connect, disconnect, handshake failures, abuse,
//! invalid packets) are pushed as human-readable lines. Sending never
//! blocks; a background task forwards the lines to `tracing`.

use tokio::sync::mpsc;

#[derive(Clone)]
pub struct Diagnostics {
    tx: mpsc::UnboundedSender<String>,
}

impl Diagnostics {
    /// A sink plus the receiving end, for callers that consume lines
    /// themselves.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A sink whose lines are logged by a spawned task.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn_forwarder() -> Self {
        let (sink, rx) = Self::channel();
        tokio::spawn(forward(rx));
        sink
    }

    pub fn send(&self, line: impl Into<String>) {
        // A closed receiver only means nobody is listening any more.
        let _ = self.tx.send(line.into());
    }
}

/// Drains `rx` into the log until every sender is gone.
pub async fn forward(mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        tracing::info!("[diag] {}", line);
    }
}
