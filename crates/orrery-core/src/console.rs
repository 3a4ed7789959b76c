//! Console output routing.
//!
//! Cells write console text through a [`ConsoleHandle`]. Writes never block
//! the running cell: they go into a bounded queue drained by a consumer task
//! that turns them into [`Notification::ConsoleOutput`] messages. Adjacent
//! writes from the same cell and stream are merged before delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::events::{Notification, NotificationSink};
use crate::graph::CellId;

/// Output stream a console write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One console write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleMessage {
    pub cell_id: CellId,
    pub stream: Stream,
    pub text: String,
}

impl ConsoleMessage {
    fn continues(&self, other: &ConsoleMessage) -> bool {
        self.cell_id == other.cell_id && self.stream == other.stream
    }
}

/// Writing end of the console queue.
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    tx: mpsc::Sender<ConsoleMessage>,
    dropped: Arc<AtomicU64>,
}

impl ConsoleHandle {
    /// Queue console text without blocking.
    ///
    /// When the queue is full the text is dropped and counted.
    pub fn write(&self, cell_id: CellId, stream: Stream, text: impl Into<String>) -> Result<()> {
        let message = ConsoleMessage {
            cell_id,
            stream,
            text: text.into(),
        };
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    cell = %message.cell_id,
                    dropped,
                    "Console queue full, dropping output"
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(Error::ConsoleClosed),
        }
    }

    /// Queue console text, waiting for room.
    pub async fn send(&self, message: ConsoleMessage) -> Result<()> {
        self.tx.send(message).await.map_err(|_| Error::ConsoleClosed)
    }

    /// Number of writes dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side of the console queue.
pub struct ConsoleRouter {
    rx: mpsc::Receiver<ConsoleMessage>,
    sink: Arc<dyn NotificationSink>,
}

impl ConsoleRouter {
    /// Create a queue with room for `capacity` pending writes.
    pub fn new(capacity: usize, sink: Arc<dyn NotificationSink>) -> (ConsoleHandle, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = ConsoleHandle {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (handle, Self { rx, sink })
    }

    /// Spawn the consumer on the current tokio runtime.
    ///
    /// The task ends once every [`ConsoleHandle`] has been dropped and the
    /// queue is drained.
    pub fn spawn(capacity: usize, sink: Arc<dyn NotificationSink>) -> (ConsoleHandle, JoinHandle<()>) {
        let (handle, router) = Self::new(capacity, sink);
        (handle, tokio::spawn(router.run()))
    }

    /// Drain the queue until all writers are gone.
    pub async fn run(mut self) {
        let mut pending: Option<ConsoleMessage> = None;
        loop {
            let mut merged = match pending.take() {
                Some(message) => message,
                None => match self.rx.recv().await {
                    Some(message) => message,
                    None => break,
                },
            };
            loop {
                match self.rx.try_recv() {
                    Ok(next) if merged.continues(&next) => merged.text.push_str(&next.text),
                    Ok(next) => {
                        pending = Some(next);
                        break;
                    }
                    Err(_) => break,
                }
            }
            self.deliver(merged);
        }
        tracing::debug!("Console router stopped");
    }

    fn deliver(&self, message: ConsoleMessage) {
        self.sink.notify(Notification::ConsoleOutput {
            cell_id: message.cell_id,
            stream: message.stream,
            text: message.text,
        });
    }
}
