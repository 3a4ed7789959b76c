//! Notifications emitted by the kernel.
//!
//! Front ends observe the kernel only through these messages. Delivery is
//! best effort: a sink that cannot keep up may drop messages, but the
//! messages about any single cell are always produced in order.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::console::Stream;
use crate::execute::{CellError, Output};
use crate::graph::{CellId, CellStatus, Name};
use crate::state::Value;

/// Capacity for the broadcast channel.
/// If subscribers fall behind, older messages are dropped.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// A variable declared by the notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub name: Name,
    /// Cells defining the name.
    pub declared_by: Vec<CellId>,
    /// Cells referencing the name.
    pub used_by: Vec<CellId>,
}

/// Messages sent from the kernel to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Run status of a cell changed.
    CellStatusChanged { cell_id: CellId, status: CellStatus },

    /// Errors shown on a cell changed. An empty list clears them.
    CellErrored {
        cell_id: CellId,
        errors: Vec<CellError>,
    },

    /// A cell produced output.
    CellOutput { cell_id: CellId, output: Output },

    /// A cell became stale or fresh.
    CellStale { cell_id: CellId, stale: bool },

    /// The set of declared variables changed.
    VariablesChanged { variables: Vec<VariableDeclaration> },

    /// A variable was (re)bound by a cell.
    VariableValue {
        name: Name,
        value: Value,
        cell_id: CellId,
    },

    /// Console text written by a cell.
    ConsoleOutput {
        cell_id: CellId,
        stream: Stream,
        text: String,
    },
}

impl Notification {
    /// The cell this message is about, if any.
    pub fn cell_id(&self) -> Option<CellId> {
        match self {
            Notification::CellStatusChanged { cell_id, .. }
            | Notification::CellErrored { cell_id, .. }
            | Notification::CellOutput { cell_id, .. }
            | Notification::CellStale { cell_id, .. }
            | Notification::VariableValue { cell_id, .. }
            | Notification::ConsoleOutput { cell_id, .. } => Some(*cell_id),
            Notification::VariablesChanged { .. } => None,
        }
    }
}

/// Receiver of kernel notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> NotificationSink for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}

/// Fans notifications out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new() -> (Self, broadcast::Receiver<Notification>) {
        let (tx, rx) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, notification: Notification) {
        // No subscribers is not an error.
        let _ = self.tx.send(notification);
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded messages about one cell, in order.
    pub fn for_cell(&self, cell_id: CellId) -> Vec<Notification> {
        self.snapshot()
            .into_iter()
            .filter(|n| n.cell_id() == Some(cell_id))
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
