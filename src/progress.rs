//! Progress events emitted by an import run.
//!
//! The importer writes events into a channel; how they are shown is up to the
//! receiver.

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Source data is being fetched.
    Loading { message: String },
    /// Rows were parsed; `total` rows will be imported.
    Loaded { message: String, total: usize },
    /// One row finished. `index` is 1-based.
    Item {
        index: usize,
        total: usize,
        #[serde(rename = "productTitle")]
        product_title: String,
        success: bool,
        path: String,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading { message } => f.write_str(message),
            Self::Loaded { message, .. } => write!(f, "{} - Starting import...", message),
            Self::Item {
                index,
                total,
                product_title,
                success,
                path,
            } => {
                let mark = if *success { "✓" } else { "✗" };
                write!(f, "{}/{} {} {} ({})", index, total, mark, product_title, path)
            }
        }
    }
}

/// Sending half of a progress channel. Emitting never fails the run: events
/// sent after the receiver is gone are dropped, and `Progress::default()`
/// discards everything.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl Progress {
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
