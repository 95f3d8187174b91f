//! Events emitted by the session as frames and user actions are applied.
//!
//! Serializable so a future JSON output mode can reuse them unchanged.

use serde::{Deserialize, Serialize};

use crate::session::sources::Source;

/// One observable effect of applying a frame to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Incremental text chunk appended to the active assistant message.
    AssistantDelta { text: String },

    /// The assistant message finished; carries the final accumulated text.
    TurnCompleted { final_text: String },

    /// The turn was aborted by a server-reported error. A system message
    /// with the error text has been appended to the history.
    TurnFailed { message: String },

    /// A new source joined the ordered list and became current.
    SourceAdded { source: Source, index: usize },

    /// The current-source pointer moved to an already known source.
    CurrentSourceChanged { index: usize },
}
