//! Conversation state and the streaming message assembler.
//!
//! The session is a synchronous state machine: every mutation happens
//! inside `begin_turn`, `handle_frame`, or `handle_disconnect`, each driven
//! by exactly one external event (a user action, an inbound frame, a
//! transport state change). Handlers run to completion, so no internal
//! locking exists. Fragment ordering is delegated entirely to the
//! transport's in-order delivery; the assembler performs no reordering.

pub mod events;
pub mod sources;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{Frame, OutboundFrame, SearchMethod};
use events::SessionEvent;
use sources::{CitationOutcome, Source, SourceList};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    User,
    Ai,
    System,
}

/// One turn-history entry. Immutable once its turn completes; `text` is
/// append-only while the message is the active streaming target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: MessageSender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(sender: MessageSender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Turn lifecycle phase. `Idle` is both initial and reentrant terminal;
/// completion is transient and collapses straight back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    /// Outbound frame on the wire, no fragment of the reply seen yet.
    UserSent,
    /// At least one fragment of the reply has arrived.
    Streaming,
}

/// Ordered turn history, the active streaming target, and the source list.
#[derive(Debug, Default)]
pub struct Session {
    messages: Vec<Message>,
    active_message_id: Option<Uuid>,
    sources: SourceList,
    phase: TurnPhase,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a user turn and returns the frame to put on the wire.
    ///
    /// Clears the previous turn's sources and any abandoned streaming
    /// target before the outbound request exists, so citation frames of the
    /// new turn always land in an empty list. The caller is responsible for
    /// checking that the connection is open first.
    pub fn begin_turn(
        &mut self,
        text: &str,
        model_arn: &str,
        search_method: SearchMethod,
    ) -> OutboundFrame {
        self.active_message_id = None;
        self.sources.clear();
        self.messages.push(Message::new(MessageSender::User, text));
        self.phase = TurnPhase::UserSent;
        OutboundFrame {
            query: text.to_string(),
            model_arn: model_arn.to_string(),
            search_method,
        }
    }

    /// Applies one inbound frame, returning the events it produced.
    pub fn handle_frame(&mut self, frame: Frame) -> Vec<SessionEvent> {
        match frame {
            Frame::TextFragment { content } => self.on_fragment(content),
            Frame::Citation {
                source_id,
                source_url,
            } => self.on_citation(&source_id, &source_url),
            Frame::Complete { sources } => self.on_complete(&sources),
            Frame::ErrorFrame { message } => self.on_error(&message),
            Frame::Unrecognized => Vec::new(),
        }
    }

    /// Transport close or error: the streaming target is gone, history and
    /// sources survive untouched.
    pub fn handle_disconnect(&mut self) {
        self.active_message_id = None;
        self.phase = TurnPhase::Idle;
    }

    fn on_fragment(&mut self, content: String) -> Vec<SessionEvent> {
        let id = match self.active_message_id {
            Some(id) => id,
            None => {
                let message = Message::new(MessageSender::Ai, "");
                let id = message.id;
                self.messages.push(message);
                self.active_message_id = Some(id);
                id
            }
        };
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.text.push_str(&content);
        }
        if self.phase == TurnPhase::UserSent {
            self.phase = TurnPhase::Streaming;
        }
        vec![SessionEvent::AssistantDelta { text: content }]
    }

    fn on_citation(&mut self, id: &str, url: &str) -> Vec<SessionEvent> {
        match self.sources.apply_citation(id, url) {
            CitationOutcome::Added { index } => vec![SessionEvent::SourceAdded {
                source: self.sources.sources()[index].clone(),
                index,
            }],
            CitationOutcome::Revisited { index } => {
                vec![SessionEvent::CurrentSourceChanged { index }]
            }
        }
    }

    fn on_complete(&mut self, sources: &BTreeMap<String, String>) -> Vec<SessionEvent> {
        // Incremental citations win; the bulk map only fills an empty list.
        self.sources.apply_bulk(sources);
        let final_text = self
            .active_message()
            .map(|message| message.text.clone())
            .unwrap_or_default();
        self.active_message_id = None;
        self.phase = TurnPhase::Idle;
        vec![SessionEvent::TurnCompleted { final_text }]
    }

    fn on_error(&mut self, message: &str) -> Vec<SessionEvent> {
        // Abandon, never delete, the partially built reply.
        self.active_message_id = None;
        self.messages
            .push(Message::new(MessageSender::System, format!("Error: {message}")));
        self.phase = TurnPhase::Idle;
        vec![SessionEvent::TurnFailed {
            message: message.to_string(),
        }]
    }

    /// The message currently accumulating streamed fragments, if any.
    pub fn active_message(&self) -> Option<&Message> {
        let id = self.active_message_id?;
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn sources(&self) -> &[Source] {
        self.sources.sources()
    }

    pub fn current_source_index(&self) -> usize {
        self.sources.current_index()
    }
}
