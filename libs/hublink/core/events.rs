//! Inbound event payloads
//!
//! Hub invocations are decoded into owned DTOs before dispatch, so
//! handlers receive their data by value.

use crate::config::HubMethods;
use crate::traits::{HubError, HubInvocation, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chat message pushed by the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    /// Fields the manager does not interpret (attachments, sender profile, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Someone started or stopped typing in a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub conversation_id: String,
    pub user_id: String,
}

/// Someone read messages in a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub conversation_id: String,
    pub user_id: String,
    pub message_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Route key for inbound events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    UserTyping,
    UserStoppedTyping,
    MessageRead,
}

/// A decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    MessageReceived(ChatMessage),
    UserTyping(TypingEvent),
    UserStoppedTyping(TypingEvent),
    MessageRead(ReadReceipt),
}

impl InboundEvent {
    /// Decode a hub invocation
    ///
    /// # Returns
    /// * `Ok(Some(event))` - A known event with well-formed arguments
    /// * `Ok(None)` - The target is not an event this manager handles
    /// * `Err(HubError::Protocol)` - Known target, malformed arguments
    pub fn from_invocation(methods: &HubMethods, invocation: &HubInvocation) -> Result<Option<Self>> {
        let target = invocation.target.as_str();
        let args = &invocation.arguments;

        let event = if target.eq_ignore_ascii_case(&methods.receive_message) {
            InboundEvent::MessageReceived(arg(args, 0, target)?)
        } else if target.eq_ignore_ascii_case(&methods.user_typing) {
            InboundEvent::UserTyping(typing(args, target)?)
        } else if target.eq_ignore_ascii_case(&methods.user_stopped_typing) {
            InboundEvent::UserStoppedTyping(typing(args, target)?)
        } else if target.eq_ignore_ascii_case(&methods.message_read) {
            InboundEvent::MessageRead(ReadReceipt {
                conversation_id: arg(args, 0, target)?,
                user_id: arg(args, 1, target)?,
                message_ids: arg(args, 2, target)?,
                timestamp: arg(args, 3, target)?,
            })
        } else {
            return Ok(None);
        };

        Ok(Some(event))
    }

    /// Route key of this event
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::MessageReceived(_) => EventKind::MessageReceived,
            InboundEvent::UserTyping(_) => EventKind::UserTyping,
            InboundEvent::UserStoppedTyping(_) => EventKind::UserStoppedTyping,
            InboundEvent::MessageRead(_) => EventKind::MessageRead,
        }
    }
}

fn typing(args: &[Value], target: &str) -> Result<TypingEvent> {
    Ok(TypingEvent {
        conversation_id: arg(args, 0, target)?,
        user_id: arg(args, 1, target)?,
    })
}

fn arg<T: DeserializeOwned>(args: &[Value], index: usize, target: &str) -> Result<T> {
    let value = args.get(index).ok_or_else(|| {
        HubError::Protocol(format!("{}: missing argument {}", target, index))
    })?;
    serde_json::from_value(value.clone())
        .map_err(|e| HubError::Protocol(format!("{}: argument {}: {}", target, index, e)))
}
