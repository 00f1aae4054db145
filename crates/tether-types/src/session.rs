//! Live session types for Tether.
//!
//! These types model a live support conversation: the tagged events the
//! conversation provider emits and the transcript kept per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Speaker of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" | "agent" => Ok(Role::Assistant),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// One utterance in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TranscriptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A function call requested by the conversation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed in the tool response.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Events emitted by the live conversation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Synthesized assistant audio. Passed through untouched.
    Audio { data: Vec<u8> },
    /// Assistant text (transcript of the current turn).
    Text { text: String },
    ToolCall(ToolCall),
    /// The assistant finished its turn.
    TurnComplete,
}

/// Lifecycle status of a live session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Closing,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Closing => write!(f, "closing"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Identifier of a live session.
pub type SessionId = Uuid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_accepts_agent_alias() {
        assert_eq!("agent".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_live_event_tagged_serde() {
        let event: LiveEvent = serde_json::from_str(
            r#"{"type":"tool_call","id":"c1","name":"log_win","args":{"description":"sent email"}}"#,
        )
        .unwrap();
        match event {
            LiveEvent::ToolCall(call) => {
                assert_eq!(call.id.as_deref(), Some("c1"));
                assert_eq!(call.name, "log_win");
                assert_eq!(call.args["description"], "sent email");
            }
            other => panic!("expected tool call, got {other:?}"),
        }

        let event: LiveEvent = serde_json::from_str(r#"{"type":"turn_complete"}"#).unwrap();
        assert_eq!(event, LiveEvent::TurnComplete);
    }

    #[test]
    fn test_transcript_message_timestamp_defaults() {
        let msg: TranscriptMessage =
            serde_json::from_str(r#"{"role":"user","content":"I'm stuck"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "I'm stuck");
    }
}
