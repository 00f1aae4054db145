//! Bounded conversation transcript.

use std::collections::VecDeque;

use tether_types::session::{Role, TranscriptMessage};

/// Messages kept per session; older ones are dropped.
pub const MAX_MESSAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct ConversationContext {
    messages: VecDeque<TranscriptMessage>,
    max_messages: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new(MAX_MESSAGES)
    }
}

impl ConversationContext {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn push(&mut self, message: TranscriptMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(TranscriptMessage::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(TranscriptMessage::assistant(content));
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&TranscriptMessage> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).collect()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Owned copy of the whole transcript, oldest first.
    pub fn transcript(&self) -> Vec<TranscriptMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_to_capacity() {
        let mut ctx = ConversationContext::new(3);
        for i in 0..5 {
            ctx.add_user_message(format!("m{i}"));
        }
        assert_eq!(ctx.len(), 3);
        let recent: Vec<&str> = ctx.recent(10).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(recent, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_last_user_message_skips_assistant() {
        let mut ctx = ConversationContext::default();
        assert!(ctx.last_user_message().is_none());
        ctx.add_user_message("I'm stuck");
        ctx.add_assistant_message("Let's break it down");
        assert_eq!(ctx.last_user_message(), Some("I'm stuck"));
    }
}
