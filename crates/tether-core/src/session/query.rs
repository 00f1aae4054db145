//! Retrieval query derivation from the live transcript.
//!
//! In a voice session the user's words mostly arrive as audio, so the
//! transcript is sparse on the user side. The query is the latest typed
//! user utterance, else the start of the assistant's last reply, and any
//! recent turn that voices a need takes precedence over both.

use tether_types::config::InjectionPolicy;
use tether_types::session::{Role, TranscriptMessage};

use super::transcript::ConversationContext;

/// Messages scanned for a user utterance.
const USER_WINDOW: usize = 6;

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn mentions_need(content: &str, keywords: &[String]) -> bool {
    let lowered = content.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k.as_str()))
}

/// Pick the text to search memory with, if any.
pub fn derive_query(
    context: &ConversationContext,
    last_assistant: Option<&str>,
    policy: &InjectionPolicy,
) -> Option<String> {
    let recent: Vec<&TranscriptMessage> = context.recent(USER_WINDOW);

    let mut query = recent
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone());

    if query.is_none() {
        query = last_assistant
            .filter(|t| !t.trim().is_empty())
            .map(|t| truncate(t, policy.assistant_query_chars).to_string());
    }

    let window_start = recent.len().saturating_sub(policy.keyword_window);
    if let Some(need) = recent[window_start..]
        .iter()
        .rev()
        .find(|m| mentions_need(&m.content, &policy.need_keywords))
    {
        query = Some(need.content.clone());
    }

    query.map(|q| q.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> InjectionPolicy {
        InjectionPolicy::default()
    }

    #[test]
    fn test_prefers_latest_user_utterance() {
        let mut ctx = ConversationContext::default();
        ctx.add_user_message("my desk is a mess");
        ctx.add_user_message("the kitchen too");
        ctx.add_assistant_message("Okay, let's pick one spot.");
        assert_eq!(
            derive_query(&ctx, Some("Okay, let's pick one spot."), &policy()).as_deref(),
            Some("the kitchen too")
        );
    }

    #[test]
    fn test_falls_back_to_truncated_assistant_text() {
        let ctx = ConversationContext::default();
        let long = "a".repeat(300);
        let q = derive_query(&ctx, Some(&long), &policy()).unwrap();
        assert_eq!(q.len(), 200);
    }

    #[test]
    fn test_need_keyword_overrides() {
        let mut ctx = ConversationContext::default();
        ctx.add_user_message("hello there friend");
        ctx.add_assistant_message("It sounds like you feel stuck on the report");
        assert_eq!(
            derive_query(&ctx, None, &policy()).as_deref(),
            Some("It sounds like you feel stuck on the report")
        );
    }

    #[test]
    fn test_keywords_only_checked_in_recent_window() {
        let mut ctx = ConversationContext::default();
        ctx.add_user_message("I can't focus today");
        ctx.add_assistant_message("Got it.");
        ctx.add_assistant_message("Shall we start?");
        // keyword message is outside the last two, but still the latest user utterance
        assert_eq!(
            derive_query(&ctx, None, &policy()).as_deref(),
            Some("I can't focus today")
        );
    }

    #[test]
    fn test_nothing_to_query() {
        let ctx = ConversationContext::default();
        assert!(derive_query(&ctx, None, &policy()).is_none());
        assert!(derive_query(&ctx, Some("   "), &policy()).is_none());
    }
}
