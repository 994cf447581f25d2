//! Conversation state
//!
//! The live transcript of a session and the immutable snapshot taken of it
//! at disconnect-with-save. The conversation is append-only while a session
//! runs; the only truncation anywhere is the bounded context window handed
//! to the proxy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{ChatMessage, MessageRole, TimelineId};

/// Most recent messages included in each proxy request
pub const CONTEXT_WINDOW: usize = 15;

/// Length at which a scenario preview is cut for archive listings
pub const SCENARIO_PREVIEW_CHARS: usize = 120;

/// The live, append-only transcript of a session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when no messages have been exchanged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent `count` messages, oldest first
    #[must_use]
    pub fn recent(&self, count: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    /// The bounded window sent with each proxy request
    #[must_use]
    pub fn context_window(&self) -> &[ChatMessage] {
        self.recent(CONTEXT_WINDOW)
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Render the transcript as plain text, one `you:`/`alter:` line per message
    #[must_use]
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                let label = match m.role {
                    MessageRole::User => "you",
                    MessageRole::Assistant => "alter",
                };
                format!("{label}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// An archived session, immutable once stored
///
/// Field names follow the persisted JSON blob (`msgCount`, ISO `date`), so
/// archives written by earlier builds keep loading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Timeline label of the session
    pub id: TimelineId,
    /// When the snapshot was taken
    pub date: DateTime<Utc>,
    /// The scenario as the user typed it
    pub scenario: String,
    /// Message count at snapshot time
    pub msg_count: usize,
    /// Deep copy of the full transcript
    pub conversation: Vec<ChatMessage>,
}

impl SessionRecord {
    /// Take a deep snapshot of a live conversation
    ///
    /// The record owns its own copy of every message; later appends to the
    /// live conversation never show through.
    #[must_use]
    pub fn snapshot(
        id: TimelineId,
        scenario: &str,
        conversation: &Conversation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            date: now,
            scenario: scenario.to_string(),
            msg_count: conversation.len(),
            conversation: conversation.messages().to_vec(),
        }
    }

    /// Scenario cut to listing length, with an ellipsis when truncated
    #[must_use]
    pub fn scenario_preview(&self) -> String {
        if self.scenario.chars().count() <= SCENARIO_PREVIEW_CHARS {
            self.scenario.clone()
        } else {
            let cut: String = self.scenario.chars().take(SCENARIO_PREVIEW_CHARS).collect();
            format!("{cut}…")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filled(count: usize) -> Conversation {
        let mut convo = Conversation::new();
        for i in 0..count {
            let msg = if i % 2 == 0 {
                ChatMessage::user(format!("user {i}"))
            } else {
                ChatMessage::assistant(format!("alter {i}"))
            };
            convo.push(msg);
        }
        convo
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let convo = filled(20);
        let recent = convo.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "alter 17");
        assert_eq!(recent[1].content, "user 18");
        assert_eq!(recent[2].content, "alter 19");
    }

    #[test]
    fn test_recent_with_short_history_returns_everything() {
        let convo = filled(4);
        assert_eq!(convo.recent(15).len(), 4);
        assert_eq!(convo.recent(0).len(), 0);
    }

    #[test]
    fn test_context_window_bounded_at_fifteen() {
        let convo = filled(40);
        let window = convo.context_window();
        assert_eq!(window.len(), CONTEXT_WINDOW);
        assert_eq!(window.last().unwrap().content, "alter 39");
        assert_eq!(window.first().unwrap().content, "alter 25");
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let mut convo = filled(4);
        let record = SessionRecord::snapshot(
            TimelineId("TL-1234-K".into()),
            "almost joined a band",
            &convo,
            Utc::now(),
        );
        convo.push(ChatMessage::user("after the snapshot"));
        convo.clear();
        assert_eq!(record.msg_count, 4);
        assert_eq!(record.conversation.len(), 4);
        assert_eq!(record.scenario, "almost joined a band");
    }

    #[test]
    fn test_record_serializes_with_camel_case_keys() {
        let record = SessionRecord::snapshot(
            TimelineId("TL-1234-K".into()),
            "x",
            &filled(2),
            Utc::now(),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"msgCount\":2"));
        assert!(json.contains("\"conversation\""));
    }

    #[test]
    fn test_transcript_labels_roles() {
        let mut convo = Conversation::new();
        convo.push(ChatMessage::user("hey"));
        convo.push(ChatMessage::assistant("hello?"));
        assert_eq!(convo.transcript(), "you: hey\nalter: hello?");
    }

    #[test]
    fn test_scenario_preview_truncates_long_scenarios() {
        let record = SessionRecord::snapshot(
            TimelineId("TL-1234-K".into()),
            &"a".repeat(200),
            &Conversation::new(),
            Utc::now(),
        );
        let preview = record.scenario_preview();
        assert_eq!(preview.chars().count(), SCENARIO_PREVIEW_CHARS + 1);
        assert!(preview.ends_with('…'));
    }
}
