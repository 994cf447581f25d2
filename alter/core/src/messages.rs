//! Controller Messages
//!
//! Messages sent from the `ChatController` to UI surfaces, and the events
//! surfaces send back. These represent every way the orchestration layer can
//! communicate with any connected surface (web, TUI, headless test harness).
//!
//! # Design Philosophy
//!
//! The controller is the "brain" that drives the conversation: pacing,
//! persona, disconnects. Surfaces are pure renderers that display what the
//! controller tells them to. This separation enables:
//!
//! - Multiple surface implementations without duplicated logic
//! - Headless operation for testing and automation
//! - Deterministic replay of a session from its message stream

use serde::{Deserialize, Serialize};

/// Hard ceiling on a single message's content, in characters.
///
/// Enforced before transmission and mirrored by the proxy server, so an
/// oversized message is truncated client-side rather than rejected.
pub const MAX_CONTENT_CHARS: usize = 3000;

/// Letters eligible for the timeline ID suffix.
///
/// I and O are excluded so an ID read aloud or off a screenshot is never
/// ambiguous with 1 and 0.
pub const TIMELINE_LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Messages from the controller to a UI surface
///
/// These messages tell the surface what to display and when. The surface
/// should not have any conversation logic, just render what it's told.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SurfaceMessage {
    /// A complete chat message to display
    Message {
        /// Unique message ID for tracking
        id: MessageId,
        /// Who sent this message
        role: MessageRole,
        /// The message content
        content: String,
    },

    /// A loader status line during connection ("scanning timelines...")
    LoaderStatus {
        /// Zero-based step index
        step: usize,
        /// The status text
        text: String,
    },

    /// Show or hide the typing indicator
    Typing {
        /// Whether the indicator should be visible
        active: bool,
    },

    /// Enable or disable the input field
    InputEnabled {
        /// Whether the user may type
        enabled: bool,
    },

    /// One line of the disconnect terminal log
    ///
    /// Surfaces that want the scramble-then-resolve effect can animate the
    /// line with [`crate::timing::scramble_frame`].
    TerminalLine {
        /// The resolved line text
        text: String,
    },

    /// Transient notification (network failure, validation complaint)
    Notify {
        /// Notification level
        level: NotifyLevel,
        /// Message content
        message: String,
    },

    /// Controller state change
    State {
        /// The new state
        state: ControllerState,
    },

    /// A session snapshot was persisted during disconnect
    SessionSaved {
        /// Timeline ID of the saved session
        id: TimelineId,
    },
}

/// Events from a UI surface to the controller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SurfaceEvent {
    /// Begin a session: scenario text plus scan answers (one index per question)
    Connect {
        /// The road-not-taken scenario, as the user typed it
        scenario: String,
        /// Selected option index for each scan question
        answers: Vec<usize>,
    },
    /// The user sent a chat message
    UserMessage {
        /// The message text
        text: String,
    },
    /// The user ended the session
    Disconnect {
        /// Whether to persist a snapshot before tearing down
        save: bool,
    },
    /// Abandon everything and return to idle
    Reset,
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who sent a message
///
/// Only these two roles ever cross the wire; system instructions travel in
/// the separate `systemPrompt` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person at the keyboard
    User,
    /// The other-timeline persona
    Assistant,
}

/// A single chat message as sent to the proxy and rendered by surfaces
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent it
    pub role: MessageRole,
    /// The text, bounded to [`MAX_CONTENT_CHARS`]
    pub content: String,
}

impl ChatMessage {
    /// Create a message, truncating oversized content at a char boundary
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        let mut content = content.into();
        if content.chars().count() > MAX_CONTENT_CHARS {
            content = content.chars().take(MAX_CONTENT_CHARS).collect();
        }
        Self { role, content }
    }

    /// Shorthand for a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Shorthand for an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Timeline identifier in the form `TL-####-X`
///
/// Purely cosmetic: it labels a session in the terminal log and the archive
/// list, and carries no ordering or uniqueness guarantee.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimelineId(pub String);

impl TimelineId {
    /// Generate a fresh timeline ID
    ///
    /// Four digits in 1000..=9999 plus a suffix letter drawn from
    /// [`TIMELINE_LETTERS`].
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let digits: u16 = rng.gen_range(1000..=9999);
        let letter = TIMELINE_LETTERS[rng.gen_range(0..TIMELINE_LETTERS.len())] as char;
        Self(format!("TL-{digits}-{letter}"))
    }
}

impl std::fmt::Display for TimelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
}

/// Controller operational states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// No session, waiting for a scenario
    Idle,
    /// Loader running, opening request in flight
    Connecting,
    /// Live conversation
    Active,
    /// Terminal log playing, session tearing down
    Disconnecting,
}

impl ControllerState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Establishing connection...",
            Self::Active => "Connected",
            Self::Disconnecting => "Severing connection...",
        }
    }
}
