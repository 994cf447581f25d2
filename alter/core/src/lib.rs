//! Alter Core - Headless Conversation Orchestration
//!
//! This crate is the brain of alter, the "talk to the you from the other
//! timeline" chat client. It is completely independent of any UI framework:
//! it can drive a web surface, a TUI, or run headless for testing.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       UI Surfaces                          │
//! │        ┌─────────┐  ┌─────────┐  ┌──────────────┐          │
//! │        │   Web   │  │   TUI   │  │   Headless   │          │
//! │        └────┬────┘  └────┬────┘  └──────┬───────┘          │
//! │             └────────────┴──────────────┘                  │
//! │                          │                                 │
//! │                   SurfaceEvent (up)                        │
//! │                  SurfaceMessage (down)                     │
//! │                          │                                 │
//! └──────────────────────────┼─────────────────────────────────┘
//!                            │
//! ┌──────────────────────────┼─────────────────────────────────┐
//! │                    ALTER CORE                              │
//! │  ┌───────────────────────┴─────────────────────────────┐   │
//! │  │                  ChatController                      │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌───────────┐  │   │
//! │  │  │ Prompt  │ │ Session │ │ Session │ │  Backend  │  │   │
//! │  │  │ Builder │ │ (live)  │ │  Store  │ │  (proxy)  │  │   │
//! │  │  └─────────┘ └─────────┘ └─────────┘ └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatController`]: the session state machine
//! - [`SurfaceMessage`]: messages sent from controller to UI surfaces
//! - [`SurfaceEvent`]: events sent from UI surfaces to the controller
//! - [`Conversation`]: the live transcript
//! - [`SessionStore`]: the capped, best-effort session archive
//! - [`ChatBackend`]: the proxy seam (swap in a mock for tests)
//!
//! # Module Overview
//!
//! - [`client`]: proxy client and the `ChatBackend` trait
//! - [`controller`]: the conversation state machine
//! - [`messages`]: surface messages, events, and wire types
//! - [`profile`]: the scan questionnaire and trait profiles
//! - [`prompt`]: the system prompt builder
//! - [`session`]: live conversation and archived snapshots
//! - [`store`]: key/value persistence and the session archive
//! - [`timing`]: every artificial delay, as pure policy

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod controller;
pub mod messages;
pub mod profile;
pub mod prompt;
pub mod session;
pub mod store;
pub mod timing;

// Re-exports for convenience
pub use client::{ChatBackend, ProxyClient, ProxyError};
pub use controller::{
    discard_terminal_lines, save_terminal_lines, strip_disconnect_marker, ChatController,
    ControllerConfig, IDLE_PINGS, MAX_SCENARIO_CHARS,
};
pub use messages::{
    ChatMessage, ControllerState, MessageId, MessageRole, NotifyLevel, SurfaceEvent,
    SurfaceMessage, TimelineId, MAX_CONTENT_CHARS,
};
pub use profile::{ScanOption, ScanQuestion, TraitProfile, SCAN_QUESTIONS};
pub use prompt::{build_system_prompt, CONNECTED_SIGNAL, DISCONNECT_MARKER, OPENING_LINES};
pub use session::{Conversation, SessionRecord, CONTEXT_WINDOW};
pub use store::{FileStorage, KvStorage, MemoryStorage, SessionStore, MAX_SESSIONS, SESSIONS_KEY};
pub use timing::{response_delay, scramble_frame, LOADER_STEPS};
