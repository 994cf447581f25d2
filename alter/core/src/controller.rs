//! Conversation Controller
//!
//! The state machine that runs a session end to end:
//!
//! ```text
//! Idle -> Connecting -> Active -> Disconnecting -> Idle
//! ```
//!
//! The controller owns the live conversation, the system prompt, and every
//! timer in the client (typing delays, the idle watchdog, the staggered
//! disconnect log). Surfaces drive it with [`SurfaceEvent`]s and render the
//! [`SurfaceMessage`] stream it emits; nothing here touches a UI directly
//! and there is no global state, so several controllers can coexist in one
//! process.
//!
//! # Turn serialization
//!
//! Events are processed one at a time off a single channel, and awaited
//! delays happen inline, so a second send while a turn is in flight simply
//! queues. Timer-driven work (idle pings, marker disconnects) re-enters
//! through an internal channel tagged with the turn it was scheduled in;
//! ticks from a superseded turn are dropped, so a stale idle ping can never
//! land after a genuine reply.

use std::time::Duration;

use chrono::{Local, Utc};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::client::ChatBackend;
use crate::messages::{
    ChatMessage, ControllerState, MessageId, NotifyLevel, SurfaceEvent, SurfaceMessage, TimelineId,
};
use crate::profile::TraitProfile;
use crate::prompt::{build_system_prompt, CONNECTED_SIGNAL, DISCONNECT_MARKER};
use crate::session::Conversation;
use crate::store::{KvStorage, SessionStore};
use crate::timing::{self, LOADER_STEPS};

/// Longest scenario accepted; anything longer is cut before prompt build
pub const MAX_SCENARIO_CHARS: usize = 600;

/// Canned messages the idle watchdog can synthesize
pub const IDLE_PINGS: [&str; 4] = [
    "you still there?",
    "hello? did i lose you",
    "...you good?",
    "wait did the connection drop",
];

/// Controller timing and limits
///
/// Every delay the controller schedules comes from here, so tests run the
/// full state machine in milliseconds.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Minimum time the connection loader runs, even when the opening
    /// request returns early
    pub loader_duration: Duration,
    /// Quiet time in `Active` before the idle watchdog synthesizes a ping
    pub idle_timeout: Duration,
    /// Gap between disconnect terminal lines
    pub disconnect_line_stagger: Duration,
    /// Pause after the final terminal line before returning to idle
    pub disconnect_settle: Duration,
    /// Per-character cost of the simulated typing delay
    pub typing_ms_per_char: u64,
    /// Floor of the simulated typing delay
    pub typing_delay_min: Duration,
    /// Ceiling of the simulated typing delay
    pub typing_delay_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            loader_duration: Duration::from_secs(12),
            idle_timeout: Duration::from_secs(90),
            disconnect_line_stagger: timing::DISCONNECT_LINE_STAGGER,
            disconnect_settle: timing::DISCONNECT_SETTLE,
            typing_ms_per_char: timing::TYPING_MS_PER_CHAR,
            typing_delay_min: timing::TYPING_DELAY_MIN,
            typing_delay_max: timing::TYPING_DELAY_MAX,
        }
    }
}

impl ControllerConfig {
    /// Load from environment variables, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            loader_duration: env_ms("ALTER_LOADER_MS", defaults.loader_duration),
            idle_timeout: env_ms("ALTER_IDLE_TIMEOUT_MS", defaults.idle_timeout),
            disconnect_line_stagger: env_ms(
                "ALTER_DISCONNECT_STAGGER_MS",
                defaults.disconnect_line_stagger,
            ),
            disconnect_settle: env_ms("ALTER_DISCONNECT_SETTLE_MS", defaults.disconnect_settle),
            ..defaults
        }
    }

    /// All delays collapsed to zero, for tests that only care about ordering
    #[must_use]
    pub fn instant() -> Self {
        Self {
            loader_duration: Duration::ZERO,
            idle_timeout: Duration::from_secs(3600),
            disconnect_line_stagger: Duration::ZERO,
            disconnect_settle: Duration::ZERO,
            typing_ms_per_char: 0,
            typing_delay_min: Duration::ZERO,
            typing_delay_max: Duration::ZERO,
        }
    }

    /// Simulated typing delay for a reply of the given length
    #[must_use]
    pub fn response_delay(&self, reply_chars: usize) -> Duration {
        timing::typing_delay(
            reply_chars,
            self.typing_ms_per_char,
            self.typing_delay_min,
            self.typing_delay_max,
        )
    }
}

fn env_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_millis)
}

/// Timer-driven work re-entering the event loop
#[derive(Clone, Copy, Debug)]
enum TimerTick {
    IdlePing,
    AutoDisconnect,
}

#[derive(Clone, Copy, Debug)]
struct TimerEvent {
    turn: u64,
    tick: TimerTick,
}

/// The conversation state machine
pub struct ChatController<B: ChatBackend, S: KvStorage> {
    config: ControllerConfig,
    backend: B,
    store: SessionStore<S>,
    tx: mpsc::Sender<SurfaceMessage>,

    state: ControllerState,
    conversation: Conversation,
    system_prompt: String,
    scenario: String,
    timeline_id: TimelineId,
    exchanges: u64,

    /// Bumped on every user action; stale timer ticks carry an older value
    turn: u64,
    timer_tx: mpsc::Sender<TimerEvent>,
    timer_rx: mpsc::Receiver<TimerEvent>,
    idle_timer: Option<AbortHandle>,
    disconnect_timer: Option<AbortHandle>,
}

impl<B: ChatBackend, S: KvStorage> ChatController<B, S> {
    /// Create a controller in `Idle`
    pub fn new(
        backend: B,
        store: SessionStore<S>,
        config: ControllerConfig,
        tx: mpsc::Sender<SurfaceMessage>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(16);
        Self {
            config,
            backend,
            store,
            tx,
            state: ControllerState::Idle,
            conversation: Conversation::new(),
            system_prompt: String::new(),
            scenario: String::new(),
            timeline_id: TimelineId::generate(),
            exchanges: 0,
            turn: 0,
            timer_tx,
            timer_rx,
            idle_timer: None,
            disconnect_timer: None,
        }
    }

    /// Run the event loop until the surface hangs up
    pub async fn run(mut self, mut events: mpsc::Receiver<SurfaceEvent>) {
        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.handle_event(event).await;
                }
                Some(timer) = self.timer_rx.recv() => {
                    self.handle_timer(timer).await;
                }
            }
        }
        self.cancel_timers();
        tracing::debug!("surface disconnected, controller stopping");
    }

    /// Process one surface event
    pub async fn handle_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::Connect { scenario, answers } => {
                self.connect(&scenario, &answers).await;
            }
            SurfaceEvent::UserMessage { text } => self.send(&text).await,
            SurfaceEvent::Disconnect { save } => self.disconnect(save).await,
            SurfaceEvent::Reset => self.reset().await,
        }
    }

    /// Current state, for surfaces that poll instead of tracking `State`
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    async fn connect(&mut self, scenario: &str, answers: &[usize]) {
        if self.state != ControllerState::Idle {
            tracing::debug!(state = ?self.state, "connect ignored outside Idle");
            return;
        }
        let scenario = scenario.trim();
        if scenario.is_empty() {
            self.notify(NotifyLevel::Warning, "describe your other path first.")
                .await;
            return;
        }
        self.turn += 1;
        self.scenario = scenario.chars().take(MAX_SCENARIO_CHARS).collect();
        let profile = TraitProfile::from_answers(answers);
        self.system_prompt = build_system_prompt(&self.scenario, &profile, Local::now());
        self.timeline_id = TimelineId::generate();
        self.set_state(ControllerState::Connecting).await;
        self.emit(SurfaceMessage::InputEnabled { enabled: false }).await;

        tracing::info!(timeline = %self.timeline_id, "establishing connection");

        // The loader and the opening request race; whichever finishes last
        // decides when the chat screen appears.
        let loader = async {
            let interval = timing::loader_step_interval(self.config.loader_duration);
            for (step, text) in LOADER_STEPS.iter().enumerate() {
                self.emit(SurfaceMessage::LoaderStatus {
                    step,
                    text: (*text).to_string(),
                })
                .await;
                tokio::time::sleep(interval).await;
            }
        };
        let probe = [ChatMessage::user(CONNECTED_SIGNAL)];
        let opening = self.backend.send(&probe, &self.system_prompt);
        let ((), opening) = tokio::join!(loader, opening);

        match opening {
            Ok(reply) => {
                let (reply, wants_disconnect) = strip_disconnect_marker(&reply);
                let delay = self.config.response_delay(reply.chars().count());
                let message = ChatMessage::assistant(reply);
                self.conversation.push(message.clone());
                self.set_state(ControllerState::Active).await;
                self.emit(SurfaceMessage::Message {
                    id: MessageId::new(),
                    role: message.role,
                    content: message.content,
                })
                .await;
                self.emit(SurfaceMessage::InputEnabled { enabled: true }).await;
                if wants_disconnect {
                    tracing::info!(timeline = %self.timeline_id, "opening reply requested disconnect");
                    self.arm_disconnect_timer(delay);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "opening request failed");
                self.notify(NotifyLevel::Error, &e.to_string()).await;
                self.teardown().await;
            }
        }
    }

    async fn send(&mut self, text: &str) {
        if self.state != ControllerState::Active {
            tracing::debug!(state = ?self.state, "send ignored outside Active");
            return;
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.turn += 1;
        self.cancel_timers();

        let user_message = ChatMessage::user(text);
        self.conversation.push(user_message.clone());
        self.emit(SurfaceMessage::Message {
            id: MessageId::new(),
            role: user_message.role,
            content: user_message.content,
        })
        .await;
        self.emit(SurfaceMessage::InputEnabled { enabled: false }).await;
        self.emit(SurfaceMessage::Typing { active: true }).await;

        let result = self
            .backend
            .send(self.conversation.context_window(), &self.system_prompt)
            .await;

        match result {
            Ok(reply) => {
                let (reply, wants_disconnect) = strip_disconnect_marker(&reply);
                let delay = self.config.response_delay(reply.chars().count());
                tokio::time::sleep(delay).await;

                self.emit(SurfaceMessage::Typing { active: false }).await;
                let message = ChatMessage::assistant(reply);
                self.conversation.push(message.clone());
                self.exchanges += 1;
                self.emit(SurfaceMessage::Message {
                    id: MessageId::new(),
                    role: message.role,
                    content: message.content,
                })
                .await;
                self.emit(SurfaceMessage::InputEnabled { enabled: true }).await;

                if wants_disconnect {
                    tracing::info!(timeline = %self.timeline_id, "reply requested disconnect");
                    self.arm_disconnect_timer(delay);
                } else {
                    self.arm_idle_timer();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                self.emit(SurfaceMessage::Typing { active: false }).await;
                self.emit(SurfaceMessage::InputEnabled { enabled: true }).await;
                self.notify(NotifyLevel::Error, &e.to_string()).await;
                if self.exchanges > 0 {
                    self.arm_idle_timer();
                }
            }
        }
    }

    async fn disconnect(&mut self, save: bool) {
        if self.state != ControllerState::Active {
            tracing::debug!(state = ?self.state, "disconnect ignored outside Active");
            return;
        }
        self.turn += 1;
        self.cancel_timers();
        self.set_state(ControllerState::Disconnecting).await;
        self.emit(SurfaceMessage::InputEnabled { enabled: false }).await;

        let lines = if save {
            save_terminal_lines(self.conversation.len(), &self.timeline_id)
        } else {
            discard_terminal_lines(self.conversation.len(), &self.timeline_id)
        };
        for line in lines {
            self.emit(SurfaceMessage::TerminalLine { text: line }).await;
            tokio::time::sleep(self.config.disconnect_line_stagger).await;
        }
        tokio::time::sleep(self.config.disconnect_settle).await;

        if save && !self.conversation.is_empty() {
            let record = crate::session::SessionRecord::snapshot(
                self.timeline_id.clone(),
                &self.scenario,
                &self.conversation,
                Utc::now(),
            );
            let id = record.id.clone();
            self.store.save(record);
            self.emit(SurfaceMessage::SessionSaved { id }).await;
        }
        tracing::info!(timeline = %self.timeline_id, saved = save, "connection severed");
        self.teardown().await;
    }

    async fn reset(&mut self) {
        self.turn += 1;
        self.teardown().await;
    }

    /// Clear all session state and return to `Idle`
    async fn teardown(&mut self) {
        self.cancel_timers();
        self.conversation.clear();
        self.system_prompt.clear();
        self.scenario.clear();
        self.exchanges = 0;
        self.set_state(ControllerState::Idle).await;
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        if event.turn != self.turn {
            tracing::debug!(tick = ?event.tick, "dropping stale timer tick");
            return;
        }
        match event.tick {
            TimerTick::IdlePing => self.idle_ping().await,
            TimerTick::AutoDisconnect => {
                if self.state == ControllerState::Active {
                    self.disconnect(true).await;
                }
            }
        }
    }

    async fn idle_ping(&mut self) {
        if self.state != ControllerState::Active || self.exchanges == 0 {
            return;
        }
        let ping = IDLE_PINGS[rand::thread_rng().gen_range(0..IDLE_PINGS.len())];
        let message = ChatMessage::assistant(ping);
        self.conversation.push(message.clone());
        self.emit(SurfaceMessage::Message {
            id: MessageId::new(),
            role: message.role,
            content: message.content,
        })
        .await;
        // One ping per quiet period; the watchdog re-arms for the next one.
        self.arm_idle_timer();
    }

    fn arm_idle_timer(&mut self) {
        if self.exchanges == 0 {
            return;
        }
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
        self.idle_timer = Some(self.spawn_timer(self.config.idle_timeout, TimerTick::IdlePing));
    }

    fn arm_disconnect_timer(&mut self, delay: Duration) {
        if let Some(handle) = self.disconnect_timer.take() {
            handle.abort();
        }
        self.disconnect_timer = Some(self.spawn_timer(delay, TimerTick::AutoDisconnect));
    }

    fn spawn_timer(&self, delay: Duration, tick: TimerTick) -> AbortHandle {
        let tx = self.timer_tx.clone();
        let turn = self.turn;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerEvent { turn, tick }).await;
        });
        task.abort_handle()
    }

    fn cancel_timers(&mut self) {
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.disconnect_timer.take() {
            handle.abort();
        }
    }

    async fn set_state(&mut self, state: ControllerState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "state change");
            self.state = state;
            self.emit(SurfaceMessage::State { state }).await;
        }
    }

    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.emit(SurfaceMessage::Notify {
            level,
            message: message.to_string(),
        })
        .await;
    }

    async fn emit(&self, message: SurfaceMessage) {
        if self.tx.send(message).await.is_err() {
            tracing::debug!("surface channel closed, message dropped");
        }
    }
}

/// Remove the out-of-band disconnect marker from a reply
///
/// Returns the cleaned text and whether the marker was present. The marker
/// never reaches the rendered transcript.
#[must_use]
pub fn strip_disconnect_marker(reply: &str) -> (String, bool) {
    if reply.contains(DISCONNECT_MARKER) {
        (reply.replace(DISCONNECT_MARKER, "").trim().to_string(), true)
    } else {
        (reply.trim().to_string(), false)
    }
}

/// Terminal log for a disconnect that archives the session
#[must_use]
pub fn save_terminal_lines(message_count: usize, id: &TimelineId) -> Vec<String> {
    vec![
        "[SYS] Initiating encryption protocol v.9...".to_string(),
        format!("[SYS] Scanning {message_count} timeline blocks..."),
        "[OK] Blocks compressed.".to_string(),
        format!("[OK] Timeline ID: {id} secured."),
        "[SYS] Pushing to Redacted Folder...".to_string(),
        "[SYS] Severing connection...".to_string(),
    ]
}

/// Terminal log for a disconnect that discards the session
#[must_use]
pub fn discard_terminal_lines(message_count: usize, id: &TimelineId) -> Vec<String> {
    vec![
        "[SYS] Initiating severance protocol...".to_string(),
        "[WARN] Target memory flagged for deletion.".to_string(),
        format!("[SYS] Purging {message_count} timeline blocks..."),
        "[OK] Data eradication complete.".to_string(),
        format!("[WARN] Timeline ID: {id} lost."),
        "[SYS] Closing connection...".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProxyError;
    use crate::store::{MemoryStorage, SessionStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted backend: pops replies front to back, errors when empty
    struct MockBackend {
        replies: std::sync::Mutex<Vec<String>>,
        calls: Arc<AtomicUsize>,
        last_window_len: Arc<AtomicUsize>,
    }

    impl MockBackend {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: std::sync::Mutex::new(
                    replies.iter().map(|s| (*s).to_string()).collect(),
                ),
                calls: Arc::new(AtomicUsize::new(0)),
                last_window_len: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        async fn send(
            &self,
            window: &[ChatMessage],
            _system_prompt: &str,
        ) -> Result<String, ProxyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_window_len.store(window.len(), Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(ProxyError::Upstream {
                    message: "backend exhausted".into(),
                })
            } else {
                Ok(replies.remove(0))
            }
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn controller(
        backend: MockBackend,
        config: ControllerConfig,
    ) -> (
        ChatController<MockBackend, MemoryStorage>,
        mpsc::Receiver<SurfaceMessage>,
    ) {
        let (tx, rx) = mpsc::channel(64);
        let store = SessionStore::new(MemoryStorage::new());
        (ChatController::new(backend, store, config, tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<SurfaceMessage>) -> Vec<SurfaceMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn displayed(messages: &[SurfaceMessage]) -> Vec<(crate::messages::MessageRole, String)> {
        messages
            .iter()
            .filter_map(|m| match m {
                SurfaceMessage::Message { role, content, .. } => Some((*role, content.clone())),
                _ => None,
            })
            .collect()
    }

    async fn connected(
        backend: MockBackend,
        config: ControllerConfig,
    ) -> (
        ChatController<MockBackend, MemoryStorage>,
        mpsc::Receiver<SurfaceMessage>,
    ) {
        let (mut ctl, mut rx) = controller(backend, config);
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "almost became a pilot".into(),
            answers: vec![0, 1, 2, 3],
        })
        .await;
        drain(&mut rx);
        assert_eq!(ctl.state(), ControllerState::Active);
        (ctl, rx)
    }

    #[test]
    fn test_strip_marker_absent() {
        let (text, found) = strip_disconnect_marker("see you around");
        assert!(!found);
        assert_eq!(text, "see you around");
    }

    #[test]
    fn test_strip_marker_present() {
        let (text, found) = strip_disconnect_marker("gotta go. static's getting bad [DISCONNECT]");
        assert!(found);
        assert_eq!(text, "gotta go. static's getting bad");
    }

    #[test]
    fn test_terminal_lines_interpolate_count_and_id() {
        let id = TimelineId("TL-4242-K".into());
        let save = save_terminal_lines(7, &id);
        assert_eq!(save.len(), 6);
        assert!(save[1].contains("7 timeline blocks"));
        assert!(save[3].contains("TL-4242-K secured"));
        let discard = discard_terminal_lines(7, &id);
        assert_eq!(discard.len(), 6);
        assert!(discard[2].contains("Purging 7"));
        assert!(discard[4].contains("TL-4242-K lost"));
    }

    #[tokio::test]
    async fn test_connect_emits_loader_then_opening_message() {
        let (mut ctl, mut rx) = controller(
            MockBackend::new(&["hello?"]),
            ControllerConfig::instant(),
        );
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "almost moved abroad".into(),
            answers: vec![0, 0, 0, 0],
        })
        .await;
        let messages = drain(&mut rx);

        let loader_steps: Vec<usize> = messages
            .iter()
            .filter_map(|m| match m {
                SurfaceMessage::LoaderStatus { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(loader_steps, vec![0, 1, 2, 3, 4]);

        let shown = displayed(&messages);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].1, "hello?");
        assert_eq!(ctl.state(), ControllerState::Active);
    }

    #[tokio::test]
    async fn test_connect_waits_for_loader_when_backend_is_fast() {
        let mut config = ControllerConfig::instant();
        config.loader_duration = Duration::from_millis(100);
        let (mut ctl, mut rx) = controller(MockBackend::new(&["hello?"]), config);
        let started = tokio::time::Instant::now();
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "almost left town".into(),
            answers: vec![0],
        })
        .await;
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(ctl.state(), ControllerState::Active);
        drain(&mut rx);
    }

    #[tokio::test]
    async fn test_connect_waits_for_backend_when_loader_is_fast() {
        struct SlowBackend;
        #[async_trait]
        impl ChatBackend for SlowBackend {
            async fn send(
                &self,
                _window: &[ChatMessage],
                _system_prompt: &str,
            ) -> Result<String, ProxyError> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok("hello?".to_string())
            }
            async fn health_check(&self) -> bool {
                true
            }
        }
        let (tx, mut rx) = mpsc::channel(64);
        let store = SessionStore::new(MemoryStorage::new());
        let mut ctl =
            ChatController::new(SlowBackend, store, ControllerConfig::instant(), tx);
        let started = tokio::time::Instant::now();
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "almost left town".into(),
            answers: vec![0],
        })
        .await;
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(ctl.state(), ControllerState::Active);
        drain(&mut rx);
    }

    #[tokio::test]
    async fn test_connect_rejects_blank_scenario() {
        let (mut ctl, mut rx) = controller(MockBackend::new(&[]), ControllerConfig::instant());
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "   ".into(),
            answers: vec![],
        })
        .await;
        let messages = drain(&mut rx);
        assert!(matches!(
            messages.as_slice(),
            [SurfaceMessage::Notify { level: NotifyLevel::Warning, .. }]
        ));
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_idle() {
        let (mut ctl, mut rx) = controller(MockBackend::new(&[]), ControllerConfig::instant());
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "almost went to art school".into(),
            answers: vec![0],
        })
        .await;
        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, SurfaceMessage::Notify { level: NotifyLevel::Error, .. })));
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_send_appends_user_then_reply() {
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&["hello?", "wait. it worked??"]), ControllerConfig::instant())
                .await;
        ctl.handle_event(SurfaceEvent::UserMessage {
            text: "uh. hi?".into(),
        })
        .await;
        let messages = drain(&mut rx);
        let shown = displayed(&messages);
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].0, crate::messages::MessageRole::User);
        assert_eq!(shown[0].1, "uh. hi?");
        assert_eq!(shown[1].0, crate::messages::MessageRole::Assistant);
        assert_eq!(shown[1].1, "wait. it worked??");

        // typing indicator wrapped the turn
        let typing: Vec<bool> = messages
            .iter()
            .filter_map(|m| match m {
                SurfaceMessage::Typing { active } => Some(*active),
                _ => None,
            })
            .collect();
        assert_eq!(typing, vec![true, false]);
    }

    #[tokio::test]
    async fn test_send_rejects_whitespace_only() {
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&["hello?"]), ControllerConfig::instant()).await;
        let calls = ctl.backend.calls.clone();
        ctl.handle_event(SurfaceEvent::UserMessage { text: "   ".into() })
            .await;
        assert!(drain(&mut rx).is_empty());
        // only the opening request went out
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_error_notifies_and_reenables_input() {
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&["hello?"]), ControllerConfig::instant()).await;
        ctl.handle_event(SurfaceEvent::UserMessage { text: "hey".into() })
            .await;
        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, SurfaceMessage::Notify { level: NotifyLevel::Error, .. })));
        let last_input = messages
            .iter()
            .rev()
            .find_map(|m| match m {
                SurfaceMessage::InputEnabled { enabled } => Some(*enabled),
                _ => None,
            })
            .unwrap();
        assert!(last_input);
        assert_eq!(ctl.state(), ControllerState::Active);
    }

    #[tokio::test]
    async fn test_window_sent_to_backend_is_bounded() {
        let mut replies: Vec<&str> = vec!["hello?"];
        let canned: Vec<String> = (0..25).map(|i| format!("reply {i}")).collect();
        replies.extend(canned.iter().map(String::as_str));
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&replies), ControllerConfig::instant()).await;
        let window_len = ctl.backend.last_window_len.clone();
        for i in 0..25 {
            ctl.handle_event(SurfaceEvent::UserMessage {
                text: format!("msg {i}"),
            })
            .await;
            drain(&mut rx);
        }
        assert_eq!(window_len.load(Ordering::SeqCst), crate::session::CONTEXT_WINDOW);
    }

    #[tokio::test]
    async fn test_disconnect_with_save_archives_snapshot() {
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&["hello?", "no way"]), ControllerConfig::instant()).await;
        ctl.handle_event(SurfaceEvent::UserMessage { text: "hi".into() })
            .await;
        drain(&mut rx);
        ctl.handle_event(SurfaceEvent::Disconnect { save: true }).await;
        let messages = drain(&mut rx);

        let lines: Vec<&str> = messages
            .iter()
            .filter_map(|m| match m {
                SurfaceMessage::TerminalLine { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("encryption protocol"));
        assert!(messages
            .iter()
            .any(|m| matches!(m, SurfaceMessage::SessionSaved { .. })));
        assert_eq!(ctl.state(), ControllerState::Idle);

        let archived = ctl.store.load();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].msg_count, 3);
        assert_eq!(archived[0].scenario, "almost became a pilot");
    }

    #[tokio::test]
    async fn test_disconnect_discard_saves_nothing() {
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&["hello?"]), ControllerConfig::instant()).await;
        ctl.handle_event(SurfaceEvent::Disconnect { save: false }).await;
        let messages = drain(&mut rx);
        let lines: Vec<&str> = messages
            .iter()
            .filter_map(|m| match m {
                SurfaceMessage::TerminalLine { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(lines[0].contains("severance protocol"));
        assert!(!messages
            .iter()
            .any(|m| matches!(m, SurfaceMessage::SessionSaved { .. })));
        assert!(ctl.store.load().is_empty());
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_marker_reply_is_stripped_and_schedules_disconnect() {
        let (mut ctl, mut rx) = connected(
            MockBackend::new(&["hello?", "signal's fading. bye [DISCONNECT]"]),
            ControllerConfig::instant(),
        )
        .await;
        ctl.handle_event(SurfaceEvent::UserMessage { text: "hey".into() })
            .await;
        let messages = drain(&mut rx);
        let shown = displayed(&messages);
        assert_eq!(shown[1].1, "signal's fading. bye");
        assert!(!shown[1].1.contains(DISCONNECT_MARKER));

        // the scheduled tick runs the disconnect exactly once
        let timer = ctl.timer_rx.recv().await.unwrap();
        ctl.handle_timer(timer).await;
        assert_eq!(ctl.state(), ControllerState::Idle);
        let messages = drain(&mut rx);
        assert!(messages
            .iter()
            .any(|m| matches!(m, SurfaceMessage::TerminalLine { .. })));
        // a second, stale tick would be ignored
        assert_eq!(ctl.store.load().len(), 1);
    }

    #[tokio::test]
    async fn test_marker_in_opening_reply_schedules_disconnect() {
        let (mut ctl, mut rx) = controller(
            MockBackend::new(&["hello? [DISCONNECT]"]),
            ControllerConfig::instant(),
        );
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "almost became a pilot".into(),
            answers: vec![0],
        })
        .await;
        let shown = displayed(&drain(&mut rx));
        assert_eq!(shown[0].1, "hello?");
        assert_eq!(ctl.state(), ControllerState::Active);

        let timer = ctl.timer_rx.recv().await.unwrap();
        ctl.handle_timer(timer).await;
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| matches!(m, SurfaceMessage::TerminalLine { .. })));
    }

    #[tokio::test]
    async fn test_idle_ping_fires_and_user_send_invalidates_stale_tick() {
        let mut config = ControllerConfig::instant();
        config.idle_timeout = Duration::from_millis(10);
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&["hello?", "whoa", "still here"]), config).await;
        ctl.handle_event(SurfaceEvent::UserMessage { text: "hi".into() })
            .await;
        drain(&mut rx);

        // watchdog tick lands: one canned ping appended
        let timer = ctl.timer_rx.recv().await.unwrap();
        ctl.handle_timer(timer).await;
        let shown = displayed(&drain(&mut rx));
        assert_eq!(shown.len(), 1);
        assert!(IDLE_PINGS.contains(&shown[0].1.as_str()));

        // a tick scheduled before a user send is stale and must be dropped
        let stale = ctl.timer_rx.recv().await.unwrap();
        ctl.handle_event(SurfaceEvent::UserMessage { text: "back".into() })
            .await;
        drain(&mut rx);
        ctl.handle_timer(stale).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_no_idle_ping_before_first_exchange() {
        let (mut ctl, _rx) =
            connected(MockBackend::new(&["hello?"]), ControllerConfig::instant()).await;
        // no exchange completed yet, so nothing is armed
        assert!(ctl.idle_timer.is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (mut ctl, mut rx) =
            connected(MockBackend::new(&["hello?", "yo"]), ControllerConfig::instant()).await;
        ctl.handle_event(SurfaceEvent::UserMessage { text: "hi".into() })
            .await;
        drain(&mut rx);
        ctl.handle_event(SurfaceEvent::Reset).await;
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert!(ctl.conversation.is_empty());
        assert!(ctl.system_prompt.is_empty());
        assert!(ctl.idle_timer.is_none());
        assert!(ctl.store.load().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_truncated_before_prompt_build() {
        let (mut ctl, mut rx) = controller(
            MockBackend::new(&["hello?"]),
            ControllerConfig::instant(),
        );
        ctl.handle_event(SurfaceEvent::Connect {
            scenario: "x".repeat(MAX_SCENARIO_CHARS + 100),
            answers: vec![0],
        })
        .await;
        drain(&mut rx);
        assert_eq!(ctl.scenario.chars().count(), MAX_SCENARIO_CHARS);
    }

    #[tokio::test]
    async fn test_run_loop_processes_events_and_stops_on_hangup() {
        let (tx, mut rx) = mpsc::channel(64);
        let store = SessionStore::new(MemoryStorage::new());
        let ctl = ChatController::new(
            MockBackend::new(&["hello?"]),
            store,
            ControllerConfig::instant(),
            tx,
        );
        let (event_tx, event_rx) = mpsc::channel(8);
        let handle = tokio::spawn(ctl.run(event_rx));

        event_tx
            .send(SurfaceEvent::Connect {
                scenario: "almost stayed".into(),
                answers: vec![0, 0, 0, 0],
            })
            .await
            .unwrap();

        // wait for the opening message to come through
        let mut saw_opening = false;
        while let Some(msg) = rx.recv().await {
            if let SurfaceMessage::Message { content, .. } = msg {
                assert_eq!(content, "hello?");
                saw_opening = true;
                break;
            }
        }
        assert!(saw_opening);

        drop(event_tx);
        handle.await.unwrap();
    }
}
