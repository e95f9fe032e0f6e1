//! Turn-taking between the user and an inference backend.
//!
//! [`ConversationController`] owns the conversation state for one session.
//! Work that has to await the backend is handed out as a pending value
//! ([`PendingInitialization`], [`PendingGeneration`]) so the owner can drive
//! it on another task and feed the outcome back with `finish_*`. The async
//! [`ConversationController::initialize`] and [`ConversationController::send`]
//! do both halves inline.

pub mod prompt;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{InferenceBackend, InferenceError};
use crate::events::Turn;
use prompt::{InferenceOutput, InferenceRequest};

/// Per-send state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
}

/// Everything the UI renders from
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub turns: Vec<Turn>,
    pub pending_input: String,
    pub is_sending: bool,
    pub is_backend_ready: bool,
}

/// Backend initialization waiting to be awaited
pub struct PendingInitialization {
    backend: Arc<dyn InferenceBackend>,
    ticket: u64,
    token: CancellationToken,
}

impl PendingInitialization {
    pub async fn run(self) -> InitializationOutcome {
        let result = self.backend.initialize().await;
        InitializationOutcome {
            ticket: self.ticket,
            token: self.token,
            result,
        }
    }
}

#[derive(Debug)]
pub struct InitializationOutcome {
    ticket: u64,
    token: CancellationToken,
    result: Result<(), InferenceError>,
}

/// A generate call waiting to be awaited
pub struct PendingGeneration {
    backend: Arc<dyn InferenceBackend>,
    request: InferenceRequest,
    ticket: u64,
    token: CancellationToken,
}

impl PendingGeneration {
    pub fn request(&self) -> &InferenceRequest {
        &self.request
    }

    pub async fn run(self) -> GenerationOutcome {
        let result = self.backend.generate(&self.request).await;
        GenerationOutcome {
            ticket: self.ticket,
            token: self.token,
            result,
        }
    }
}

#[derive(Debug)]
pub struct GenerationOutcome {
    ticket: u64,
    token: CancellationToken,
    result: Result<InferenceOutput, InferenceError>,
}

/// Conversation controller for a single session
pub struct ConversationController {
    session_id: Uuid,
    state: ConversationState,
    backend: Arc<dyn InferenceBackend>,
    session_token: CancellationToken,
    next_ticket: u64,
    init_ticket: Option<u64>,
    send_ticket: Option<u64>,
}

impl ConversationController {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: ConversationState::default(),
            backend,
            session_token: CancellationToken::new(),
            next_ticket: 0,
            init_ticket: None,
            send_ticket: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.state.turns
    }

    pub fn is_sending(&self) -> bool {
        self.state.is_sending
    }

    pub fn is_backend_ready(&self) -> bool {
        self.state.is_backend_ready
    }

    pub fn phase(&self) -> Phase {
        if self.state.is_sending {
            Phase::Sending
        } else {
            Phase::Idle
        }
    }

    pub fn describe_backend(&self) -> String {
        self.backend.describe()
    }

    pub fn pending_input(&self) -> &str {
        &self.state.pending_input
    }

    pub fn set_pending_input(&mut self, input: impl Into<String>) {
        self.state.pending_input = input.into();
    }

    /// Whether a send issued now would go through.
    pub fn can_send(&self, content: &str) -> bool {
        !content.trim().is_empty()
            && !self.state.is_sending
            && self.state.is_backend_ready
            && !self.session_token.is_cancelled()
    }

    /// Start backend initialization. Only the first call yields work.
    pub fn begin_initialize(&mut self) -> Option<PendingInitialization> {
        if self.init_ticket.is_some() || self.session_token.is_cancelled() {
            return None;
        }

        let ticket = self.take_ticket();
        self.init_ticket = Some(ticket);
        info!(session = %self.session_id, backend = %self.backend.describe(), "initializing backend");

        Some(PendingInitialization {
            backend: Arc::clone(&self.backend),
            ticket,
            token: self.session_token.child_token(),
        })
    }

    /// Commit the result of backend initialization.
    ///
    /// Failure leaves the backend not ready for the rest of the session.
    pub fn finish_initialize(&mut self, outcome: InitializationOutcome) {
        if outcome.token.is_cancelled() || self.init_ticket != Some(outcome.ticket) {
            debug!(session = %self.session_id, "discarding initialization outcome");
            return;
        }

        match outcome.result {
            Ok(()) => {
                self.state.is_backend_ready = true;
                info!(session = %self.session_id, "backend ready");
            }
            Err(e) => {
                error!(session = %self.session_id, error = %e, "backend initialization failed");
            }
        }
    }

    pub async fn initialize(&mut self) {
        if let Some(pending) = self.begin_initialize() {
            let outcome = pending.run().await;
            self.finish_initialize(outcome);
        }
    }

    /// Record the user turn and build the request for the backend.
    ///
    /// Returns `None` without touching state when the input is blank, a
    /// send is already in flight, or the backend is not ready.
    pub fn begin_send(&mut self, content: &str) -> Option<PendingGeneration> {
        let content = content.trim();
        if !self.can_send(content) {
            debug!(
                session = %self.session_id,
                sending = self.state.is_sending,
                ready = self.state.is_backend_ready,
                "send skipped"
            );
            return None;
        }

        let request = prompt::build_request(
            self.backend.kind().prompt_style(),
            &self.state.turns,
            content,
        );

        self.state.turns.push(Turn::user(content));
        self.state.pending_input.clear();
        self.state.is_sending = true;

        let ticket = self.take_ticket();
        self.send_ticket = Some(ticket);
        debug!(session = %self.session_id, ticket, turns = self.state.turns.len(), "send started");

        Some(PendingGeneration {
            backend: Arc::clone(&self.backend),
            request,
            ticket,
            token: self.session_token.child_token(),
        })
    }

    /// Send whatever is in `pending_input`.
    pub fn submit_pending(&mut self) -> Option<PendingGeneration> {
        let content = self.state.pending_input.clone();
        self.begin_send(&content)
    }

    /// Turn a generation outcome into the assistant turn and release the
    /// sending flag. Failures become a placeholder turn.
    pub fn finish_send(&mut self, outcome: GenerationOutcome) -> Option<&Turn> {
        if outcome.token.is_cancelled() || self.send_ticket != Some(outcome.ticket) {
            debug!(session = %self.session_id, ticket = outcome.ticket, "discarding generation outcome");
            return None;
        }

        let reply = match outcome.result {
            Ok(output) => prompt::extract_reply(&output),
            Err(e) => {
                warn!(session = %self.session_id, error = %e, "generation failed");
                self.backend.kind().failure_placeholder().to_string()
            }
        };

        self.state.turns.push(Turn::assistant(reply));
        self.state.is_sending = false;
        self.send_ticket = None;

        self.state.turns.last()
    }

    pub async fn send(&mut self, content: &str) -> Option<&Turn> {
        let pending = self.begin_send(content)?;
        let outcome = pending.run().await;
        self.finish_send(outcome)
    }

    /// End the session. Outcomes still in flight are dropped on arrival.
    pub fn shutdown(&mut self) {
        info!(session = %self.session_id, turns = self.state.turns.len(), "session closed");
        self.session_token.cancel();
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::events::Speaker;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted backend that records every request it sees
    struct StubBackend {
        kind: BackendKind,
        init_ok: bool,
        replies: Mutex<Vec<Result<InferenceOutput, InferenceError>>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl StubBackend {
        fn new(kind: BackendKind, replies: Vec<Result<InferenceOutput, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                init_ok: true,
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing_init(kind: BackendKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                init_ok: false,
                replies: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceBackend for StubBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn describe(&self) -> String {
            "stub".to_string()
        }

        async fn initialize(&self) -> Result<(), InferenceError> {
            if self.init_ok {
                Ok(())
            } else {
                Err(InferenceError::ModelUnavailable("stub".to_string()))
            }
        }

        async fn generate(&self, request: &InferenceRequest) -> Result<InferenceOutput, InferenceError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(InferenceError::Generation("script exhausted".to_string()))
            } else {
                replies.remove(0)
            }
        }
    }

    fn extended(text: &str) -> Result<InferenceOutput, InferenceError> {
        Ok(InferenceOutput::Extended(text.to_string()))
    }

    async fn ready_controller(backend: Arc<StubBackend>) -> ConversationController {
        let mut controller = ConversationController::new(backend);
        controller.initialize().await;
        assert!(controller.is_backend_ready());
        controller
    }

    fn texts(controller: &ConversationController) -> Vec<(Speaker, String)> {
        controller
            .turns()
            .iter()
            .map(|t| (t.speaker, t.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_send_appends_user_and_assistant() {
        let backend = StubBackend::new(BackendKind::Local, vec![extended("You: Hi\nAssistant: Hello there")]);
        let mut controller = ready_controller(backend).await;

        let reply = controller.send("Hi").await.map(|t| t.text.clone());

        assert_eq!(reply.as_deref(), Some("Hello there"));
        assert_eq!(
            texts(&controller),
            vec![
                (Speaker::User, "Hi".to_string()),
                (Speaker::Assistant, "Hello there".to_string()),
            ]
        );
        assert!(!controller.is_sending());
    }

    #[tokio::test]
    async fn test_send_while_not_ready_is_noop() {
        let backend = StubBackend::new(BackendKind::Local, vec![extended("Assistant: hi")]);
        let mut controller = ConversationController::new(backend.clone());

        assert!(controller.send("Hi").await.is_none());
        assert!(controller.turns().is_empty());
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_is_noop() {
        let backend = StubBackend::new(BackendKind::Local, vec![]);
        let mut controller = ready_controller(backend).await;
        controller.set_pending_input("   ");

        assert!(controller.send("  \n\t ").await.is_none());
        assert!(controller.turns().is_empty());
        assert_eq!(controller.pending_input(), "   ");
        assert_eq!(controller.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_second_send_while_sending_is_rejected() {
        let backend = StubBackend::new(BackendKind::Local, vec![extended("Assistant: one")]);
        let mut controller = ready_controller(backend).await;

        let pending = controller.begin_send("first").expect("send should start");
        assert_eq!(pending.request(), &InferenceRequest::Transcript("You: first\nAssistant:".to_string()));
        assert_eq!(controller.phase(), Phase::Sending);
        assert!(controller.begin_send("second").is_none());
        assert_eq!(controller.turns().len(), 1);

        let outcome = pending.run().await;
        controller.finish_send(outcome);
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_becomes_local_placeholder() {
        let backend = StubBackend::new(
            BackendKind::Local,
            vec![Err(InferenceError::Generation("boom".to_string()))],
        );
        let mut controller = ready_controller(backend).await;

        controller.send("Hi").await;

        let last = controller.turns().last().unwrap();
        assert_eq!(last.speaker, Speaker::Assistant);
        assert_eq!(last.text, "(Local model error)");
        assert!(!controller.is_sending());
        assert_eq!(controller.turns().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_becomes_remote_placeholder() {
        let backend = StubBackend::new(
            BackendKind::Remote,
            vec![Err(InferenceError::Decode("not json".to_string()))],
        );
        let mut controller = ready_controller(backend).await;

        controller.send("Hi").await;

        assert_eq!(controller.turns().last().unwrap().text, "(Error contacting server)");
        assert!(!controller.is_sending());
    }

    #[tokio::test]
    async fn test_empty_reply_is_substituted() {
        let backend = StubBackend::new(BackendKind::Remote, vec![Ok(InferenceOutput::Reply("   ".to_string()))]);
        let mut controller = ready_controller(backend).await;

        controller.send("Hi").await;

        assert_eq!(controller.turns().last().unwrap().text, "(no reply)");
    }

    #[tokio::test]
    async fn test_request_contains_history_then_new_message() {
        let backend = StubBackend::new(
            BackendKind::Local,
            vec![
                extended("You: Hi\nAssistant: Hello"),
                extended("You: Hi\nAssistant: Hello\nYou: Again\nAssistant: Sure"),
            ],
        );
        let mut controller = ready_controller(backend.clone()).await;

        controller.send("Hi").await;
        controller.send("  Again ").await;

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0], InferenceRequest::Transcript("You: Hi\nAssistant:".to_string()));
        assert_eq!(
            requests[1],
            InferenceRequest::Transcript("You: Hi\nAssistant: Hello\nYou: Again\nAssistant:".to_string())
        );
        assert_eq!(controller.turns()[2].text, "Again");
        assert_eq!(controller.turns().len(), 4);
    }

    #[tokio::test]
    async fn test_submit_pending_clears_input() {
        let backend = StubBackend::new(BackendKind::Local, vec![extended("Assistant: ok")]);
        let mut controller = ready_controller(backend).await;
        controller.set_pending_input("hello");

        let pending = controller.submit_pending().expect("send should start");
        assert_eq!(controller.pending_input(), "");
        assert!(controller.is_sending());

        let outcome = pending.run().await;
        controller.finish_send(outcome);
        assert!(!controller.is_sending());
    }

    #[tokio::test]
    async fn test_init_failure_leaves_backend_not_ready() {
        let backend = StubBackend::failing_init(BackendKind::Local);
        let mut controller = ConversationController::new(backend);

        controller.initialize().await;
        assert!(!controller.is_backend_ready());

        // No retry on a second call.
        assert!(controller.begin_initialize().is_none());
        assert!(controller.send("Hi").await.is_none());
        assert!(controller.turns().is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_after_shutdown_are_discarded() {
        let backend = StubBackend::new(BackendKind::Local, vec![extended("Assistant: late")]);
        let mut controller = ready_controller(backend).await;

        let pending = controller.begin_send("Hi").unwrap();
        controller.shutdown();
        let outcome = pending.run().await;

        assert!(controller.finish_send(outcome).is_none());
        assert_eq!(controller.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_initialization_after_shutdown_is_discarded() {
        let backend = StubBackend::new(BackendKind::Local, vec![]);
        let mut controller = ConversationController::new(backend);

        let pending = controller.begin_initialize().unwrap();
        controller.shutdown();
        controller.finish_initialize(pending.run().await);

        assert!(!controller.is_backend_ready());
    }

    #[tokio::test]
    async fn test_turn_count_grows_by_two_per_send() {
        let backend = StubBackend::new(
            BackendKind::Remote,
            vec![
                Ok(InferenceOutput::Reply("a".to_string())),
                Err(InferenceError::NotReady),
                Ok(InferenceOutput::Reply("c".to_string())),
            ],
        );
        let mut controller = ready_controller(backend).await;

        for (i, message) in ["one", "two", "three"].iter().enumerate() {
            controller.send(message).await;
            assert_eq!(controller.turns().len(), (i + 1) * 2);
            assert!(!controller.is_sending());
        }
    }
}
