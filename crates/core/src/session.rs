use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use crate::backend::ChatBackend;
use crate::chunker::{ChunkPolicy, Chunker};
use crate::conversation::Conversation;
use crate::error::TurnError;
use crate::persona::Persona;
use crate::speech_queue::SpeechQueue;
use crate::stream_reader::FragmentReader;
use crate::types::{ChatRequest, SpeakRequest};
use crate::APOLOGY_MESSAGE;

pub const DEFAULT_SESSION_BUDGET: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Wall-clock time a session may run before it is ended.
    pub budget: Duration,
    pub chunk_policy: ChunkPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            budget: DEFAULT_SESSION_BUDGET,
            chunk_policy: ChunkPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Ready,
    Active,
    Ended,
}

/// Where the current turn stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Accumulating,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Requested,
    Expired,
    Disconnected,
}

/// The reply of one completed turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReply {
    pub text: String,
    /// The chunks cut from `text`, in the order they were handed to the speaker.
    pub chunks: Vec<String>,
}

/// Cancels whatever turn is running, from outside the session.
#[derive(Clone)]
pub struct Interrupter {
    tx: Arc<watch::Sender<u64>>,
}

impl Interrupter {
    pub fn interrupt(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }
}

/// One trainee's conversation with one patient.
///
/// The session exclusively owns the speech handle and the clock. Both are
/// released by `end`, and by `Drop` for any path that never reached it.
pub struct PatientSession {
    persona: Persona,
    backend: Arc<dyn ChatBackend>,
    queue: Option<SpeechQueue>,
    settings: SessionSettings,
    conversation: Conversation,
    session_id: Option<String>,
    status: SessionStatus,
    phase: TurnPhase,
    started_at: Option<Instant>,
    cancel_tx: Arc<watch::Sender<u64>>,
}

impl PatientSession {
    /// Without a speaker the session runs in text-only chat mode.
    pub fn new(
        persona: Persona,
        backend: Arc<dyn ChatBackend>,
        speaker: Option<Arc<dyn crate::speaker::Speaker>>,
        settings: SessionSettings,
    ) -> Self {
        let conversation = Conversation::new(&persona.system_message());
        let (cancel_tx, _) = watch::channel(0);
        Self {
            persona,
            backend,
            queue: speaker.map(SpeechQueue::new),
            settings,
            conversation,
            session_id: None,
            status: SessionStatus::Ready,
            phase: TurnPhase::Idle,
            started_at: None,
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn has_speech(&self) -> bool {
        self.queue.is_some()
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Opens the backend conversation, starts the clock and greets the trainee.
    pub async fn start(&mut self) {
        if self.status != SessionStatus::Ready {
            tracing::warn!("session for {} already started", self.persona.id);
            return;
        }

        match self.backend.start_session().await {
            Ok(Some(session_id)) => {
                tracing::info!("Backend session created: {}", session_id);
                self.session_id = Some(session_id);
            }
            Ok(None) => tracing::debug!("backend did not return a session id"),
            Err(e) => tracing::error!("Failed to initialise backend session: {:?}", e),
        }

        self.started_at = Some(Instant::now());
        self.status = SessionStatus::Active;
        tracing::info!(
            "Session started with {} ({} remaining)",
            self.persona.name,
            self.format_remaining()
        );

        if let Some(queue) = &self.queue {
            let welcome = welcome_message(self.settings.budget);
            if let Err(e) = queue.speaker().speak(SpeakRequest::sync(&welcome)).await {
                tracing::warn!("Failed to speak welcome message: {:?}", e);
            }
        }
    }

    /// Runs one turn: sends the message, streams the reply into the speaker and
    /// records it in the history.
    pub async fn send_user_message(&mut self, text: &str) -> Result<TurnReply, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnReply::default());
        }
        if self.status != SessionStatus::Active {
            return Err(TurnError::Inactive);
        }
        let deadline = self.deadline().ok_or(TurnError::Inactive)?;
        if Instant::now() >= deadline {
            self.end(EndReason::Expired).await;
            return Err(TurnError::Expired);
        }

        let mut cancel_rx = self.cancel_tx.subscribe();
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        self.conversation.push_user(text);
        tracing::info!("Trainee said: \"{}\"", text);

        let outcome = tokio::select! {
            biased;
            _ = cancel_rx.changed() => Err(TurnError::Cancelled),
            _ = &mut expiry => Err(TurnError::Expired),
            result = self.run_turn() => result,
        };

        match outcome {
            Ok(reply) => {
                tracing::info!("{} said: {:?}", self.persona.first_name(), reply.text);
                Ok(reply)
            }
            Err(TurnError::Cancelled) => {
                tracing::info!("Turn interrupted");
                self.abort_speech().await;
                self.phase = TurnPhase::Idle;
                Err(TurnError::Cancelled)
            }
            Err(TurnError::Expired) => {
                tracing::info!("Session time ran out mid-turn");
                self.end(EndReason::Expired).await;
                Err(TurnError::Expired)
            }
            Err(e) => {
                tracing::error!("Turn failed: {}", e);
                self.phase = TurnPhase::Idle;
                self.report_failure().await;
                Err(e)
            }
        }
    }

    /// Sends a recording to the backend for transcription and answers it as a turn.
    pub async fn transcribe(
        &mut self,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<TurnReply, TurnError> {
        if self.status != SessionStatus::Active {
            return Err(TurnError::Inactive);
        }
        let transcription = match self
            .backend
            .transcribe(audio, file_name.to_string(), self.session_id.clone())
            .await
        {
            Ok(transcription) => transcription,
            Err(e) => {
                let err = TurnError::Request(format!("{e:#}"));
                tracing::error!("Transcription failed: {}", err);
                self.report_failure().await;
                return Err(err);
            }
        };
        tracing::debug!("Transcribed {}: {:?}", file_name, transcription);
        self.send_user_message(&transcription).await
    }

    async fn run_turn(&mut self) -> Result<TurnReply, TurnError> {
        let request = ChatRequest::builder()
            .with_messages(self.conversation.request_messages())
            .with_session_id(self.session_id.as_deref())
            .with_stream(true)
            .build();
        if let Some(queue) = &self.queue {
            queue.begin_turn();
        }

        let stream = self
            .backend
            .open_stream(request)
            .await
            .map_err(|e| TurnError::Request(format!("{e:#}")))?;
        if let Some(session_id) = stream.session_id {
            self.remember_session_id(session_id);
        }

        let mut reader = FragmentReader::new(stream.body);
        let mut chunker = Chunker::new(self.settings.chunk_policy);
        let mut reply = TurnReply::default();

        while let Some(fragment) = reader.next_fragment().await? {
            self.phase = TurnPhase::Accumulating;
            reply.text.push_str(fragment.chunk());
            if let Some(chunk) = chunker.push(fragment.chunk()) {
                self.dispatch(chunk, &mut reply.chunks);
            }
        }
        if let Some(chunk) = chunker.finish() {
            self.dispatch(chunk, &mut reply.chunks);
        }

        self.conversation.push_assistant(&reply.text);

        if let Some(queue) = &self.queue {
            if queue.is_draining() {
                self.phase = TurnPhase::Draining;
                queue.wait_idle().await;
            }
        }
        self.phase = TurnPhase::Idle;
        Ok(reply)
    }

    fn dispatch(&self, chunk: String, sent: &mut Vec<String>) {
        tracing::debug!("chunk #{}: {:?}", sent.len() + 1, chunk);
        if let Some(queue) = &self.queue {
            queue.enqueue(chunk.clone());
        }
        sent.push(chunk);
    }

    fn remember_session_id(&mut self, session_id: String) {
        if self.session_id.as_deref() != Some(session_id.as_str()) {
            tracing::info!("Backend session id is now {}", session_id);
            self.session_id = Some(session_id);
        }
    }

    /// Tells the trainee a turn failed: spoken by the avatar, or written into the chat.
    async fn report_failure(&mut self) {
        match &self.queue {
            Some(queue) => {
                queue.clear();
                queue.wait_idle().await;
                if let Err(e) = queue.speaker().speak(SpeakRequest::sync(APOLOGY_MESSAGE)).await {
                    tracing::warn!("Failed to speak apology: {:?}", e);
                }
            }
            None => self.conversation.push_assistant(APOLOGY_MESSAGE),
        }
    }

    async fn abort_speech(&self) {
        if let Some(queue) = &self.queue {
            queue.clear();
            if let Err(e) = queue.speaker().interrupt().await {
                tracing::warn!("Failed to interrupt speech: {:?}", e);
            }
        }
    }

    /// Stops the current utterance and drops whatever is still queued.
    pub async fn interrupt(&mut self) {
        self.interrupter().interrupt();
        self.abort_speech().await;
        self.phase = TurnPhase::Idle;
    }

    /// Releases the speech session and forgets the conversation. Safe to call twice.
    pub async fn end(&mut self, reason: EndReason) {
        if self.status != SessionStatus::Active {
            return;
        }
        self.status = SessionStatus::Ended;
        self.interrupter().interrupt();
        self.started_at = None;
        self.phase = TurnPhase::Idle;

        if let Some(queue) = &self.queue {
            queue.clear();
            if queue.is_draining() {
                if let Err(e) = queue.speaker().interrupt().await {
                    tracing::warn!("Failed to interrupt speech: {:?}", e);
                }
                queue.wait_idle().await;
            }
            if let Err(e) = queue.speaker().stop().await {
                tracing::warn!("Failed to stop speech session: {:?}", e);
            }
        }
        self.conversation.clear();
        tracing::info!("Session with {} ended ({:?})", self.persona.name, reason);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.started_at.map(|started| started + self.settings.budget)
    }

    /// Resolves when the session budget runs out. Never resolves before `start`.
    pub async fn expired(&self) {
        match self.deadline() {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    pub fn remaining(&self) -> Duration {
        match self.deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => self.settings.budget,
        }
    }

    pub fn format_remaining(&self) -> String {
        format_duration(self.remaining())
    }

    pub fn progress_percent(&self) -> f64 {
        let budget = self.settings.budget.as_secs_f64();
        if budget == 0.0 {
            return 0.0;
        }
        self.remaining().as_secs_f64() / budget * 100.0
    }
}

impl Drop for PatientSession {
    fn drop(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }
        tracing::warn!("Session for {} dropped without being ended", self.persona.id);
        if let Some(queue) = self.queue.take() {
            queue.clear();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let speaker = queue.speaker().clone();
                handle.spawn(async move {
                    if let Err(e) = speaker.stop().await {
                        tracing::warn!("Failed to stop speech session: {:?}", e);
                    }
                });
            }
        }
    }
}

fn welcome_message(budget: Duration) -> String {
    let minutes = budget.as_secs() / 60;
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    format!("Hello! I'm ready to chat with you. This session will last for {minutes} {unit}.")
}

/// `m:ss`, rounded down to whole seconds.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
