//! One live support session.
//!
//! `LiveSession` consumes provider events in order, dispatches tool calls,
//! feeds the context injector and intervention recorder, and on close
//! drains background work and stores a reflection.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tether_types::config::TetherConfig;
use tether_types::error::TransportError;
use tether_types::memory::UserId;
use tether_types::session::{LiveEvent, SessionId, SessionStatus, ToolCall, TranscriptMessage};

use super::injector::{ContextInjector, InjectionDecision, InjectionStats, InjectorState};
use super::recorder::{InterventionEvent, InterventionRecorder, RecorderStats};
use super::state::{SessionState, SessionSummary};
use super::transcript::ConversationContext;
use super::transport::BoxLiveTransport;
use crate::memory::box_embedder::BoxEmbeddingProvider;
use crate::memory::store::MemoryStore;
use crate::reflection::generator::{Reflection, ReflectionGenerator};
use crate::retrieval::RetrievalEngine;
use crate::tools::registry::ToolRegistry;
use crate::worker::{BackgroundQueue, Shutdown, ShutdownReport};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is closed")]
    Closed(SessionId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Shared collaborators every session of a user needs.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<MemoryStore>,
    pub embedder: Arc<BoxEmbeddingProvider>,
    pub reflection: Arc<ReflectionGenerator>,
    pub tools: Arc<ToolRegistry>,
    pub config: Arc<TetherConfig>,
}

/// Everything known about a session after it closed.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub summary: SessionSummary,
    pub insight: Option<String>,
    pub default_insight: bool,
    pub abandoned_units: u64,
    pub interventions_written: u64,
    pub interventions_dropped: u64,
    pub injections: u64,
}

pub struct LiveSession {
    state: SessionState,
    conversation: ConversationContext,
    injector: ContextInjector,
    recorder: InterventionRecorder,
    store: Arc<MemoryStore>,
    reflection: Arc<ReflectionGenerator>,
    tools: Arc<ToolRegistry>,
    transport: Arc<BoxLiveTransport>,
    queue: Arc<BackgroundQueue>,
    status: SessionStatus,
    /// Assistant text received since the last completed turn.
    pending_assistant: String,
    last_assistant: Option<String>,
    drain_timeout: Duration,
}

impl LiveSession {
    /// Build a session. Must be called inside a tokio runtime.
    pub fn new(id: SessionId, transport: BoxLiveTransport, deps: SessionDeps) -> Self {
        let config = deps.config.as_ref();
        let queue = Arc::new(BackgroundQueue::new(format!("session-{id}"), &config.queue));
        let transport = Arc::new(transport);
        let retrieval = Arc::new(RetrievalEngine::new(
            deps.store.clone(),
            deps.embedder.clone(),
            config,
        ));
        let injector = ContextInjector::new(retrieval, transport.clone(), queue.clone(), config);
        let recorder = InterventionRecorder::new(
            deps.store.clone(),
            deps.embedder.clone(),
            queue.clone(),
            config,
        );

        Self {
            state: SessionState::new(id, deps.store.user_id().clone()),
            conversation: ConversationContext::default(),
            injector,
            recorder,
            store: deps.store,
            reflection: deps.reflection,
            tools: deps.tools,
            transport,
            queue,
            status: SessionStatus::Active,
            pending_assistant: String::new(),
            last_assistant: None,
            drain_timeout: config.timeouts.drain(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.state.session_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.state.user_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn injector_state(&self) -> InjectorState {
        self.injector.state()
    }

    pub fn injection_stats(&self) -> InjectionStats {
        self.injector.stats()
    }

    pub fn recorder_stats(&self) -> RecorderStats {
        self.recorder.stats()
    }

    pub fn transcript(&self) -> Vec<TranscriptMessage> {
        self.conversation.transcript()
    }

    /// Prepare memory and return the instructions to open the provider session with.
    #[tracing::instrument(name = "session.start", skip(self, base_instructions), fields(session_id = %self.id(), user_id = %self.user_id()))]
    pub async fn start(&mut self, base_instructions: &str) -> String {
        if !self.store.ensure_index().await {
            tracing::warn!("starting session without semantic retrieval");
        }
        self.injector.load_static_context(base_instructions).await
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err(SessionError::Closed(self.id()))
        }
    }

    /// Send typed user input, prefixed with any prepared memory block.
    pub async fn send_user_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.conversation.add_user_message(text);
        self.state.record_interaction();
        let outgoing = self.injector.prepare_outgoing(text);
        self.transport.send_text(&outgoing, true).await?;
        Ok(())
    }

    /// Add a user utterance captured out of band (e.g. speech transcription).
    pub fn note_user_utterance(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.conversation.add_user_message(text);
        }
    }

    /// Process one provider event.
    pub async fn handle_event(&mut self, event: LiveEvent) -> Result<(), SessionError> {
        self.ensure_active()?;
        match event {
            LiveEvent::Audio { data } => {
                tracing::trace!(bytes = data.len(), "audio chunk");
            }
            LiveEvent::Text { text } => {
                self.pending_assistant.push_str(&text);
            }
            LiveEvent::ToolCall(call) => self.handle_tool_call(call).await?,
            LiveEvent::TurnComplete => {
                self.on_turn_complete();
            }
        }
        Ok(())
    }

    fn on_turn_complete(&mut self) -> InjectionDecision {
        let text = std::mem::take(&mut self.pending_assistant);
        if !text.trim().is_empty() {
            self.conversation.add_assistant_message(text.clone());
            self.last_assistant = Some(text);
        }
        let decision = self
            .injector
            .on_turn_complete(&self.conversation, self.last_assistant.as_deref());
        tracing::debug!(session_id = %self.id(), ?decision, "turn complete");
        decision
    }

    async fn handle_tool_call(&mut self, call: ToolCall) -> Result<(), SessionError> {
        let task_before = self.state.task_label().map(String::from);
        let output = self.tools.dispatch(&mut self.state, &call.name, &call.args);
        tracing::info!(session_id = %self.id(), tool = %call.name, result = %output.result, "tool call");

        if let Some(outcome) = output.outcome() {
            let task = self.state.task_label().map(String::from).or(task_before);
            let event = InterventionEvent {
                tool_name: call.name.clone(),
                result: output.result.clone(),
                outcome,
                user_utterance: self.conversation.last_user_message().map(String::from),
                task,
            };
            // Rejections are logged and counted by the queue and recorder.
            let _ = self.recorder.record(event);
        }

        self.transport
            .send_tool_response(call.id.as_deref(), &call.name, &output.result)
            .await?;
        Ok(())
    }

    /// Close the session: drain background work, then reflect.
    ///
    /// Always succeeds; a second call returns `None`.
    #[tracing::instrument(name = "session.close", skip(self), fields(session_id = %self.id(), user_id = %self.user_id()))]
    pub async fn close(&mut self) -> Option<SessionReport> {
        if self.status != SessionStatus::Active {
            return None;
        }
        self.status = SessionStatus::Closing;

        let report: ShutdownReport = self.queue.shutdown(Shutdown::Drain(self.drain_timeout)).await;
        if !report.drained {
            tracing::warn!(abandoned = report.abandoned, "background work abandoned at close");
        }

        let transcript = self.conversation.transcript();
        let reflection: Option<Reflection> = if transcript.is_empty() {
            tracing::debug!("empty transcript, skipping reflection");
            None
        } else {
            Some(self.reflection.generate(&self.store, &transcript).await)
        };

        self.status = SessionStatus::Closed;
        let recorder = self.recorder.stats();
        let summary = self.state.summary();
        tracing::info!(
            interactions = summary.interaction_count,
            written = recorder.written,
            "session closed"
        );
        Some(SessionReport {
            summary,
            default_insight: reflection.as_ref().is_some_and(|r| r.is_default),
            insight: reflection.map(|r| r.insight),
            abandoned_units: report.abandoned,
            interventions_written: recorder.written,
            interventions_dropped: recorder.dropped,
            injections: self.injector.stats().injected,
        })
    }
}
