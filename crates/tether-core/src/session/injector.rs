//! Turn-aware memory injection.
//!
//! The injector lives for one live session. The static memory context is
//! merged into the initial instructions once; afterwards each completed
//! assistant turn may trigger one background retrieval whose result is
//! delivered either ahead of the next user message or as a priming turn.
//!
//! ```text
//! Idle -> ContextLoaded -> Listening <-> Injecting
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tether_types::config::{InjectionPolicy, InjectionTransport, TetherConfig};

use super::query::derive_query;
use super::transcript::ConversationContext;
use super::transport::BoxLiveTransport;
use crate::retrieval::RetrievalEngine;
use crate::worker::{BackgroundQueue, SubmitError};

/// Wrap retrieved examples so the model can tell them apart from user input.
pub fn memory_block(context: &str) -> String {
    format!(
        "<memory_context>\n{context}\n\nUse these similar past successful interventions as reference for your responses.\n</memory_context>"
    )
}

/// Merge the static prompt context into the session's base instructions.
pub fn merge_static_context(base: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return base.to_string();
    }
    format!("{base}\n\n---\nPERSONALIZED CONTEXT FROM MEMORY:\n{context}\n---")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectorState {
    Idle,
    ContextLoaded,
    Listening,
    Injecting,
}

/// What `on_turn_complete` did with the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionDecision {
    /// Static context has not been loaded yet.
    NotListening,
    /// Still inside the configured warm-up turns.
    SkippedWarmup,
    NoQuery,
    TooShort,
    /// Same query as the previous attempt.
    Duplicate,
    /// A previous retrieval is still in flight.
    Busy,
    Submitted { query: String },
    /// The background queue refused the unit.
    Rejected(SubmitError),
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectionStats {
    pub attempts: u64,
    pub injected: u64,
}

/// Clears the in-flight flag when the background unit ends or is cancelled.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ContextInjector {
    retrieval: Arc<RetrievalEngine>,
    transport: Arc<BoxLiveTransport>,
    queue: Arc<BackgroundQueue>,
    policy: InjectionPolicy,
    k: usize,
    loaded: bool,
    completed_turns: u32,
    last_query: Option<String>,
    injecting: Arc<AtomicBool>,
    pending: Arc<Mutex<Option<String>>>,
    attempts: u64,
    injected: Arc<AtomicU64>,
}

impl ContextInjector {
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        transport: Arc<BoxLiveTransport>,
        queue: Arc<BackgroundQueue>,
        config: &TetherConfig,
    ) -> Self {
        Self {
            retrieval,
            transport,
            queue,
            policy: config.injection.clone(),
            k: config.retrieval.k,
            loaded: false,
            completed_turns: 0,
            last_query: None,
            injecting: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(Mutex::new(None)),
            attempts: 0,
            injected: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> InjectorState {
        if !self.loaded {
            InjectorState::Idle
        } else if self.injecting.load(Ordering::Acquire) {
            InjectorState::Injecting
        } else if self.completed_turns == 0 {
            InjectorState::ContextLoaded
        } else {
            InjectorState::Listening
        }
    }

    pub fn stats(&self) -> InjectionStats {
        InjectionStats {
            attempts: self.attempts,
            injected: self.injected.load(Ordering::Relaxed),
        }
    }

    /// Fetch the static memory context once and merge it into `base_instructions`.
    ///
    /// Later calls return `base_instructions` unchanged.
    #[tracing::instrument(
        name = "injector.load_static_context",
        skip(self, base_instructions),
        fields(user_id = %self.retrieval.store().user_id())
    )]
    pub async fn load_static_context(&mut self, base_instructions: &str) -> String {
        if self.loaded {
            return base_instructions.to_string();
        }
        self.loaded = true;
        let context = self.retrieval.store().get_context_for_prompt().await;
        merge_static_context(base_instructions, &context)
    }

    /// React to the assistant finishing a turn.
    ///
    /// Never waits on retrieval: the lookup runs on the background queue.
    pub fn on_turn_complete(
        &mut self,
        context: &ConversationContext,
        last_assistant: Option<&str>,
    ) -> InjectionDecision {
        if !self.loaded {
            return InjectionDecision::NotListening;
        }
        self.completed_turns += 1;
        if self.completed_turns <= self.policy.skip_turns {
            return InjectionDecision::SkippedWarmup;
        }

        let Some(query) = derive_query(context, last_assistant, &self.policy) else {
            return InjectionDecision::NoQuery;
        };
        if query.chars().count() < self.policy.min_query_chars {
            return InjectionDecision::TooShort;
        }
        if self.policy.dedup && self.last_query.as_deref() == Some(query.as_str()) {
            tracing::trace!("skipping duplicate retrieval query");
            return InjectionDecision::Duplicate;
        }
        if self
            .injecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return InjectionDecision::Busy;
        }

        let in_flight = InFlight(self.injecting.clone());
        let retrieval = self.retrieval.clone();
        let transport = self.transport.clone();
        let pending = self.pending.clone();
        let injected = self.injected.clone();
        let mode = self.policy.transport;
        let k = self.k;
        let job_query = query.clone();

        let submitted = self.queue.submit(async move {
            let _in_flight = in_flight;
            let context = retrieval.get_dynamic_context(&job_query, k).await;
            if context.is_empty() {
                return;
            }
            let block = memory_block(&context);
            let block_chars = block.len();
            match mode {
                InjectionTransport::PrependToNextMessage => {
                    *pending.lock().expect("pending context lock poisoned") = Some(block);
                    injected.fetch_add(1, Ordering::Relaxed);
                }
                InjectionTransport::PrimingMessage => match transport.send_text(&block, true).await {
                    Ok(()) => {
                        injected.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to send memory context"),
                },
            }
            tracing::debug!(chars = block_chars, "memory context prepared");
        });

        match submitted {
            Ok(()) => {
                self.attempts += 1;
                self.last_query = Some(query.clone());
                InjectionDecision::Submitted { query }
            }
            // The rejected future (and its in-flight guard) was dropped by the queue.
            Err(e) => InjectionDecision::Rejected(e),
        }
    }

    /// Take the prepared block, if one is waiting.
    pub fn take_pending(&self) -> Option<String> {
        self.pending
            .lock()
            .expect("pending context lock poisoned")
            .take()
    }

    /// Prefix `user_text` with any waiting memory block.
    pub fn prepare_outgoing(&self, user_text: &str) -> String {
        match self.take_pending() {
            Some(block) => format!("{block}\n\n{user_text}"),
            None => user_text.to_string(),
        }
    }
}
