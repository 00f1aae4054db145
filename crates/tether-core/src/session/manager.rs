//! Owner of all live sessions in the process.

use std::sync::Arc;

use dashmap::DashMap;
use tether_types::config::TetherConfig;
use tether_types::memory::UserId;
use tether_types::session::SessionId;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::live::{LiveSession, SessionDeps, SessionReport};
use super::transport::BoxLiveTransport;
use crate::memory::box_embedder::BoxEmbeddingProvider;
use crate::memory::box_vector::BoxVectorIndex;
use crate::memory::clock::KeyClock;
use crate::memory::store::MemoryStore;
use crate::reflection::generator::ReflectionGenerator;
use crate::tools::registry::ToolRegistry;

pub type SessionHandle = Arc<Mutex<LiveSession>>;

/// Sessions keyed by id. Stores writing to the same user partition share
/// one key clock so their keys never collide.
pub struct SessionManager {
    sessions: DashMap<SessionId, SessionHandle>,
    clocks: DashMap<UserId, Arc<KeyClock>>,
    index: Arc<BoxVectorIndex>,
    embedder: Arc<BoxEmbeddingProvider>,
    reflection: Arc<ReflectionGenerator>,
    tools: Arc<ToolRegistry>,
    config: Arc<TetherConfig>,
}

impl SessionManager {
    pub fn new(
        index: Arc<BoxVectorIndex>,
        embedder: Arc<BoxEmbeddingProvider>,
        reflection: Arc<ReflectionGenerator>,
        tools: Arc<ToolRegistry>,
        config: Arc<TetherConfig>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            clocks: DashMap::new(),
            index,
            embedder,
            reflection,
            tools,
            config,
        }
    }

    /// A store for `user_id` sharing the manager's per-user key clock.
    pub fn store_for(&self, user_id: &UserId) -> MemoryStore {
        let clock = self
            .clocks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(KeyClock::new()))
            .clone();
        MemoryStore::new(user_id.clone(), self.index.clone(), &self.config).with_clock(clock)
    }

    /// Open and start a session. Returns its id and the instructions to
    /// open the provider connection with.
    pub async fn open(
        &self,
        user_id: UserId,
        transport: BoxLiveTransport,
        base_instructions: &str,
    ) -> (SessionId, String) {
        let deps = SessionDeps {
            store: Arc::new(self.store_for(&user_id)),
            embedder: self.embedder.clone(),
            reflection: self.reflection.clone(),
            tools: self.tools.clone(),
            config: self.config.clone(),
        };
        let id = Uuid::now_v7();
        let mut session = LiveSession::new(id, transport, deps);
        let instructions = session.start(base_instructions).await;
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %id, user_id = %user_id, "session opened");
        (id, instructions)
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove and close a session.
    pub async fn close(&self, id: &SessionId) -> Option<SessionReport> {
        let (_, handle) = self.sessions.remove(id)?;
        let mut session = handle.lock().await;
        session.close().await
    }

    /// Close every open session.
    pub async fn shutdown(&self) -> Vec<SessionReport> {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(report) = self.close(&id).await {
                reports.push(report);
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tether_types::session::{LiveEvent, ToolCall};

    use super::*;
    use crate::reflection::box_summarizer::BoxSummarizationProvider;
    use crate::session::transport::mock::RecordingTransport;
    use crate::test_support::{HashingEmbedder, InMemoryIndex, MockSummarizer, TEST_DIM};

    fn manager() -> SessionManager {
        let config = Arc::new(TetherConfig::default());
        SessionManager::new(
            Arc::new(BoxVectorIndex::new(InMemoryIndex::new())),
            Arc::new(BoxEmbeddingProvider::new(HashingEmbedder::new(TEST_DIM))),
            Arc::new(ReflectionGenerator::new(
                Arc::new(BoxSummarizationProvider::new(MockSummarizer::ok("insight"))),
                &config,
            )),
            Arc::new(ToolRegistry::with_builtins()),
            config,
        )
    }

    fn transport() -> BoxLiveTransport {
        BoxLiveTransport::new(RecordingTransport::default())
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let manager = manager();
        let user = UserId::parse("dana").unwrap();
        let (id, instructions) = manager.open(user, transport(), "base").await;
        assert!(instructions.starts_with("base"));
        assert_eq!(manager.active_count(), 1);

        {
            let handle = manager.get(&id).unwrap();
            let mut session = handle.lock().await;
            session
                .handle_event(LiveEvent::ToolCall(ToolCall {
                    id: None,
                    name: "sensory_check".into(),
                    args: json!({}),
                }))
                .await
                .unwrap();
        }

        let report = manager.close(&id).await.unwrap();
        assert_eq!(report.interventions_written, 1);
        assert_eq!(manager.active_count(), 0);
        assert!(manager.close(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_sessions_for_one_user_get_distinct_keys() {
        let manager = manager();
        let user = UserId::parse("erin").unwrap();
        let (a, _) = manager.open(user.clone(), transport(), "base").await;
        let (b, _) = manager.open(user.clone(), transport(), "base").await;
        assert_ne!(a, b);

        for id in [a, b] {
            let handle = manager.get(&id).unwrap();
            let mut session = handle.lock().await;
            for _ in 0..3 {
                session
                    .handle_event(LiveEvent::ToolCall(ToolCall {
                        id: None,
                        name: "log_win".into(),
                        args: json!({"description": "did a thing"}),
                    }))
                    .await
                    .unwrap();
            }
        }

        let reports = manager.shutdown().await;
        assert_eq!(reports.len(), 2);
        let store = manager.store_for(&user);
        assert_eq!(store.get_stats().await.interventions, 6);
    }
}
