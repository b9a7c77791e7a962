use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chat::ChatSession;
use crate::llm_interaction::CompletionGateway;

pub type SessionId = Uuid;
pub type SessionHandle = Arc<Mutex<ChatSession>>;

struct Entry {
    session: SessionHandle,
    last_seen: Instant,
}

/// Isolated chat sessions keyed by id. Sessions share only the gateway; each
/// one sits behind its own mutex, held for the length of a turn.
#[derive(Clone)]
pub struct SessionRegistry {
    gateway: CompletionGateway,
    sessions: Arc<RwLock<HashMap<SessionId, Entry>>>,
    max_idle: Duration,
}

impl SessionRegistry {
    pub fn new(gateway: CompletionGateway, max_idle: Duration) -> Self {
        Self {
            gateway,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_idle,
        }
    }

    pub async fn create(&self) -> SessionId {
        self.insert_new().await.0
    }

    async fn insert_new(&self) -> (SessionId, SessionHandle) {
        self.prune_idle(self.max_idle).await;
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(ChatSession::new(self.gateway.clone())));
        let entry = Entry {
            session: session.clone(),
            last_seen: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        info!(session = %id, "Session created");
        (id, session)
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&id).map(|entry| {
            entry.last_seen = Instant::now();
            entry.session.clone()
        })
    }

    /// Existing session for `id`, or a fresh one. The returned id is the one to use.
    pub async fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, SessionHandle) {
        if let Some(id) = id {
            if let Some(session) = self.get(id).await {
                return (id, session);
            }
            debug!(session = %id, "Unknown session, creating a new one");
        }
        self.insert_new().await
    }

    #[cfg(test)]
    async fn remove(&self, id: SessionId) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Drops sessions not touched within `max_idle`. Returns how many were dropped.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() <= max_idle);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "Pruned idle sessions");
        }
        pruned
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
