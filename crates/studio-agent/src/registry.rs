//! Keyed store of live conversations, with per-turn stop control.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use studio_core::Transcript;
use studio_core::error::{Result, StudioError};

use crate::conversation::{
    Conversation, ConversationEngine, LoopState, SharedState, TurnOutcome,
};
use crate::sink::ConversationSink;

/// One registered conversation and the token of its running turn, if any.
pub struct ConversationHandle {
    id: String,
    engine: Arc<ConversationEngine>,
    conversation: tokio::sync::Mutex<Conversation>,
    active: Mutex<Option<CancellationToken>>,
    state: SharedState,
}

/// Clears the active token when a turn ends, even if the `send` future is
/// dropped mid-turn.
struct ActiveTurn<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for ActiveTurn<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConversationHandle {
    fn new(conversation: Conversation, engine: Arc<ConversationEngine>) -> Self {
        Self {
            id: conversation.id().to_string(),
            engine,
            state: conversation.shared_state(),
            conversation: tokio::sync::Mutex::new(conversation),
            active: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Process a user message. Fails with [`StudioError::Busy`] while
    /// another message is still being processed.
    pub async fn send(&self, message: &str, sink: &dyn ConversationSink) -> Result<TurnOutcome> {
        let cancel = {
            let mut active = lock(&self.active);
            if active.is_some() {
                return Err(StudioError::Busy(self.id.clone()));
            }
            let token = CancellationToken::new();
            *active = Some(token.clone());
            token
        };
        let _active = ActiveTurn { slot: &self.active };

        // Only snapshot readers can hold the lock here, and only briefly.
        let mut conversation = self.conversation.lock().await;

        Ok(self
            .engine
            .process(&mut conversation, message, &cancel, sink)
            .await)
    }

    /// Signal the running turn to stop. Returns `true` only for the call
    /// that actually cancelled a live turn.
    pub fn stop(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                info!(conversation = %self.id, "Stop requested");
                true
            }
            _ => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Snapshot of the transcript. Waits for a running turn to end.
    pub async fn transcript(&self) -> Transcript {
        self.conversation.lock().await.transcript().snapshot()
    }

    /// Current loop state, observable while a turn is running.
    pub fn state(&self) -> LoopState {
        *lock(&self.state)
    }
}

/// Registry of conversations keyed by id. Each entry's lifetime is
/// independent of the others.
pub struct ConversationRegistry {
    engine: Arc<ConversationEngine>,
    conversations: RwLock<HashMap<String, Arc<ConversationHandle>>>,
}

impl ConversationRegistry {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self {
            engine,
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Create a conversation with a fresh id.
    pub async fn create(&self) -> Arc<ConversationHandle> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(Conversation::new(id)).await
    }

    /// Create a conversation under `id`. Returns the existing handle when
    /// the id is already registered.
    pub async fn create_with_id(&self, id: &str) -> Arc<ConversationHandle> {
        if let Some(existing) = self.get(id).await {
            return existing;
        }
        self.insert(Conversation::new(id)).await
    }

    /// Register a conversation resumed from a saved transcript, replacing
    /// any entry with the same id.
    pub async fn restore(&self, id: &str, transcript: Transcript) -> Arc<ConversationHandle> {
        if let Some(previous) = self.remove(id).await {
            debug!(conversation = %previous.id, "Replacing conversation");
        }
        self.insert(Conversation::with_transcript(id, transcript))
            .await
    }

    async fn insert(&self, conversation: Conversation) -> Arc<ConversationHandle> {
        let mut conversations = self.conversations.write().await;
        let handle = conversations
            .entry(conversation.id().to_string())
            .or_insert_with(|| {
                debug!(conversation = %conversation.id(), "Conversation created");
                Arc::new(ConversationHandle::new(conversation, self.engine.clone()))
            });
        Arc::clone(handle)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<ConversationHandle>> {
        self.conversations.read().await.get(id).cloned()
    }

    /// Remove a conversation, stopping its running turn if there is one.
    pub async fn remove(&self, id: &str) -> Option<Arc<ConversationHandle>> {
        let removed = self.conversations.write().await.remove(id);
        if let Some(handle) = &removed {
            handle.stop();
        }
        removed
    }

    /// Registered ids, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.conversations.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop the running turn of `id`; see [`ConversationHandle::stop`].
    pub async fn stop(&self, id: &str) -> Result<bool> {
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| StudioError::NotFound(id.to_string()))?;
        Ok(handle.stop())
    }

    /// Stop every running turn. Returns how many were signalled.
    pub async fn stop_all(&self) -> usize {
        self.conversations
            .read()
            .await
            .values()
            .filter(|handle| handle.stop())
            .count()
    }
}
