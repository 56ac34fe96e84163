//! Conversation memory and session storage.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use ciceron_core::{CiceronError, Result, Turn};

/// The most recent turns of one conversation, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest ones beyond the bound.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Store a completed (user, assistant) exchange.
    pub fn record_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.push(Turn::user(user));
        self.push(Turn::assistant(assistant));
    }

    /// Snapshot of the stored turns, oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}

/// Keyed storage for per-session memory.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Memory of `session_id`, empty for an unknown session.
    async fn load(&self, session_id: &str) -> Result<ConversationMemory>;

    async fn save(&self, session_id: &str, memory: ConversationMemory) -> Result<()>;

    /// Forget the session's memory.
    async fn end(&self, session_id: &str) -> Result<()>;
}

/// Process-local session store.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, ConversationMemory>>,
    max_turns: usize,
}

impl InMemorySessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, ConversationMemory>>> {
        self.sessions
            .lock()
            .map_err(|e| CiceronError::internal(format!("session store poisoned: {e}")))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<ConversationMemory> {
        Ok(self
            .lock()?
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| ConversationMemory::new(self.max_turns)))
    }

    async fn save(&self, session_id: &str, memory: ConversationMemory) -> Result<()> {
        self.lock()?.insert(session_id.to_string(), memory);
        Ok(())
    }

    async fn end(&self, session_id: &str) -> Result<()> {
        self.lock()?.remove(session_id);
        Ok(())
    }
}
