//! In-memory `MessageStore` implementation.
//!
//! Keeps the most recent `capacity` chat messages; older entries are evicted
//! first. History does not survive a restart.

use std::{collections::VecDeque, sync::Arc};

use agora_shared::time::Clock;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{MessageStore, StoreError, StoredMessage};

struct History {
    next_id: u64,
    messages: VecDeque<StoredMessage>,
}

pub struct InMemoryMessageStore {
    history: Mutex<History>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryMessageStore {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            history: Mutex::new(History {
                next_id: 1,
                messages: VecDeque::with_capacity(capacity),
            }),
            capacity,
            clock,
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn save(&self, username: String, content: String) -> Result<(), StoreError> {
        if self.capacity == 0 {
            return Err(StoreError::Unavailable("history is disabled".to_string()));
        }

        let mut history = self.history.lock().await;
        let id = history.next_id;
        history.next_id += 1;
        history.messages.push_back(StoredMessage {
            id,
            username,
            content,
            created_at: self.clock.now(),
        });
        while history.messages.len() > self.capacity {
            history.messages.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>, StoreError> {
        let history = self.history.lock().await;
        Ok(history.messages.iter().rev().take(limit).cloned().collect())
    }
}
