use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::ChatMessage;

pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded rolling window of the most recent canonical messages.
///
/// `push` is the only mutator; insertion past capacity silently evicts the
/// oldest entry. `snapshot` hands out an owned copy so concurrent readers can
/// never observe a torn buffer while a push is in progress.
#[derive(Clone)]
pub struct MessageBuffer {
    inner: Arc<RwLock<VecDeque<ChatMessage>>>,
    capacity: usize,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, message: ChatMessage) {
        let mut guard = self.inner.write().await;
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(message);
    }

    /// Ordered copy of the window, oldest first / newest last.
    pub async fn snapshot(&self) -> Vec<ChatMessage> {
        self.inner.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
