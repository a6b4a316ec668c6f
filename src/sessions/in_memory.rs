//! In-memory conversation store implementation.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{ConversationStore, Message, SessionKey};

/// An in-memory store backed by a mutex-protected hash map.
///
/// Each `append` takes the lock once and extends the session log with the
/// whole batch, so concurrent turns on one key are serialized.
pub struct InMemoryConversationStore {
    sessions: Mutex<HashMap<SessionKey, Vec<Message>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of sessions that have at least one message.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, key: &SessionKey) -> Result<Vec<Message>> {
        let sessions = self.sessions.lock();
        Ok(sessions.get(key).cloned().unwrap_or_default())
    }

    async fn append(&self, key: &SessionKey, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut sessions = self.sessions.lock();
        sessions.entry(key.clone()).or_default().extend(messages);
        Ok(())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::window::TruncationPolicy;
    use std::sync::Arc;

    fn test_key() -> SessionKey {
        SessionKey::new("test-user", "test-session")
    }

    #[tokio::test]
    async fn load_returns_empty_for_unseen_session() {
        let store = InMemoryConversationStore::new();
        assert!(store.load(&test_key()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_preserves_order_across_calls() {
        let store = InMemoryConversationStore::new();
        let key = test_key();

        store
            .append(&key, vec![Message::user("one"), Message::assistant("two")])
            .await
            .unwrap();
        let before = store.load(&key).await.unwrap();
        store
            .append(&key, vec![Message::user("three")])
            .await
            .unwrap();

        let after = store.load(&key).await.unwrap();
        assert_eq!(&after[..before.len()], &before[..]);
        let texts: Vec<String> = after.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryConversationStore::new();
        store
            .append(&SessionKey::new("u1", "s"), vec![Message::user("a")])
            .await
            .unwrap();
        store
            .append(&SessionKey::new("u2", "s"), vec![Message::user("b")])
            .await
            .unwrap();

        assert_eq!(store.session_count(), 2);
        let u1 = store.load(&SessionKey::new("u1", "s")).await.unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0].text(), "a");
    }

    #[tokio::test]
    async fn empty_append_does_not_create_session() {
        let store = InMemoryConversationStore::new();
        store.append(&test_key(), Vec::new()).await.unwrap();
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_appends_never_interleave_pairs() {
        let store = Arc::new(InMemoryConversationStore::new());
        let key = test_key();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(
                        &key,
                        vec![
                            Message::user(format!("q{i}")),
                            Message::assistant(format!("a{i}")),
                        ],
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.load(&key).await.unwrap();
        assert_eq!(history.len(), 32);
        for pair in history.chunks(2) {
            let q = pair[0].text();
            let a = pair[1].text();
            assert_eq!(q[1..], a[1..], "turn split: {q} / {a}");
        }
    }

    #[tokio::test]
    async fn truncate_returns_window_without_rewriting_log() {
        let store = InMemoryConversationStore::new();
        let key = test_key();
        for i in 0..5 {
            store
                .append(&key, vec![Message::user(format!("m{i}"))])
                .await
                .unwrap();
        }

        let window = store
            .truncate(&key, &TruncationPolicy::messages(2))
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].text(), "m3");
        assert_eq!(store.load(&key).await.unwrap().len(), 5);
    }
}
