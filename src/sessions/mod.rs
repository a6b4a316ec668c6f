//! Conversation state: session-keyed, append-only message logs.

pub mod in_memory;
pub mod traits;
pub mod window;

pub use in_memory::InMemoryConversationStore;
pub use traits::{ContentBlock, ConversationStore, Message, Role, SessionKey};
pub use window::{truncate_history, TruncationPolicy};

/// Create a default in-memory conversation store.
pub fn create_conversation_store() -> Box<dyn ConversationStore> {
    Box::new(InMemoryConversationStore::new())
}
