//! Knowledge retrieval collaborators consulted by generative agents.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemoryRetriever;
pub use traits::{RetrievedDocument, Retriever};
