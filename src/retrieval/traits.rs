use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One ranked hit returned by a [`Retriever`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub score: f64,
}

/// Knowledge lookup collaborator. Treated as pure and idempotent: the same
/// query against the same collection returns the same ranking.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ranked documents, best first.
    async fn query(&self, text: &str, collection_id: &str) -> Result<Vec<RetrievedDocument>>;

    /// The name of this retriever implementation.
    fn name(&self) -> &str;
}
