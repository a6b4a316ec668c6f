use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use super::traits::{RetrievedDocument, Retriever};
use crate::tools::InMemoryRecords;

/// Token-overlap retriever over named document collections.
///
/// Scores are the Jaccard index between the query's and the document's
/// lowercase alphanumeric token sets. Documents sharing no token are dropped.
#[derive(Debug, Clone)]
pub struct InMemoryRetriever {
    collections: HashMap<String, Vec<Document>>,
    top_k: usize,
}

#[derive(Debug, Clone)]
struct Document {
    content: String,
    tokens: BTreeSet<String>,
}

impl Default for InMemoryRetriever {
    fn default() -> Self {
        Self::new(3)
    }
}

impl InMemoryRetriever {
    pub fn new(top_k: usize) -> Self {
        Self {
            collections: HashMap::new(),
            top_k: top_k.max(1),
        }
    }

    pub fn add_document(&mut self, collection_id: &str, content: impl Into<String>) {
        let content = content.into();
        let tokens = tokenize(&content);
        self.collections
            .entry(collection_id.to_string())
            .or_default()
            .push(Document { content, tokens });
    }

    pub fn with_documents<I, S>(mut self, collection_id: &str, documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for doc in documents {
            self.add_document(collection_id, doc);
        }
        self
    }

    /// Load a JSON file of the form `{"collection": ["doc", ...], ...}`.
    pub fn from_json_file(path: &Path, top_k: usize) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge base {}", path.display()))?;
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse knowledge base {}", path.display()))?;
        let mut retriever = Self::new(top_k);
        for (collection, docs) in parsed {
            for doc in docs {
                retriever.add_document(&collection, doc);
            }
        }
        Ok(retriever)
    }

    /// One document per product record, rendered as `name: field=value, ...`.
    pub fn from_products(collection_id: &str, products: &InMemoryRecords, top_k: usize) -> Self {
        let mut entries: Vec<_> = products.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut retriever = Self::new(top_k);
        for (name, record) in entries {
            let fields = record
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .map(|(k, v)| match v.as_str() {
                            Some(s) => format!("{k}={s}"),
                            None => format!("{k}={v}"),
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_else(|| record.to_string());
            retriever.add_document(collection_id, format!("{name}: {fields}"));
        }
        retriever
    }

    pub fn document_count(&self, collection_id: &str) -> usize {
        self.collections.get(collection_id).map_or(0, Vec::len)
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    if intersection == 0 {
        return 0.0;
    }
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn query(&self, text: &str, collection_id: &str) -> Result<Vec<RetrievedDocument>> {
        let Some(docs) = self.collections.get(collection_id) else {
            return Ok(Vec::new());
        };
        let query = tokenize(text);

        let mut scored: Vec<(usize, f64)> = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| (i, jaccard(&query, &doc.tokens)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(i, score)| RetrievedDocument {
                content: docs[i].content.clone(),
                score,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retriever() -> InMemoryRetriever {
        InMemoryRetriever::new(2).with_documents(
            "faq",
            [
                "Returns are accepted within 30 days of delivery",
                "Shipping is free on orders over 100 dollars",
                "Gift cards cannot be returned",
            ],
        )
    }

    #[tokio::test]
    async fn ranks_by_overlap_and_limits_results() {
        let hits = retriever().query("are returns accepted on orders?", "faq").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].content.starts_with("Returns are accepted"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn unknown_collection_and_no_overlap_are_empty() {
        let r = retriever();
        assert!(r.query("returns", "nope").await.unwrap().is_empty());
        assert!(r.query("zebra", "faq").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_queries_are_identical() {
        let r = retriever();
        let a = r.query("shipping orders", "faq").await.unwrap();
        let b = r.query("shipping orders", "faq").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn product_records_become_documents() {
        let r =
            InMemoryRetriever::from_products("products", &InMemoryRecords::sample_products(), 3);
        assert_eq!(r.document_count("products"), 3);
        let hits = r.query("tell me about the gizmo", "products").await.unwrap();
        assert!(hits[0].content.starts_with("Gizmo C:"));
        assert!(hits[0].content.contains("description=A wonderful gizmo"));
    }

    #[test]
    fn loads_collections_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, r#"{"faq": ["one doc", "two doc"], "other": []}"#).unwrap();
        let r = InMemoryRetriever::from_json_file(&path, 3).unwrap();
        assert_eq!(r.document_count("faq"), 2);
        assert_eq!(r.document_count("other"), 0);
    }
}
