use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use taskweave_core::api::{CapabilityError, ContextSnippet, Document, Namespace, RetrievalStore};

/// Process-local store ranking documents by query term overlap.
#[derive(Default)]
pub struct InMemoryRetrieval {
    documents: RwLock<HashMap<Namespace, Vec<Document>>>,
}

impl InMemoryRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn score(query: &HashSet<String>, content: &str) -> f32 {
        if query.is_empty() {
            return 0.0;
        }
        let doc = Self::terms(content);
        let hits = query.iter().filter(|t| doc.contains(*t)).count();
        hits as f32 / query.len() as f32
    }
}

#[async_trait]
impl RetrievalStore for InMemoryRetrieval {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(
        &self,
        namespace: &Namespace,
        text: &str,
        k: usize,
    ) -> Result<Vec<ContextSnippet>, CapabilityError> {
        let query = Self::terms(text);
        let documents = self.documents.read().await;
        let Some(docs) = documents.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, &Document)> = docs
            .iter()
            .map(|d| (Self::score(&query, &d.content), d))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // Stable sort keeps insertion order between equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, doc)| ContextSnippet {
                content: doc.content.clone(),
                source: doc.source.clone().or_else(|| Some(doc.id.clone())),
                score: Some(score),
                namespace: Some(namespace.to_string()),
            })
            .collect())
    }

    async fn upsert(&self, namespace: &Namespace, document: Document) -> Result<(), CapabilityError> {
        let mut documents = self.documents.write().await;
        let docs = documents.entry(namespace.clone()).or_default();
        match docs.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        Ok(())
    }
}
