use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// Retrieval partition. Tenant namespaces are never queried for another user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    Tenant(String),
    Global,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(user_id) => write!(f, "tenant:{user_id}"),
            Self::Global => f.write_str("global"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
    /// Namespace the snippet came from, filled in by the retriever.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ContextSnippet {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: None,
            score: None,
            namespace: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Vector/document store holding per-tenant and global knowledge.
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    fn name(&self) -> &str;
    async fn query(
        &self,
        namespace: &Namespace,
        text: &str,
        k: usize,
    ) -> Result<Vec<ContextSnippet>, CapabilityError>;
    /// Write path used by the post-job learning step; the engine itself only reads.
    async fn upsert(&self, namespace: &Namespace, document: Document) -> Result<(), CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_rendering() {
        assert_eq!(Namespace::Tenant("u-42".into()).to_string(), "tenant:u-42");
        assert_eq!(Namespace::Global.to_string(), "global");
    }
}
