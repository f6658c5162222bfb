use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Node;
use crate::capability::{call_with_retry, Capabilities, ContextSnippet, Namespace};
use crate::error::{CapabilityError, NodeExecutionError};
use crate::state::JobState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieveUpdate {
    pub snippets: Vec<ContextSnippet>,
}

/// Queries the caller's tenant namespace and the global namespace.
pub struct Retriever {
    top_k: usize,
}

impl Retriever {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    async fn query(
        &self,
        caps: &Capabilities,
        namespace: &Namespace,
        text: &str,
    ) -> Result<Vec<ContextSnippet>, CapabilityError> {
        let call_site = format!("retrieve:{namespace}");
        call_with_retry(caps.retry.as_ref(), &call_site, || {
            caps.retrieval.query(namespace, text, self.top_k)
        })
        .await
    }
}

/// 64-bit hash of whitespace-normalized content.
pub fn content_hash(content: &str) -> u64 {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}

/// Tenant results first, then global, each capped at `k`, duplicates dropped.
pub fn merge_snippets(
    tenant: Vec<ContextSnippet>,
    global: Vec<ContextSnippet>,
    k: usize,
    tenant_ns: &Namespace,
) -> Vec<ContextSnippet> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    let batches = [(tenant, tenant_ns.to_string()), (global, Namespace::Global.to_string())];
    for (batch, namespace) in batches {
        for mut snippet in batch.into_iter().take(k) {
            if !seen.insert(content_hash(&snippet.content)) {
                continue;
            }
            snippet.namespace.get_or_insert_with(|| namespace.clone());
            merged.push(snippet);
        }
    }
    merged
}

#[async_trait]
impl Node for Retriever {
    type Update = RetrieveUpdate;

    fn role(&self) -> &'static str {
        "retriever"
    }

    async fn run(
        &self,
        state: &JobState,
        caps: &Capabilities,
    ) -> Result<RetrieveUpdate, NodeExecutionError> {
        let text = state.request_text();
        let tenant_ns = Namespace::Tenant(state.user_id.clone());
        let global_ns = Namespace::Global;

        let (tenant, global) = futures::join!(
            self.query(caps, &tenant_ns, &text),
            self.query(caps, &global_ns, &text)
        );

        let unwrap_or_warn = |result: Result<Vec<ContextSnippet>, CapabilityError>,
                                  namespace: &Namespace| {
            result.unwrap_or_else(|e| {
                tracing::warn!(
                    target: "taskweave.nodes",
                    job_id = %state.job_id,
                    namespace = %namespace,
                    error = %e,
                    "retrieval failed, continuing without this namespace"
                );
                Vec::new()
            })
        };
        let tenant = unwrap_or_warn(tenant, &tenant_ns);
        let global = unwrap_or_warn(global, &global_ns);

        let snippets = merge_snippets(tenant, global, self.top_k, &tenant_ns);
        tracing::debug!(
            target: "taskweave.nodes",
            job_id = %state.job_id,
            snippets = snippets.len(),
            "context retrieved"
        );
        Ok(RetrieveUpdate { snippets })
    }
}
