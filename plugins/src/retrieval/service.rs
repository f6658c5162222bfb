use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use taskweave_core::api::{
    CapabilityError, ContextSnippet, Document, HttpRetrievalConfig, Namespace, RetrievalStore,
};

use crate::http::{auth, build_client, ensure_success, parse_json_response, HttpError};

#[derive(Debug, Serialize)]
struct SearchPayload<'a> {
    namespace: String,
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Serialize)]
struct UpsertPayload<'a> {
    namespace: String,
    #[serde(flatten)]
    document: &'a Document,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    content: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    score: Option<f32>,
}

/// Remote knowledge-base service.
#[derive(Clone)]
pub struct HttpRetrieval {
    http: reqwest::Client,
    api_key: String,
    timeout: Duration,
    url_search: String,
    url_documents: String,
}

impl HttpRetrieval {
    pub fn new(cfg: &HttpRetrievalConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms);
        let normalized = cfg.base_url.trim_end_matches('/');
        Ok(Self {
            http: build_client(timeout)?,
            api_key: cfg.api_key.clone(),
            timeout,
            url_search: format!("{}/v1/search", normalized),
            url_documents: format!("{}/v1/documents", normalized),
        })
    }
}

#[async_trait]
impl RetrievalStore for HttpRetrieval {
    fn name(&self) -> &str {
        "http"
    }

    async fn query(
        &self,
        namespace: &Namespace,
        text: &str,
        k: usize,
    ) -> Result<Vec<ContextSnippet>, CapabilityError> {
        let url = &self.url_search;
        tracing::debug!(
            target: "taskweave.retrieval",
            url = %url,
            namespace = %namespace,
            query_len = text.len(),
            limit = k,
            "search"
        );
        let payload = SearchPayload {
            namespace: namespace.to_string(),
            query: text,
            limit: k,
        };
        let req = self.http.post(url).json(&payload);
        let resp = auth(req, &self.api_key)
            .send()
            .await
            .map_err(|err| HttpError::from_reqwest(err, url.clone(), self.timeout))?;
        let value = parse_json_response(resp, self.timeout).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }

        let parsed: SearchResponse = serde_json::from_value(value)
            .map_err(|e| CapabilityError::InvalidResponse(format!("search response: {e}")))?;
        Ok(parsed
            .results
            .into_iter()
            .take(k)
            .map(|hit| ContextSnippet {
                content: hit.content,
                source: hit.source,
                score: hit.score,
                namespace: Some(namespace.to_string()),
            })
            .collect())
    }

    async fn upsert(&self, namespace: &Namespace, document: Document) -> Result<(), CapabilityError> {
        let url = &self.url_documents;
        let payload = UpsertPayload {
            namespace: namespace.to_string(),
            document: &document,
        };
        let req = self.http.post(url).json(&payload);
        let resp = auth(req, &self.api_key)
            .send()
            .await
            .map_err(|err| HttpError::from_reqwest(err, url.clone(), self.timeout))?;
        ensure_success(resp, self.timeout).await?;
        tracing::debug!(target: "taskweave.retrieval", namespace = %namespace, id = %document.id, "document upserted");
        Ok(())
    }
}
