//! OpenAI-compatible chat completion client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use taskweave_core::api::{
    CapabilityError, CompletionRequest, Purpose, ReasoningCapability, ReasoningConfig,
};

use crate::http::{auth, build_client, parse_json_response, HttpError};

const SYSTEM_PROMPT: &str = "You are one agent in an automated software build pipeline. \
Follow the instructions exactly and answer only with what is asked for.";

pub struct ChatCompletionClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ChatCompletionClient {
    pub fn new(cfg: &ReasoningConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms);
        Ok(Self {
            http: build_client(timeout)?,
            url: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            timeout,
        })
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut system = SYSTEM_PROMPT.to_string();
        if let Some(schema) = &request.response_schema {
            system.push_str("\nRespond with a single JSON object matching this schema:\n");
            system.push_str(&schema.to_string());
        }

        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request.prompt },
            ],
        });
        if request.response_schema.is_some() {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    fn content(value: &Value) -> Option<&str> {
        value
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
    }
}

#[async_trait]
impl ReasoningCapability for ChatCompletionClient {
    fn name(&self) -> &str {
        "chat-completion"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        let purpose: Purpose = request.purpose;
        tracing::debug!(
            target: "taskweave.reasoning",
            url = %self.url,
            model = %self.model,
            purpose = purpose.as_str(),
            prompt_len = request.prompt.len(),
            structured = request.response_schema.is_some(),
            "chat completion request"
        );

        let req = self.http.post(&self.url).json(&self.body(&request));
        let resp = auth(req, &self.api_key)
            .send()
            .await
            .map_err(|err| HttpError::from_reqwest(err, self.url.clone(), self.timeout))?;
        let status = resp.status();
        let value = parse_json_response(resp, self.timeout).await?;

        let content = Self::content(&value)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                CapabilityError::InvalidResponse("completion without message content".into())
            })?;

        tracing::debug!(
            target: "taskweave.reasoning",
            purpose = purpose.as_str(),
            status = %status,
            response_len = content.len(),
            "chat completion response"
        );
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config(url: String, api_key: &str) -> ReasoningConfig {
        ReasoningConfig {
            base_url: url,
            api_key: api_key.to_string(),
            model: "test-model".into(),
            timeout_ms: 1_000,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "response_format": { "type": "json_object" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": " {\"tasks\": []} "}}]}"#)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(&config(server.url(), "secret")).unwrap();
        let out = client
            .complete(CompletionRequest::structured(
                Purpose::Plan,
                "plan it",
                json!({"type": "object"}),
            ))
            .await
            .unwrap();
        assert_eq!(out, r#"{"tasks": []}"#);
    }

    #[tokio::test]
    async fn test_plain_request_sends_prompt_without_schema() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Regex(r#""content":"build it""#.into()))
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "artifact"}}]}"#)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(&config(server.url(), "")).unwrap();
        let out = client
            .complete(CompletionRequest::text(Purpose::Build, "build it"))
            .await
            .unwrap();
        assert_eq!(out, "artifact");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = ChatCompletionClient::new(&config(server.url(), "")).unwrap();
        let err = client
            .complete(CompletionRequest::text(Purpose::Build, "x"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "   "}}]}"#)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(&config(server.url(), "")).unwrap();
        let err = client
            .complete(CompletionRequest::text(Purpose::Aggregate, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidResponse(_)));
    }
}
