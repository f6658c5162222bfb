//! Canned capabilities for in-crate tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    Capabilities, CompletionRequest, ContextSnippet, Document, Namespace, NoRetry,
    ProvisioningCapability, ReasoningCapability, ResourceHandle, RetrievalStore,
    SandboxCapability, SandboxOutcome,
};
use crate::error::CapabilityError;

/// Answers every reasoning call with the same reply, or rejects it when
/// there is none. Retrieval is empty and the sandbox always passes.
pub(crate) struct Canned {
    reply: Option<String>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl Canned {
    pub(crate) fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn offline() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn capabilities(self: &Arc<Self>) -> Capabilities {
        Capabilities {
            reasoning: self.clone(),
            retrieval: self.clone(),
            sandbox: self.clone(),
            provisioning: self.clone(),
            retry: Arc::new(NoRetry),
        }
    }
}

#[async_trait]
impl ReasoningCapability for Canned {
    fn name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        self.calls.lock().unwrap().push(request);
        self.reply
            .clone()
            .ok_or_else(|| CapabilityError::Rejected("offline".into()))
    }
}

#[async_trait]
impl RetrievalStore for Canned {
    fn name(&self) -> &str {
        "canned"
    }

    async fn query(
        &self,
        _namespace: &Namespace,
        _text: &str,
        _k: usize,
    ) -> Result<Vec<ContextSnippet>, CapabilityError> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _namespace: &Namespace, _document: Document) -> Result<(), CapabilityError> {
        Ok(())
    }
}

#[async_trait]
impl SandboxCapability for Canned {
    fn name(&self) -> &str {
        "canned"
    }

    async fn run(&self, _artifact: &str, _tests: &[String]) -> Result<SandboxOutcome, CapabilityError> {
        Ok(SandboxOutcome {
            passed: true,
            log: String::new(),
        })
    }
}

#[async_trait]
impl ProvisioningCapability for Canned {
    fn name(&self) -> &str {
        "canned"
    }

    async fn provision(&self, spec: &str) -> Result<ResourceHandle, CapabilityError> {
        Ok(ResourceHandle {
            id: spec.to_string(),
            details: None,
        })
    }
}
