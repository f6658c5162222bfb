//! External collaborators consumed through narrow interfaces.
//!
//! The core never talks to a model, a vector store, a sandbox or a cloud
//! provider directly; nodes receive a [`Capabilities`] bundle and every call
//! goes through [`call_with_retry`].

mod provision;
mod reasoning;
mod retrieval;
mod retry;
mod sandbox;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use provision::{ProvisioningCapability, ResourceHandle};
pub use reasoning::{CompletionRequest, Purpose, ReasoningCapability};
pub use retrieval::{ContextSnippet, Document, Namespace, RetrievalStore};
pub use retry::{call_with_retry, Backoff, BackoffCurve, NoRetry, RetryStrategy};
pub use sandbox::{SandboxCapability, SandboxOutcome};

/// Injected capability set shared (read-only) by every node of a job.
#[derive(Clone)]
pub struct Capabilities {
    pub reasoning: Arc<dyn ReasoningCapability>,
    pub retrieval: Arc<dyn RetrievalStore>,
    pub sandbox: Arc<dyn SandboxCapability>,
    pub provisioning: Arc<dyn ProvisioningCapability>,
    pub retry: Arc<dyn RetryStrategy>,
}

impl Capabilities {
    /// Reasoning call with the transient-error retry policy applied.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<String, crate::error::CapabilityError> {
        let purpose = request.purpose;
        call_with_retry(self.retry.as_ref(), purpose.as_str(), || {
            self.reasoning.complete(request.clone())
        })
        .await
    }
}
