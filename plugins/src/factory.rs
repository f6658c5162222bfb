use std::sync::Arc;

use anyhow::{Context, Result};

use taskweave_core::api::{
    AppConfig, Backoff, BackoffCurve, Capabilities, FileJobStore, JobStore, MemoryJobStore,
    NoRetry, ProvisioningCapability, ReasoningCapability, RetrievalProvider, RetrievalStore,
    RetryStrategy, SandboxCapability,
};

use crate::provision::{CommandProvisioner, DryRunProvisioner};
use crate::reasoning::ChatCompletionClient;
use crate::retrieval::{HttpRetrieval, InMemoryRetrieval};
use crate::sandbox::ProcessSandbox;

pub fn build_reasoning(cfg: &AppConfig) -> Result<Arc<dyn ReasoningCapability>> {
    let client = ChatCompletionClient::new(&cfg.reasoning)
        .context("failed to build chat completion client")?;
    Ok(Arc::new(client))
}

pub fn build_retrieval(cfg: &AppConfig) -> Result<Arc<dyn RetrievalStore>> {
    match &cfg.retrieval.provider {
        RetrievalProvider::Memory => Ok(Arc::new(InMemoryRetrieval::new())),
        RetrievalProvider::Http(http_cfg) => Ok(Arc::new(
            HttpRetrieval::new(http_cfg).context("failed to build retrieval client")?,
        )),
    }
}

pub fn build_sandbox(cfg: &AppConfig) -> Arc<dyn SandboxCapability> {
    Arc::new(ProcessSandbox::new(&cfg.sandbox))
}

pub fn build_provisioning(cfg: &AppConfig) -> Arc<dyn ProvisioningCapability> {
    match cfg.provisioning.command.as_deref().map(str::trim) {
        Some(command) if !command.is_empty() => {
            Arc::new(CommandProvisioner::new(command, &cfg.provisioning))
        }
        _ => Arc::new(DryRunProvisioner),
    }
}

pub fn build_retry(cfg: &AppConfig) -> Arc<dyn RetryStrategy> {
    match cfg.retry.strategy.as_str() {
        "linear" => Arc::new(Backoff::new(BackoffCurve::Linear, &cfg.retry)),
        "none" => Arc::new(NoRetry),
        "exponential-backoff" => Arc::new(Backoff::new(BackoffCurve::Exponential, &cfg.retry)),
        other => {
            tracing::warn!(target: "taskweave.plugins", strategy = other, "unknown retry strategy, using exponential-backoff");
            Arc::new(Backoff::new(BackoffCurve::Exponential, &cfg.retry))
        }
    }
}

pub fn build_capabilities(cfg: &AppConfig) -> Result<Capabilities> {
    Ok(Capabilities {
        reasoning: build_reasoning(cfg)?,
        retrieval: build_retrieval(cfg)?,
        sandbox: build_sandbox(cfg),
        provisioning: build_provisioning(cfg),
        retry: build_retry(cfg),
    })
}

/// File store when a directory is configured, otherwise in-memory.
pub fn build_store(cfg: &AppConfig) -> Result<Arc<dyn JobStore>> {
    match cfg.store.directory.as_deref() {
        Some(dir) if !dir.trim().is_empty() => Ok(Arc::new(
            FileJobStore::new(dir).with_context(|| format!("failed to open job store at {dir}"))?,
        )),
        _ => Ok(Arc::new(MemoryJobStore::new())),
    }
}
