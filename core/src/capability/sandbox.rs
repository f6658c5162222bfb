use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxOutcome {
    pub passed: bool,
    pub log: String,
}

/// Untrusted, time-bounded execution of an artifact against its tests.
#[async_trait]
pub trait SandboxCapability: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, artifact: &str, tests: &[String]) -> Result<SandboxOutcome, CapabilityError>;
}
