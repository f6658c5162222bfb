use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub id: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Deployment / cloud provisioning, only used by deployment-role tasks.
#[async_trait]
pub trait ProvisioningCapability: Send + Sync {
    fn name(&self) -> &str;
    async fn provision(&self, spec: &str) -> Result<ResourceHandle, CapabilityError>;
}
