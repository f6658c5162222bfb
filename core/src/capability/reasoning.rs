use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// Why a reasoning call is made; lets providers pick models and lets logs
/// and test doubles tell calls apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Clarify,
    Plan,
    Build,
    GenerateTests,
    Repair,
    Aggregate,
    Test,
    ImpactAnalysis,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clarify => "clarify",
            Self::Plan => "plan",
            Self::Build => "build",
            Self::GenerateTests => "generate_tests",
            Self::Repair => "repair",
            Self::Aggregate => "aggregate",
            Self::Test => "test",
            Self::ImpactAnalysis => "impact_analysis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub purpose: Purpose,
    pub prompt: String,
    /// JSON schema the answer should follow, when structured output is expected.
    #[serde(default)]
    pub response_schema: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn text(purpose: Purpose, prompt: impl Into<String>) -> Self {
        Self {
            purpose,
            prompt: prompt.into(),
            response_schema: None,
        }
    }

    pub fn structured(
        purpose: Purpose,
        prompt: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            purpose,
            prompt: prompt.into(),
            response_schema: Some(schema),
        }
    }
}

/// Opaque `complete(prompt) → text` language-model capability.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError>;
}
