#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use taskweave_core::capability::{
    Capabilities, CompletionRequest, ContextSnippet, Document, Namespace, NoRetry,
    ProvisioningCapability, Purpose, ReasoningCapability, ResourceHandle, RetrievalStore,
    SandboxCapability, SandboxOutcome,
};
use taskweave_core::error::CapabilityError;
use taskweave_core::executor::ExecutorSettings;
use taskweave_core::jobs::JobController;
use taskweave_core::state::{JobStore, MemoryJobStore};

type Responder = dyn Fn(&CompletionRequest) -> Result<String, CapabilityError> + Send + Sync;

/// Holds `Build` calls whose prompt contains `marker` until released.
pub struct Gate {
    pub marker: String,
    pub started: Notify,
    pub release: Notify,
}

impl Gate {
    pub fn new(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            marker: marker.to_string(),
            started: Notify::new(),
            release: Notify::new(),
        })
    }
}

/// Reasoning capability answering from a closure and recording every call.
pub struct ScriptedReasoning {
    respond: Box<Responder>,
    calls: Mutex<Vec<CompletionRequest>>,
    gate: Option<Arc<Gate>>,
}

impl ScriptedReasoning {
    pub fn new(
        respond: impl Fn(&CompletionRequest) -> Result<String, CapabilityError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, purpose: Purpose) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.purpose == purpose)
            .collect()
    }
}

#[async_trait]
impl ReasoningCapability for ScriptedReasoning {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            if request.purpose == Purpose::Build && request.prompt.contains(&gate.marker) {
                gate.started.notify_one();
                gate.release.notified().await;
            }
        }
        (self.respond)(&request)
    }
}

/// Retrieval store returning fixed snippets per namespace.
#[derive(Default)]
pub struct FixedRetrieval {
    pub tenant: Vec<String>,
    pub global: Vec<String>,
}

#[async_trait]
impl RetrievalStore for FixedRetrieval {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn query(
        &self,
        namespace: &Namespace,
        _text: &str,
        k: usize,
    ) -> Result<Vec<ContextSnippet>, CapabilityError> {
        let source = match namespace {
            Namespace::Tenant(_) => &self.tenant,
            Namespace::Global => &self.global,
        };
        Ok(source.iter().take(k).map(ContextSnippet::new).collect())
    }

    async fn upsert(&self, _namespace: &Namespace, _document: Document) -> Result<(), CapabilityError> {
        Ok(())
    }
}

/// Sandbox failing any artifact that contains `fail_marker`.
pub struct MarkerSandbox {
    pub fail_marker: Option<String>,
    pub runs: Mutex<u32>,
}

impl MarkerSandbox {
    pub fn passing() -> Self {
        Self {
            fail_marker: None,
            runs: Mutex::new(0),
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            runs: Mutex::new(0),
        }
    }

    pub fn runs(&self) -> u32 {
        *self.runs.lock().unwrap()
    }
}

#[async_trait]
impl SandboxCapability for MarkerSandbox {
    fn name(&self) -> &str {
        "marker"
    }

    async fn run(&self, artifact: &str, _tests: &[String]) -> Result<SandboxOutcome, CapabilityError> {
        *self.runs.lock().unwrap() += 1;
        let failed = self
            .fail_marker
            .as_deref()
            .is_some_and(|marker| artifact.contains(marker));
        Ok(SandboxOutcome {
            passed: !failed,
            log: if failed {
                "AssertionError: expected 200".into()
            } else {
                "1 passed".into()
            },
        })
    }
}

pub struct EchoProvisioner;

#[async_trait]
impl ProvisioningCapability for EchoProvisioner {
    fn name(&self) -> &str {
        "echo"
    }

    async fn provision(&self, _spec: &str) -> Result<ResourceHandle, CapabilityError> {
        Ok(ResourceHandle {
            id: "res-1".into(),
            details: None,
        })
    }
}

pub fn capabilities(
    reasoning: Arc<ScriptedReasoning>,
    sandbox: Arc<MarkerSandbox>,
) -> Capabilities {
    Capabilities {
        reasoning,
        retrieval: Arc::new(FixedRetrieval {
            tenant: vec!["team uses axum".into()],
            global: vec!["prefer sqlite for prototypes".into()],
        }),
        sandbox,
        provisioning: Arc::new(EchoProvisioner),
        retry: Arc::new(NoRetry),
    }
}

pub fn settings() -> ExecutorSettings {
    let mut settings = ExecutorSettings::default();
    settings.engine.max_concurrency = 4;
    settings
}

pub fn controller(caps: Capabilities, settings: ExecutorSettings) -> (JobController, Arc<dyn JobStore>) {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    (JobController::new(caps, settings, store.clone()), store)
}

/// Task goal embedded in a build prompt (`Your task (#N):\n<goal>`).
pub fn build_goal(prompt: &str) -> String {
    prompt
        .split_once("):\n")
        .and_then(|(_, rest)| rest.lines().next())
        .unwrap_or_default()
        .to_string()
}

pub const CLEAR_REQUEST: &str =
    r#"{"needs_clarification": false, "clarified_request": "Build a todo API with a web UI"}"#;
pub const TESTS: &str = r#"{"tests": ["def test_ok(): assert True"]}"#;
pub const PASSED: &str = r#"{"status": "Passed", "details": "all acceptance checks passed"}"#;

/// Responses for a job whose stages all succeed, with `plan` as planner output.
pub fn happy_path(plan: &'static str) -> impl Fn(&CompletionRequest) -> Result<String, CapabilityError> {
    move |req| {
        Ok(match req.purpose {
            Purpose::Clarify => CLEAR_REQUEST.to_string(),
            Purpose::Plan => plan.to_string(),
            Purpose::Build | Purpose::Repair => format!("artifact for {}", build_goal(&req.prompt)),
            Purpose::GenerateTests => TESTS.to_string(),
            Purpose::Aggregate => "final deliverable".to_string(),
            Purpose::Test => PASSED.to_string(),
            Purpose::ImpactAnalysis => r#"{"summary": "nothing to change", "edits": []}"#.to_string(),
        })
    }
}
