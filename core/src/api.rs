//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `taskweave_core::api` instead of reaching into internal modules.

pub use crate::capability::{
    call_with_retry, Backoff, BackoffCurve, Capabilities, CompletionRequest, ContextSnippet, Document, Namespace,
    NoRetry, ProvisioningCapability, Purpose, ReasoningCapability, ResourceHandle,
    RetrievalStore, RetryStrategy, SandboxCapability, SandboxOutcome,
};
pub use crate::config::{
    load_default, load_from_path, AppConfig, CostConfig, EngineConfig, HttpRetrievalConfig,
    HttpServerConfig, LoggingConfig, ProvisioningConfig, ReasoningConfig, RetrievalConfig,
    RetrievalProvider, RetryConfig, SandboxConfig, StoreConfig,
};
pub use crate::error::{
    CapabilityError, CliError, ErrorCode, ExecutorError, JobError, NodeExecutionError, PlanError,
    StoreError,
};
pub use crate::executor::{ExecutorSettings, JobOutcome};
pub use crate::interrupt::{InterruptReport, PlanEdit};
pub use crate::jobs::JobController;
pub use crate::plan::{Plan, Task, TaskId, TaskStatus, WorkerRole};
pub use crate::state::{
    FileJobStore, JobEvent, JobId, JobRecord, JobState, JobStatus, JobStore, MemoryJobStore,
    Stage, ValidationReport, ValidationStatus,
};
