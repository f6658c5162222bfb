use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    #[serde(default)]
    pub cost: CostConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub http_server: HttpServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "taskweave_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Scheduling, self-validation and self-correction knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size. 0 means "number of CPUs".
    #[serde(default)]
    pub max_concurrency: usize,

    /// Run the Build → GenerateTests → Execute loop inside every worker.
    #[serde(default = "default_true")]
    pub intensive_validation: bool,

    /// Auto-repair attempts per task after a failed self-validation run.
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: u32,

    /// Maximum number of Test → Plan self-correction cycles per job.
    #[serde(default = "default_max_self_corrections")]
    pub max_self_corrections: u32,

    /// Answered clarification rounds after which the request proceeds as is.
    #[serde(default = "default_max_clarification_rounds")]
    pub max_clarification_rounds: u32,

    /// Persist the job after every stage transition, not only at pause points.
    #[serde(default = "default_true")]
    pub checkpoint_every_stage: bool,

    /// Capacity of the per-job interrupt queue.
    #[serde(default = "default_interrupt_queue")]
    pub interrupt_queue_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_repair_attempts() -> u32 {
    2
}

fn default_max_self_corrections() -> u32 {
    3
}

fn default_max_clarification_rounds() -> u32 {
    2
}

fn default_interrupt_queue() -> usize {
    16
}

impl EngineConfig {
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_concurrency
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            intensive_validation: true,
            repair_attempts: default_repair_attempts(),
            max_self_corrections: default_max_self_corrections(),
            max_clarification_rounds: default_max_clarification_rounds(),
            checkpoint_every_stage: true,
            interrupt_queue_capacity: default_interrupt_queue(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Spread each delay over the upper half of its capped value.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter: true,
        }
    }
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_reasoning_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_reasoning_model")]
    pub model: String,
    #[serde(default = "default_reasoning_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_reasoning_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_reasoning_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_reasoning_timeout_ms() -> u64 {
    120_000
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_reasoning_url(),
            api_key: String::new(),
            model: default_reasoning_model(),
            timeout_ms: default_reasoning_timeout_ms(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Snippets requested per namespace.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(flatten)]
    pub provider: RetrievalProvider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum RetrievalProvider {
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "http")]
    Http(HttpRetrievalConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRetrievalConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_top_k() -> usize {
    5
}

fn default_retrieval_provider() -> RetrievalProvider {
    RetrievalProvider::Memory
}

fn default_retrieval_timeout_ms() -> u64 {
    10_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            provider: default_retrieval_provider(),
        }
    }
}

/// Process sandbox used by worker self-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Program run inside the sandbox directory.
    #[serde(default = "default_sandbox_program")]
    pub program: String,

    /// Arguments; `{artifact}` and `{tests}` are replaced by file paths.
    #[serde(default = "default_sandbox_args")]
    pub args: Vec<String>,

    #[serde(default = "default_sandbox_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes of combined output kept in the log.
    #[serde(default = "default_sandbox_log_bytes")]
    pub max_log_bytes: usize,

    /// Extension given to the artifact and test files written to the sandbox.
    #[serde(default = "default_sandbox_extension")]
    pub file_extension: String,
}

fn default_sandbox_program() -> String {
    "pytest".to_string()
}

fn default_sandbox_args() -> Vec<String> {
    vec!["-q".to_string(), "{tests}".to_string()]
}

fn default_sandbox_timeout_ms() -> u64 {
    60_000
}

fn default_sandbox_log_bytes() -> usize {
    16 * 1024
}

fn default_sandbox_extension() -> String {
    "py".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: default_sandbox_program(),
            args: default_sandbox_args(),
            timeout_ms: default_sandbox_timeout_ms(),
            max_log_bytes: default_sandbox_log_bytes(),
            file_extension: default_sandbox_extension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Command receiving the deployment spec on stdin; stdout is the resource handle.
    /// Unset means deployment tasks report a dry-run handle.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_provision_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provision_timeout_ms() -> u64 {
    300_000
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_ms: default_provision_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default = "default_cost_per_task")]
    pub per_task: f64,
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: f64,
}

fn default_cost_per_task() -> f64 {
    2.5
}

fn default_warn_threshold() -> f64 {
    20.0
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            per_task: default_cost_per_task(),
            warn_threshold: default_warn_threshold(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for persisted job records. Unset means `~/.taskweave/jobs`.
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}
