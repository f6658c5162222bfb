mod load;
mod types;

pub use load::{apply_env_overrides, get_data_dir, load_default, load_from_path};
pub use types::{
    AppConfig, CostConfig, EngineConfig, HttpRetrievalConfig, HttpServerConfig, LoggingConfig,
    ProvisioningConfig, ReasoningConfig, RetrievalConfig, RetrievalProvider, RetryConfig,
    SandboxConfig, StoreConfig,
};
