#[allow(clippy::module_inception)]
pub mod error;
pub mod capability;
pub mod executor;
pub mod plan;

pub use capability::{CapabilityError, NodeExecutionError};
pub use error::{CliError, JobError, StoreError};
pub use executor::{ErrorCode, ExecutorError};
pub use plan::PlanError;
