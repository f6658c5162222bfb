pub mod cli;
pub mod jobs;

use taskweave_core::api::{AppConfig, CliError, ExecutorSettings, JobController};

/// Wire configured plugins and the job store into a controller.
pub fn build_controller(cfg: &AppConfig) -> Result<JobController, CliError> {
    let caps = taskweave_plugins::factory::build_capabilities(cfg)?;
    let store = taskweave_plugins::factory::build_store(cfg)?;
    let settings = ExecutorSettings::from_config(cfg);
    tracing::debug!(
        target: "taskweave.cli",
        reasoning = caps.reasoning.name(),
        retrieval = caps.retrieval.name(),
        sandbox = caps.sandbox.name(),
        provisioning = caps.provisioning.name(),
        retry = caps.retry.name(),
        "capabilities ready"
    );
    Ok(JobController::new(caps, settings, store))
}
