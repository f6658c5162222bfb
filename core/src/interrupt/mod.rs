//! # Interrupt controller
//!
//! Interrupts reach a running job through a per-job FIFO queue and are
//! handled one at a time by the job's executor at a safe point: between
//! stages, or between worker completions while tasks are in flight.
//!
//! ```text
//! message ─▶ ImpactAnalyzer ─▶ Vec<PlanEdit> ─▶ apply_edits (transactional) ─▶ InterruptReport
//! ```

mod analyzer;
mod edit;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::capability::Capabilities;
use crate::error::{CapabilityError, ExecutorError};
use crate::state::{JobState, Stage, StageTransition};

pub use analyzer::{ImpactAnalysis, ImpactAnalyzer};
pub use edit::{apply_edits, resolve_conflicts, AppliedEdit, EditReport, PlanEdit, SkippedEdit};

/// Queued interrupt with its reply channel.
#[derive(Debug)]
pub struct InterruptRequest {
    pub message: String,
    pub reply: oneshot::Sender<InterruptReport>,
}

impl InterruptRequest {
    pub fn new(message: impl Into<String>) -> (Self, oneshot::Receiver<InterruptReport>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                message: message.into(),
                reply,
            },
            rx,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptReport {
    pub accepted: bool,
    pub impact_summary: String,
    #[serde(default)]
    pub applied: Vec<AppliedEdit>,
    #[serde(default)]
    pub skipped: Vec<SkippedEdit>,
    /// Stage the executor restarted at, when the edits required it.
    #[serde(default)]
    pub restart_stage: Option<Stage>,
}

impl InterruptReport {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            impact_summary: reason.into(),
            ..Self::default()
        }
    }

    pub fn amended() -> Self {
        Self {
            accepted: true,
            impact_summary: "no plan yet; message added to the request".into(),
            ..Self::default()
        }
    }
}

/// Applies one interrupt to a job's state.
pub struct InterruptController {
    analyzer: ImpactAnalyzer,
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            analyzer: ImpactAnalyzer::new(),
        }
    }

    /// Only plan-integrity failures on both attempts escalate; everything else
    /// is reported back to the caller and the job carries on.
    pub async fn handle(
        &self,
        state: &mut JobState,
        caps: &Capabilities,
        message: &str,
    ) -> Result<InterruptReport, ExecutorError> {
        if state.is_terminal() {
            return Ok(InterruptReport::rejected(format!(
                "job is already {}",
                state.status
            )));
        }

        if state.stage.precedes_plan() || state.plan.is_empty() {
            state.amendments.push(message.to_string());
            state.touch();
            return Ok(InterruptReport::amended());
        }

        let mut hint: Option<String> = None;
        for attempt in 1..=2 {
            let analysis = match self
                .analyzer
                .analyze(state, message, caps, hint.as_deref())
                .await
            {
                Ok(analysis) => analysis,
                Err(err) if matches!(err.cause, CapabilityError::InvalidResponse(_)) => {
                    tracing::warn!(target: "taskweave.interrupt", job_id = %state.job_id, attempt = attempt, error = %err, "impact analysis unusable");
                    hint = Some(err.cause.to_string());
                    continue;
                }
                Err(err) => {
                    tracing::warn!(target: "taskweave.interrupt", job_id = %state.job_id, error = %err, "impact analysis failed");
                    return Ok(InterruptReport::rejected(format!(
                        "impact analysis failed: {err}"
                    )));
                }
            };

            match apply_edits(&mut state.plan, &analysis.edits) {
                Ok(report) => {
                    let restart_stage = self.restart_if_needed(state)?;
                    state.touch();
                    tracing::info!(
                        target: "taskweave.interrupt",
                        job_id = %state.job_id,
                        applied = report.applied.len(),
                        skipped = report.skipped.len(),
                        "interrupt applied"
                    );
                    return Ok(InterruptReport {
                        accepted: true,
                        impact_summary: analysis.summary,
                        applied: report.applied,
                        skipped: report.skipped,
                        restart_stage,
                    });
                }
                Err(err) => {
                    tracing::warn!(target: "taskweave.interrupt", job_id = %state.job_id, attempt = attempt, error = %err, "interrupt edits rejected");
                    if attempt == 2 {
                        return Err(ExecutorError::PlanIntegrity(err));
                    }
                    hint = Some(err.to_string());
                }
            }
        }

        Ok(InterruptReport::rejected(format!(
            "impact analysis unusable: {}",
            hint.unwrap_or_default()
        )))
    }

    /// New pending work after execution drained sends the job back to Execute.
    fn restart_if_needed(&self, state: &mut JobState) -> Result<Option<Stage>, ExecutorError> {
        if matches!(state.stage, Stage::Aggregate | Stage::Test) && state.plan.has_active() {
            StageTransition::validate(state.stage, Stage::Execute)?;
            state.stage = Stage::Execute;
            return Ok(Some(Stage::Execute));
        }
        Ok(None)
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}
