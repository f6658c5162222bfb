//! Legal edges of the stage graph.

use super::types::Stage;
use crate::error::ExecutorError;

pub struct StageTransition;

impl StageTransition {
    /// Check that `from -> to` is an edge of the stage graph.
    pub fn validate(from: Stage, to: Stage) -> Result<(), ExecutorError> {
        if from.is_terminal() {
            return Err(ExecutorError::InvalidStageTransition { from, to });
        }

        let is_valid = match (from, to) {
            // Re-run after the caller answers clarification questions.
            (Stage::Clarify, Stage::Clarify) => true,
            (Stage::Clarify, Stage::Retrieve) => true,
            (Stage::Retrieve, Stage::Plan) => true,
            (Stage::Plan, Stage::EstimateCost) => true,
            (Stage::EstimateCost, Stage::Execute) => true,
            (Stage::Execute, Stage::Aggregate) => true,
            (Stage::Aggregate, Stage::Test) => true,
            (Stage::Test, Stage::Completed) => true,

            // Self-correction.
            (Stage::Test, Stage::Plan) => true,

            // An interrupt added work after execution drained.
            (Stage::Aggregate, Stage::Execute) | (Stage::Test, Stage::Execute) => true,

            (_, Stage::Failed) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(ExecutorError::InvalidStageTransition { from, to })
        }
    }

    /// Next stage on the happy path.
    pub fn next_stage(current: Stage) -> Option<Stage> {
        match current {
            Stage::Clarify => Some(Stage::Retrieve),
            Stage::Retrieve => Some(Stage::Plan),
            Stage::Plan => Some(Stage::EstimateCost),
            Stage::EstimateCost => Some(Stage::Execute),
            Stage::Execute => Some(Stage::Aggregate),
            Stage::Aggregate => Some(Stage::Test),
            Stage::Test => Some(Stage::Completed),
            Stage::Completed | Stage::Failed => None,
        }
    }

    pub fn is_terminal(stage: Stage) -> bool {
        stage.is_terminal()
    }

    pub fn stage_description(stage: Stage) -> &'static str {
        match stage {
            Stage::Clarify => "checking whether the request needs clarification",
            Stage::Retrieve => "retrieving context",
            Stage::Plan => "planning tasks",
            Stage::EstimateCost => "estimating cost",
            Stage::Execute => "executing tasks",
            Stage::Aggregate => "aggregating results",
            Stage::Test => "testing the deliverable",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}
