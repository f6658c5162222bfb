//! Conditional edges of the stage graph as a pure function.

use crate::state::{JobState, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingLimits {
    pub max_self_corrections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Continue(Stage),
    AwaitClarification,
    Replan,
    Succeed,
    Fail(String),
}

/// Decide where to go after `stage` has run and its update was applied.
pub fn route(stage: Stage, state: &JobState, limits: &RoutingLimits) -> Route {
    match stage {
        Stage::Clarify => {
            if state.clarification.questions.is_empty() {
                Route::Continue(Stage::Retrieve)
            } else {
                Route::AwaitClarification
            }
        }
        Stage::Retrieve => Route::Continue(Stage::Plan),
        Stage::Plan => Route::Continue(Stage::EstimateCost),
        Stage::EstimateCost => Route::Continue(Stage::Execute),
        Stage::Execute => Route::Continue(Stage::Aggregate),
        // Work added by an interrupt while aggregating or testing.
        Stage::Aggregate | Stage::Test if state.plan.has_active() => Route::Continue(Stage::Execute),
        Stage::Aggregate => Route::Continue(Stage::Test),
        Stage::Test => match &state.validation_report {
            Some(report) if report.is_passed() => Route::Succeed,
            Some(report) if state.self_corrections >= limits.max_self_corrections => {
                Route::Fail(format!(
                    "tests still failing after {} self-correction cycle(s): {}",
                    state.self_corrections, report.details
                ))
            }
            Some(_) => Route::Replan,
            None => Route::Fail("tester produced no validation report".into()),
        },
        Stage::Completed => Route::Succeed,
        Stage::Failed => Route::Fail(
            state
                .failure
                .as_ref()
                .map(|f| f.reason.clone())
                .unwrap_or_else(|| "job failed".into()),
        ),
    }
}
