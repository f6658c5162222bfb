//! Node output applied to job state.
//!
//! Nodes never touch [`JobState`] directly. Each returns its own update type;
//! the executor wraps it in a [`NodeUpdate`] and applies it here, one at a
//! time, so a routing decision never sees a half-applied delta.

use crate::error::PlanError;
use crate::executor::{DependencyScheduler, Recorded};
use crate::nodes::{
    AggregateUpdate, ClarifyUpdate, CostUpdate, PlanUpdate, RetrieveUpdate, TaskOutcome,
    TestUpdate,
};
use crate::plan::TaskId;

use super::types::{JobState, ValidationStatus};

#[derive(Debug, Clone)]
pub enum NodeUpdate {
    Clarify(ClarifyUpdate),
    Retrieve(RetrieveUpdate),
    Plan(PlanUpdate),
    Cost(CostUpdate),
    Task(TaskOutcome),
    Aggregate(AggregateUpdate),
    Test(TestUpdate),
}

impl NodeUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Clarify(_) => "clarify",
            Self::Retrieve(_) => "retrieve",
            Self::Plan(_) => "plan",
            Self::Cost(_) => "cost",
            Self::Task(_) => "task",
            Self::Aggregate(_) => "aggregate",
            Self::Test(_) => "test",
        }
    }
}

macro_rules! impl_from_update {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for NodeUpdate {
                fn from(update: $ty) -> Self {
                    Self::$variant(update)
                }
            }
        )*
    };
}

impl_from_update!(
    ClarifyUpdate => Clarify,
    RetrieveUpdate => Retrieve,
    PlanUpdate => Plan,
    CostUpdate => Cost,
    TaskOutcome => Task,
    AggregateUpdate => Aggregate,
    TestUpdate => Test,
);

/// What applying an update changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Clarification { needed: bool },
    Context { snippets: usize },
    Plan { added: Vec<TaskId>, reissued: Vec<TaskId> },
    Cost { estimated: f64 },
    Task(Recorded),
    Deliverable { included: usize, excluded: usize },
    Report { status: ValidationStatus },
}

impl JobState {
    /// Merge a node's output into the job. Only plan-shaping updates can
    /// fail; on failure the state is left exactly as it was.
    pub fn apply(&mut self, update: NodeUpdate) -> Result<Applied, PlanError> {
        let applied = match update {
            NodeUpdate::Clarify(update) => {
                if update.needs_clarification {
                    self.clarification.questions = update.questions;
                } else {
                    self.clarification.questions.clear();
                    if let Some(clarified) = update.clarified_request {
                        self.clarified_request = Some(clarified);
                    }
                }
                Applied::Clarification {
                    needed: update.needs_clarification,
                }
            }
            NodeUpdate::Retrieve(update) => {
                let snippets = update.snippets.len();
                self.context = update.snippets;
                Applied::Context { snippets }
            }
            NodeUpdate::Plan(update) => self.apply_plan(update)?,
            NodeUpdate::Cost(update) => {
                self.costs.estimated = update.estimated;
                Applied::Cost {
                    estimated: update.estimated,
                }
            }
            NodeUpdate::Task(outcome) => {
                let recorded = DependencyScheduler::record(&mut self.plan, &outcome)?;
                if let Recorded::Completed(id) = recorded {
                    if let Some(task) = self.plan.get(id) {
                        self.completed.insert(id, task.clone());
                    }
                }
                Applied::Task(recorded)
            }
            NodeUpdate::Aggregate(update) => {
                let included = update.included.len();
                let excluded = update.excluded.len();
                self.final_deliverable = Some(update.deliverable);
                self.excluded_tasks = update.excluded;
                Applied::Deliverable { included, excluded }
            }
            NodeUpdate::Test(update) => {
                let status = update.report.status;
                self.validation_history.push(update.report.clone());
                self.validation_report = Some(update.report);
                Applied::Report { status }
            }
        };
        self.touch();
        Ok(applied)
    }

    fn apply_plan(&mut self, update: PlanUpdate) -> Result<Applied, PlanError> {
        if update.drafts.is_empty() && update.reissue.is_empty() && self.plan.is_empty() {
            return Err(PlanError::Malformed("planner produced no tasks".into()));
        }

        let (added, reissued) = self.plan.mutate(|plan| {
            let mut reissued = Vec::new();
            for id in &update.reissue {
                reissued.extend(plan.reissue(*id, "re-issued by planner")?);
            }
            let added = plan.add_drafts(&update.drafts)?;
            Ok((added, reissued))
        })?;

        Ok(Applied::Plan { added, reissued })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::TaskOutcome;
    use crate::plan::{DependencyRef, TaskDraft, TaskStatus, WorkerRole};
    use crate::state::ValidationReport;
    use pretty_assertions::assert_eq;

    fn planned_state() -> JobState {
        let mut state = JobState::new("job-1", "user-1", "build it");
        state
            .apply(NodeUpdate::Plan(PlanUpdate {
                drafts: vec![
                    TaskDraft::new(WorkerRole::Architect, "design").keyed("a"),
                    TaskDraft::new(WorkerRole::CodeBuilder, "implement")
                        .after(DependencyRef::Key("a".into())),
                ],
                reissue: Vec::new(),
            }))
            .unwrap();
        state
    }

    #[test]
    fn test_plan_update_adds_tasks() {
        let state = planned_state();
        assert_eq!(state.plan.len(), 2);
        assert_eq!(state.plan.eligible(), vec![1]);
    }

    #[test]
    fn test_empty_first_plan_is_rejected() {
        let mut state = JobState::new("job-1", "user-1", "build it");
        let err = state
            .apply(NodeUpdate::Plan(PlanUpdate::default()))
            .unwrap_err();
        assert!(matches!(err, PlanError::Malformed(_)));
    }

    #[test]
    fn test_rejected_plan_update_keeps_previous_plan() {
        let mut state = planned_state();
        let before = state.plan.clone();

        let err = state
            .apply(NodeUpdate::Plan(PlanUpdate {
                drafts: vec![TaskDraft::new(WorkerRole::Frontend, "ui")
                    .after(DependencyRef::Existing(42))],
                reissue: Vec::new(),
            }))
            .unwrap_err();

        assert!(matches!(err, PlanError::DependencyNotFound { .. }));
        assert_eq!(state.plan, before);
    }

    #[test]
    fn test_completed_outcome_lands_in_completed_map() {
        let mut state = planned_state();
        let dispatched = DependencyScheduler::new(4)
            .next_dispatch(&mut state.plan, 0)
            .started;
        assert_eq!(dispatched, vec![1]);

        let applied = state
            .apply(NodeUpdate::Task(TaskOutcome::completed(1, "design doc")))
            .unwrap();

        assert_eq!(applied, Applied::Task(Recorded::Completed(1)));
        assert_eq!(state.completed[&1].result.as_deref(), Some("design doc"));
    }

    #[test]
    fn test_reissue_brings_back_blocked_dependent() {
        let mut state = planned_state();
        let scheduler = DependencyScheduler::new(4);
        scheduler.next_dispatch(&mut state.plan, 0);
        state
            .apply(NodeUpdate::Task(TaskOutcome::failed(1, "boom")))
            .unwrap();
        assert_eq!(state.plan.get(1).unwrap().status, TaskStatus::Failed);

        // draining blocks the dependent of the failed task
        assert!(scheduler.next_dispatch(&mut state.plan, 0).started.is_empty());
        assert_eq!(state.plan.get(2).unwrap().status, TaskStatus::Cancelled);

        let applied = state
            .apply(NodeUpdate::Plan(PlanUpdate {
                drafts: Vec::new(),
                reissue: vec![1],
            }))
            .unwrap();
        assert_eq!(
            applied,
            Applied::Plan {
                added: Vec::new(),
                reissued: vec![1, 2],
            }
        );

        assert_eq!(scheduler.next_dispatch(&mut state.plan, 0).started, vec![1]);
        state
            .apply(NodeUpdate::Task(TaskOutcome::completed(1, "design doc")))
            .unwrap();
        assert_eq!(scheduler.next_dispatch(&mut state.plan, 0).started, vec![2]);
    }

    #[test]
    fn test_test_update_records_history() {
        let mut state = planned_state();
        state
            .apply(NodeUpdate::Test(TestUpdate {
                report: ValidationReport::failed("missing endpoint"),
            }))
            .unwrap();
        state
            .apply(NodeUpdate::Test(TestUpdate {
                report: ValidationReport::passed("ok"),
            }))
            .unwrap();

        assert_eq!(state.validation_history.len(), 2);
        assert!(state.validation_report.as_ref().unwrap().is_passed());
    }
}
