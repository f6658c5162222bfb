//! Plan edits produced by impact analysis and their transactional application.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::plan::{Plan, TaskId, TaskStatus, WorkerRole};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanEdit {
    Cancel {
        task_id: TaskId,
    },
    Modify {
        task_id: TaskId,
        goal: String,
    },
    Add {
        role: WorkerRole,
        goal: String,
        #[serde(default)]
        dependencies: Vec<TaskId>,
    },
}

impl PlanEdit {
    /// Existing task the edit targets, if any.
    pub fn target(&self) -> Option<TaskId> {
        match self {
            Self::Cancel { task_id } | Self::Modify { task_id, .. } => Some(*task_id),
            Self::Add { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEdit {
    pub edit: PlanEdit,
    /// Tasks created or changed by the edit.
    pub affected: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEdit {
    pub edit: PlanEdit,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditReport {
    pub applied: Vec<AppliedEdit>,
    pub skipped: Vec<SkippedEdit>,
}

impl EditReport {
    pub fn changed_plan(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Keep only the last edit per target task; additions are all kept.
/// Surviving edits stay in their original relative order.
pub fn resolve_conflicts(edits: &[PlanEdit]) -> Vec<PlanEdit> {
    let mut last: HashMap<TaskId, usize> = HashMap::new();
    for (idx, edit) in edits.iter().enumerate() {
        if let Some(target) = edit.target() {
            last.insert(target, idx);
        }
    }

    edits
        .iter()
        .enumerate()
        .filter(|(idx, edit)| match edit.target() {
            Some(target) => last.get(&target) == Some(idx),
            None => true,
        })
        .map(|(_, edit)| edit.clone())
        .collect()
}

/// Apply `edits` as one transaction. Any integrity violation rejects the
/// whole batch and leaves `plan` untouched.
pub fn apply_edits(plan: &mut Plan, edits: &[PlanEdit]) -> Result<EditReport, PlanError> {
    let edits = resolve_conflicts(edits);
    plan.mutate(|plan| {
        let mut report = EditReport::default();
        for edit in edits {
            match apply_one(plan, &edit)? {
                Ok(affected) => report.applied.push(AppliedEdit { edit, affected }),
                Err(reason) => report.skipped.push(SkippedEdit { edit, reason }),
            }
        }
        Ok(report)
    })
}

/// Outer error aborts the batch; inner error skips just this edit.
fn apply_one(plan: &mut Plan, edit: &PlanEdit) -> Result<Result<Vec<TaskId>, String>, PlanError> {
    match edit {
        PlanEdit::Cancel { task_id } => {
            let Some(task) = plan.get(*task_id) else {
                return Ok(Err(format!("task {task_id} does not exist")));
            };
            match task.status {
                TaskStatus::Pending | TaskStatus::InProgress => {
                    Ok(Ok(plan.cancel(*task_id, "cancelled by interrupt")?))
                }
                TaskStatus::Cancelled => {
                    // An explicit cancel keeps a blocked task from coming back.
                    plan.task_mut(*task_id)?.blocked_by = None;
                    Ok(Err(format!("task {task_id} is already cancelled")))
                }
                status => Ok(Err(format!("task {task_id} is {status:?} and cannot be cancelled"))),
            }
        }
        PlanEdit::Modify { task_id, goal } => {
            let Some(task) = plan.get(*task_id) else {
                return Ok(Err(format!("task {task_id} does not exist")));
            };
            let (status, role, deps) = (task.status, task.role, task.dependencies.clone());
            match status {
                TaskStatus::Pending => {
                    plan.task_mut(*task_id)?.goal = goal.clone();
                    Ok(Ok(vec![*task_id]))
                }
                TaskStatus::InProgress => {
                    // The running copy finishes on its own; its result is discarded.
                    let replacement = plan.push_task(role, goal.clone(), deps);
                    plan.rewire_dependents(*task_id, replacement);
                    plan.cancel(*task_id, &format!("superseded by task {replacement}"))?;
                    Ok(Ok(vec![*task_id, replacement]))
                }
                TaskStatus::Failed => {
                    plan.task_mut(*task_id)?.goal = goal.clone();
                    Ok(Ok(plan.reissue(*task_id, "re-issued by interrupt")?))
                }
                status => Ok(Err(format!("task {task_id} is {status:?} and cannot be modified"))),
            }
        }
        PlanEdit::Add {
            role,
            goal,
            dependencies,
        } => {
            let deps: BTreeSet<TaskId> = dependencies.iter().copied().collect();
            Ok(Ok(vec![plan.push_task(*role, goal.clone(), deps)]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{DependencyRef, TaskDraft};
    use pretty_assertions::assert_eq;

    /// T1, T2 -> T3
    fn plan_with_t2_running() -> Plan {
        let mut plan = Plan::new();
        plan.add_drafts(&[
            TaskDraft::new(WorkerRole::Architect, "t1").keyed("t1"),
            TaskDraft::new(WorkerRole::Database, "t2").keyed("t2"),
            TaskDraft::new(WorkerRole::CodeBuilder, "t3")
                .after(DependencyRef::Key("t1".into()))
                .after(DependencyRef::Key("t2".into())),
        ])
        .unwrap();
        plan.get_mut(2).unwrap().transition(TaskStatus::InProgress).unwrap();
        plan
    }

    #[test]
    fn test_cancel_twice_equals_cancel_once() {
        let mut once = plan_with_t2_running();
        let mut twice = plan_with_t2_running();
        let edit = PlanEdit::Cancel { task_id: 1 };

        apply_edits(&mut once, &[edit.clone()]).unwrap();
        apply_edits(&mut twice, &[edit.clone()]).unwrap();
        let second = apply_edits(&mut twice, &[edit]).unwrap();

        assert_eq!(once, twice);
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped.len(), 1);
        assert_eq!(twice.get(3).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_modify_in_progress_creates_replacement() {
        let mut plan = plan_with_t2_running();
        let report = apply_edits(
            &mut plan,
            &[PlanEdit::Modify {
                task_id: 2,
                goal: "t2 with indexes".into(),
            }],
        )
        .unwrap();

        assert_eq!(report.applied[0].affected, vec![2, 4]);
        assert_eq!(plan.get(2).unwrap().status, TaskStatus::Cancelled);
        let replacement = plan.get(4).unwrap();
        assert_eq!(replacement.status, TaskStatus::Pending);
        assert_eq!(replacement.goal, "t2 with indexes");
        assert_eq!(replacement.role, WorkerRole::Database);
        // T3 now waits on the replacement and stays pending.
        let t3 = plan.get(3).unwrap();
        assert_eq!(t3.status, TaskStatus::Pending);
        assert!(t3.dependencies.contains(&4) && !t3.dependencies.contains(&2));
    }

    #[test]
    fn test_modify_failed_task_revives_blocked_dependent() {
        let mut plan = plan_with_t2_running();
        plan.get_mut(2).unwrap().transition(TaskStatus::Failed).unwrap();
        assert_eq!(plan.propagate_blocked(), vec![3]);

        let report = apply_edits(
            &mut plan,
            &[PlanEdit::Modify {
                task_id: 2,
                goal: "t2 with a simpler schema".into(),
            }],
        )
        .unwrap();

        assert_eq!(report.applied[0].affected, vec![2, 3]);
        assert_eq!(plan.get(2).unwrap().status, TaskStatus::Pending);
        assert_eq!(plan.get(2).unwrap().goal, "t2 with a simpler schema");
        assert_eq!(plan.get(3).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_explicit_cancel_keeps_blocked_task_down() {
        let mut plan = plan_with_t2_running();
        plan.get_mut(2).unwrap().transition(TaskStatus::Failed).unwrap();
        plan.propagate_blocked();

        let cancel = apply_edits(&mut plan, &[PlanEdit::Cancel { task_id: 3 }]).unwrap();
        assert_eq!(cancel.skipped.len(), 1);

        let report = apply_edits(
            &mut plan,
            &[PlanEdit::Modify {
                task_id: 2,
                goal: "t2 again".into(),
            }],
        )
        .unwrap();
        assert_eq!(report.applied[0].affected, vec![2]);
        assert_eq!(plan.get(3).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_last_edit_wins_per_task() {
        let mut plan = plan_with_t2_running();
        let report = apply_edits(
            &mut plan,
            &[
                PlanEdit::Cancel { task_id: 1 },
                PlanEdit::Modify {
                    task_id: 1,
                    goal: "t1 revised".into(),
                },
            ],
        )
        .unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(plan.get(1).unwrap().status, TaskStatus::Pending);
        assert_eq!(plan.get(1).unwrap().goal, "t1 revised");
    }

    #[test]
    fn test_completed_task_is_never_touched() {
        let mut plan = plan_with_t2_running();
        let t1 = plan.get_mut(1).unwrap();
        t1.transition(TaskStatus::InProgress).unwrap();
        t1.transition(TaskStatus::Completed).unwrap();
        t1.result = Some("done".into());

        let report = apply_edits(
            &mut plan,
            &[
                PlanEdit::Cancel { task_id: 1 },
                PlanEdit::Modify {
                    task_id: 1,
                    goal: "again".into(),
                },
            ],
        )
        .unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(plan.get(1).unwrap().status, TaskStatus::Completed);
        assert_eq!(plan.get(1).unwrap().goal, "t1");
    }

    #[test]
    fn test_bad_add_rejects_whole_batch() {
        let mut plan = plan_with_t2_running();
        let before = plan.clone();
        let err = apply_edits(
            &mut plan,
            &[
                PlanEdit::Cancel { task_id: 1 },
                PlanEdit::Add {
                    role: WorkerRole::Frontend,
                    goal: "ui".into(),
                    dependencies: vec![99],
                },
            ],
        )
        .unwrap_err();

        assert!(matches!(err, PlanError::DependencyNotFound { missing_dep: 99, .. }));
        assert_eq!(plan, before);
    }

    #[test]
    fn test_edit_serde_shape() {
        let edit: PlanEdit =
            serde_json::from_str(r#"{"action": "modify", "task_id": 2, "goal": "x"}"#).unwrap();
        assert_eq!(
            edit,
            PlanEdit::Modify {
                task_id: 2,
                goal: "x".into()
            }
        );
    }
}
