use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

use super::graph::PlanGraph;
use super::task::{DependencyRef, Task, TaskDraft, TaskId, TaskStatus, WorkerRole};

/// Ordered collection of tasks driving one job.
///
/// Ids come from a monotonic counter stored with the plan, so an id is never
/// handed out twice even after tasks are cancelled or replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    tasks: Vec<Task>,
    next_id: TaskId,
}

impl Plan {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
        }
    }

    /// Build a plan from already-identified tasks, validating the graph.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self, PlanError> {
        let next_id = tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let plan = Self { tasks, next_id };
        plan.validate()?;
        Ok(plan)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, PlanError> {
        self.get_mut(id).ok_or(PlanError::UnknownTask(id))
    }

    pub fn ids_with_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.id)
            .collect()
    }

    /// True while any task is pending or in progress.
    pub fn has_active(&self) -> bool {
        self.tasks.iter().any(|t| t.status.is_active())
    }

    pub fn graph(&self) -> Result<PlanGraph, PlanError> {
        PlanGraph::from_tasks(&self.tasks)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        self.graph()?.validate()
    }

    /// Apply `f` to a copy of the plan and keep the result only if it is
    /// still a valid DAG. On any error the current plan is left untouched.
    pub fn mutate<R, F>(&mut self, f: F) -> Result<R, PlanError>
    where
        F: FnOnce(&mut Plan) -> Result<R, PlanError>,
    {
        let mut draft = self.clone();
        let out = f(&mut draft)?;
        draft.validate()?;
        *self = draft;
        Ok(out)
    }

    /// Insert a fully specified pending task, assigning it a fresh id.
    /// Callers validate through [`Plan::mutate`].
    pub(crate) fn push_task(
        &mut self,
        role: WorkerRole,
        goal: String,
        dependencies: BTreeSet<TaskId>,
    ) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks
            .push(Task::new(id, role, goal).with_dependencies(dependencies));
        id
    }

    /// Append a batch of drafts. Draft keys resolve within the batch, numeric
    /// references resolve against existing tasks. Returns the new ids in
    /// draft order.
    pub fn add_drafts(&mut self, drafts: &[TaskDraft]) -> Result<Vec<TaskId>, PlanError> {
        self.mutate(|plan| {
            let mut by_key: HashMap<String, TaskId> = HashMap::new();
            let first_id = plan.next_id;
            for (offset, draft) in drafts.iter().enumerate() {
                if let Some(key) = &draft.key {
                    by_key.insert(key.clone(), first_id + offset as TaskId);
                }
            }

            let mut ids = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let mut deps = BTreeSet::new();
                for dep in &draft.depends_on {
                    let resolved = match dep {
                        DependencyRef::Existing(id) => *id,
                        DependencyRef::Key(key) => {
                            *by_key
                                .get(key)
                                .ok_or_else(|| PlanError::UnresolvedReference {
                                    task: draft.key.clone().unwrap_or_else(|| draft.goal.clone()),
                                    reference: key.clone(),
                                })?
                        }
                    };
                    deps.insert(resolved);
                }
                ids.push(plan.push_task(draft.role, draft.goal.clone(), deps));
            }
            Ok(ids)
        })
    }

    /// Pending tasks whose every dependency is completed, in plan order.
    pub fn eligible(&self) -> Vec<TaskId> {
        let status: HashMap<TaskId, TaskStatus> =
            self.tasks.iter().map(|t| (t.id, t.status)).collect();

        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.dependencies
                    .iter()
                    .all(|d| status.get(d) == Some(&TaskStatus::Completed))
            })
            .map(|t| t.id)
            .collect()
    }

    /// Cancel a pending or in-progress task and every non-terminal task that
    /// transitively depends on it. Completed tasks are never touched.
    /// Returns the ids that changed state; repeating the call returns nothing.
    pub fn cancel(&mut self, id: TaskId, reason: &str) -> Result<Vec<TaskId>, PlanError> {
        let status = self.get(id).ok_or(PlanError::UnknownTask(id))?.status;
        if !status.is_active() {
            return Ok(Vec::new());
        }

        let graph = self.graph()?;
        let mut changed = Vec::new();
        for target in std::iter::once(id).chain(graph.dependents_of(id)) {
            let task = self.task_mut(target)?;
            if task.status.is_active() {
                task.transition(TaskStatus::Cancelled)?;
                task.note = Some(if target == id {
                    reason.to_string()
                } else {
                    format!("dependency {id} cancelled")
                });
                changed.push(target);
            }
        }
        Ok(changed)
    }

    /// Pending tasks with a cancelled or failed dependency can never run;
    /// cancel them (to a fixpoint) and return their ids.
    pub fn propagate_blocked(&mut self) -> Vec<TaskId> {
        let mut changed = Vec::new();
        loop {
            let status: HashMap<TaskId, TaskStatus> =
                self.tasks.iter().map(|t| (t.id, t.status)).collect();

            let blocked: Vec<(TaskId, TaskId)> = self
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending)
                .filter_map(|t| {
                    t.dependencies
                        .iter()
                        .find(|d| {
                            matches!(
                                status.get(d),
                                Some(TaskStatus::Cancelled) | Some(TaskStatus::Failed)
                            )
                        })
                        .map(|d| (t.id, *d))
                })
                .collect();

            if blocked.is_empty() {
                return changed;
            }

            for (task_id, dep) in blocked {
                if let Some(task) = self.get_mut(task_id) {
                    if task.transition(TaskStatus::Cancelled).is_err() {
                        continue;
                    }
                    task.note = Some(format!("dependency {dep} did not complete"));
                    task.blocked_by = Some(dep);
                    changed.push(task_id);
                }
            }
        }
    }

    /// `failed -> pending` for a task, then bring back the dependents that
    /// were cancelled only because it failed. Returns every id made pending,
    /// the re-issued task first.
    pub fn reissue(&mut self, id: TaskId, note: &str) -> Result<Vec<TaskId>, PlanError> {
        let task = self.task_mut(id)?;
        task.transition(TaskStatus::Pending)?;
        task.repair_attempts = 0;
        task.generated_tests = None;
        task.self_validation_status = None;
        task.note = Some(note.to_string());

        let mut changed = vec![id];
        changed.extend(self.revive_blocked());
        Ok(changed)
    }

    /// Blocked-cancelled tasks whose dependencies can all still complete go
    /// back to pending (to a fixpoint). Tasks cancelled on purpose stay put.
    pub fn revive_blocked(&mut self) -> Vec<TaskId> {
        let mut revived = Vec::new();
        loop {
            let status: HashMap<TaskId, TaskStatus> =
                self.tasks.iter().map(|t| (t.id, t.status)).collect();

            let ready: Vec<TaskId> = self
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Cancelled && t.blocked_by.is_some())
                .filter(|t| {
                    t.dependencies.iter().all(|d| {
                        matches!(
                            status.get(d),
                            Some(TaskStatus::Pending)
                                | Some(TaskStatus::InProgress)
                                | Some(TaskStatus::Completed)
                        )
                    })
                })
                .map(|t| t.id)
                .collect();

            if ready.is_empty() {
                return revived;
            }

            for id in ready {
                if let Some(task) = self.get_mut(id) {
                    if task.revive().is_ok() {
                        revived.push(id);
                    }
                }
            }
        }
    }

    /// Replace `old` with `new` in every dependency set that still needs it.
    pub(crate) fn rewire_dependents(&mut self, old: TaskId, new: TaskId) -> Vec<TaskId> {
        let mut rewired = Vec::new();
        for task in &mut self.tasks {
            if task.status.is_active() && task.dependencies.remove(&old) {
                task.dependencies.insert(new);
                rewired.push(task.id);
            }
        }
        rewired
    }

    /// Restore path after a process restart: tasks that were running when the
    /// state was persisted are failed and re-issued so they get dispatched again.
    pub fn requeue_interrupted(&mut self) -> Result<Vec<TaskId>, PlanError> {
        let ids = self.ids_with_status(TaskStatus::InProgress);
        for id in &ids {
            let task = self.task_mut(*id)?;
            task.transition(TaskStatus::Failed)?;
            task.transition(TaskStatus::Pending)?;
        }
        Ok(ids)
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diamond() -> Plan {
        let mut plan = Plan::new();
        plan.add_drafts(&[
            TaskDraft::new(WorkerRole::Architect, "design").keyed("a"),
            TaskDraft::new(WorkerRole::Database, "schema").keyed("b"),
            TaskDraft::new(WorkerRole::CodeBuilder, "api")
                .keyed("c")
                .after(DependencyRef::Key("a".into()))
                .after(DependencyRef::Key("b".into())),
            TaskDraft::new(WorkerRole::Frontend, "ui").after(DependencyRef::Key("c".into())),
        ])
        .unwrap();
        plan
    }

    fn finish(plan: &mut Plan, id: TaskId) {
        let task = plan.get_mut(id).unwrap();
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Completed).unwrap();
    }

    #[test]
    fn test_add_drafts_assigns_ids_and_resolves_keys() {
        let plan = diamond();
        assert_eq!(plan.len(), 4);
        assert_eq!(
            plan.get(3).unwrap().dependencies,
            BTreeSet::from([1, 2])
        );
        assert_eq!(plan.get(4).unwrap().dependencies, BTreeSet::from([3]));
    }

    #[test]
    fn test_unresolved_key_rejects_whole_batch() {
        let mut plan = diamond();
        let before = plan.clone();
        let err = plan
            .add_drafts(&[
                TaskDraft::new(WorkerRole::CodeBuilder, "ok"),
                TaskDraft::new(WorkerRole::CodeBuilder, "bad").after(DependencyRef::Key("zz".into())),
            ])
            .unwrap_err();
        assert!(matches!(err, PlanError::UnresolvedReference { .. }));
        assert_eq!(plan, before);
    }

    #[test]
    fn test_dangling_existing_reference_rejected() {
        let mut plan = diamond();
        let before = plan.clone();
        let err = plan
            .add_drafts(&[TaskDraft::new(WorkerRole::CodeBuilder, "x")
                .after(DependencyRef::Existing(42))])
            .unwrap_err();
        assert!(matches!(err, PlanError::DependencyNotFound { missing_dep: 42, .. }));
        assert_eq!(plan, before);
    }

    #[test]
    fn test_cyclic_mutation_keeps_previous_plan() {
        let mut plan = diamond();
        let before = plan.clone();
        let result = plan.mutate(|p| {
            p.task_mut(1)?.dependencies.insert(4);
            Ok(())
        });
        assert!(matches!(result, Err(PlanError::CircularDependency(_))));
        assert_eq!(plan, before);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut plan = diamond();
        plan.cancel(4, "not needed").unwrap();
        let ids = plan
            .add_drafts(&[TaskDraft::new(WorkerRole::Frontend, "ui v2")])
            .unwrap();
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn test_eligibility_follows_completion() {
        let mut plan = diamond();
        assert_eq!(plan.eligible(), vec![1, 2]);
        finish(&mut plan, 1);
        assert_eq!(plan.eligible(), vec![2]);
        finish(&mut plan, 2);
        assert_eq!(plan.eligible(), vec![3]);
    }

    #[test]
    fn test_cancel_propagates_but_spares_completed() {
        let mut plan = diamond();
        finish(&mut plan, 1);
        let changed = plan.cancel(2, "user changed mind").unwrap();
        assert_eq!(changed, vec![2, 3, 4]);
        assert_eq!(plan.get(1).unwrap().status, TaskStatus::Completed);
        assert_eq!(plan.get(4).unwrap().status, TaskStatus::Cancelled);

        // cancelling a completed task is a no-op
        assert!(plan.cancel(1, "late").unwrap().is_empty());
        assert_eq!(plan.get(1).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_cancel_twice_is_idempotent() {
        let mut once = diamond();
        once.cancel(3, "x").unwrap();
        let mut twice = once.clone();
        assert!(twice.cancel(3, "x").unwrap().is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_failed_dependency_blocks_dependents() {
        let mut plan = diamond();
        let task = plan.get_mut(1).unwrap();
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Failed).unwrap();

        let blocked = plan.propagate_blocked();
        assert_eq!(blocked, vec![3, 4]);
        assert_eq!(plan.get(2).unwrap().status, TaskStatus::Pending);
    }

    fn fail(plan: &mut Plan, id: TaskId) {
        let task = plan.get_mut(id).unwrap();
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Failed).unwrap();
    }

    #[test]
    fn test_reissue_revives_blocked_dependents() {
        let mut plan = diamond();
        fail(&mut plan, 1);
        assert_eq!(plan.propagate_blocked(), vec![3, 4]);
        assert_eq!(plan.get(3).unwrap().blocked_by, Some(1));

        let changed = plan.reissue(1, "re-issued by planner").unwrap();
        assert_eq!(changed, vec![1, 3, 4]);
        for id in [1, 3, 4] {
            assert_eq!(plan.get(id).unwrap().status, TaskStatus::Pending);
        }

        finish(&mut plan, 1);
        finish(&mut plan, 2);
        assert_eq!(plan.eligible(), vec![3]);
    }

    #[test]
    fn test_reissue_leaves_deliberate_cancellations() {
        let mut plan = diamond();
        fail(&mut plan, 1);
        plan.propagate_blocked();
        plan.cancel(2, "dropped by interrupt").unwrap();

        // 3 still needs the cancelled task 2
        assert_eq!(plan.reissue(1, "retry").unwrap(), vec![1]);
        assert_eq!(plan.get(3).unwrap().status, TaskStatus::Cancelled);
        assert_eq!(plan.get(4).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_reissue_requires_failed_task() {
        let mut plan = diamond();
        let err = plan.reissue(1, "retry").unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { task_id: 1, .. }));
    }

    #[test]
    fn test_requeue_interrupted() {
        let mut plan = diamond();
        plan.get_mut(1)
            .unwrap()
            .transition(TaskStatus::InProgress)
            .unwrap();
        assert_eq!(plan.requeue_interrupted().unwrap(), vec![1]);
        assert_eq!(plan.get(1).unwrap().status, TaskStatus::Pending);
    }
}
