use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use crate::capability::Capabilities;
use crate::error::PlanError;
use crate::nodes::{TaskOutcome, TaskSnapshot, Worker};
use crate::plan::{Plan, TaskId, TaskStatus};

/// What [`DependencyScheduler::record`] did with a worker outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Completed(TaskId),
    Failed(TaskId),
    /// The task was cancelled while it ran; its result is dropped.
    Discarded(TaskId),
}

/// Tasks moved by one [`DependencyScheduler::next_dispatch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Marked in progress; hand these to the pool.
    pub started: Vec<TaskId>,
    /// Cancelled because a dependency was cancelled or failed.
    pub blocked: Vec<TaskId>,
}

/// Eligibility bookkeeping over a plan. Holds no task state of its own.
#[derive(Debug, Clone, Copy)]
pub struct DependencyScheduler {
    max_concurrency: usize,
}

impl DependencyScheduler {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Cancel blocked tasks, then start as many eligible tasks (in plan order)
    /// as the free capacity allows.
    pub fn next_dispatch(&self, plan: &mut Plan, in_flight: usize) -> Dispatch {
        let blocked = plan.propagate_blocked();
        for id in &blocked {
            tracing::debug!(target: "taskweave.scheduler", task_id = *id, "task blocked, cancelled");
        }

        let free = self.max_concurrency.saturating_sub(in_flight);
        let mut started = Vec::new();
        for id in plan.eligible().into_iter().take(free) {
            let Some(task) = plan.get_mut(id) else {
                continue;
            };
            match task.transition(TaskStatus::InProgress) {
                Ok(()) => started.push(id),
                Err(e) => {
                    tracing::warn!(target: "taskweave.scheduler", task_id = id, error = %e, "dispatch skipped");
                }
            }
        }

        Dispatch { started, blocked }
    }

    /// Apply a worker outcome to the plan.
    pub fn record(plan: &mut Plan, outcome: &TaskOutcome) -> Result<Recorded, PlanError> {
        let task = plan
            .get_mut(outcome.task_id)
            .ok_or(PlanError::UnknownTask(outcome.task_id))?;

        if task.status != TaskStatus::InProgress {
            tracing::info!(
                target: "taskweave.scheduler",
                task_id = task.id,
                status = ?task.status,
                "discarding result of task that is no longer in progress"
            );
            return Ok(Recorded::Discarded(task.id));
        }

        task.transition(outcome.status)?;
        task.generated_tests = outcome.generated_tests.clone();
        task.self_validation_status = outcome.self_validation;
        task.repair_attempts = outcome.repair_attempts;
        match outcome.status {
            TaskStatus::Completed => {
                task.result = outcome.artifact.clone();
                task.note = None;
                Ok(Recorded::Completed(task.id))
            }
            _ => {
                task.note = outcome.error.clone();
                Ok(Recorded::Failed(task.id))
            }
        }
    }

    /// Nothing running and nothing left that could run.
    pub fn is_drained(plan: &Plan, in_flight: usize) -> bool {
        in_flight == 0 && !plan.has_active()
    }
}

/// Bounded pool of concurrent workers. Each dispatched task runs in its own
/// tokio task and reports back on the completion channel.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    worker: Arc<Worker>,
    caps: Capabilities,
    tx: mpsc::Sender<TaskOutcome>,
    rx: mpsc::Receiver<TaskOutcome>,
    in_flight: usize,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize, worker: Arc<Worker>, caps: Capabilities) -> Self {
        let permits = max_concurrency.max(1);
        let (tx, rx) = mpsc::channel(permits);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            worker,
            caps,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn dispatch(&mut self, snapshot: TaskSnapshot) {
        self.in_flight += 1;
        let task_id = snapshot.task.id;
        let semaphore = self.semaphore.clone();
        let worker = self.worker.clone();
        let caps = self.caps.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    // Run in a nested task so a panic still produces an outcome.
                    let run = tokio::spawn(async move { worker.execute(snapshot, &caps).await });
                    match run.await {
                        Ok(outcome) => outcome,
                        Err(e) => TaskOutcome::failed(task_id, format!("worker aborted: {e}")),
                    }
                }
                Err(_) => TaskOutcome::failed(task_id, "worker pool closed"),
            };
            if tx.send(outcome).await.is_err() {
                tracing::debug!(target: "taskweave.scheduler", task_id = task_id, "completion channel closed");
            }
        });
    }

    /// Next finished task, or `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<TaskOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let outcome = self.rx.recv().await?;
        self.in_flight -= 1;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{DependencyRef, TaskDraft, WorkerRole};
    use pretty_assertions::assert_eq;

    fn diamond() -> Plan {
        let mut plan = Plan::new();
        plan.add_drafts(&[
            TaskDraft::new(WorkerRole::Architect, "t1").keyed("t1"),
            TaskDraft::new(WorkerRole::Database, "t2").keyed("t2"),
            TaskDraft::new(WorkerRole::CodeBuilder, "t3")
                .after(DependencyRef::Key("t1".into()))
                .after(DependencyRef::Key("t2".into())),
        ])
        .unwrap();
        plan
    }

    #[test]
    fn test_dispatch_respects_capacity_and_dependencies() {
        let mut plan = diamond();
        let scheduler = DependencyScheduler::new(1);

        assert_eq!(scheduler.next_dispatch(&mut plan, 0).started, vec![1]);
        assert_eq!(scheduler.next_dispatch(&mut plan, 1).started, Vec::<TaskId>::new());

        DependencyScheduler::record(&mut plan, &TaskOutcome::completed(1, "a")).unwrap();
        assert_eq!(scheduler.next_dispatch(&mut plan, 0).started, vec![2]);

        DependencyScheduler::record(&mut plan, &TaskOutcome::completed(2, "b")).unwrap();
        assert_eq!(scheduler.next_dispatch(&mut plan, 0).started, vec![3]);
        DependencyScheduler::record(&mut plan, &TaskOutcome::completed(3, "c")).unwrap();
        assert!(DependencyScheduler::is_drained(&plan, 0));
    }

    #[test]
    fn test_failed_dependency_blocks_dependent() {
        let mut plan = diamond();
        let scheduler = DependencyScheduler::new(4);
        assert_eq!(scheduler.next_dispatch(&mut plan, 0).started, vec![1, 2]);

        DependencyScheduler::record(&mut plan, &TaskOutcome::failed(1, "boom")).unwrap();
        DependencyScheduler::record(&mut plan, &TaskOutcome::completed(2, "b")).unwrap();

        let dispatch = scheduler.next_dispatch(&mut plan, 0);
        assert_eq!(dispatch.started, Vec::<TaskId>::new());
        assert_eq!(dispatch.blocked, vec![3]);
        assert_eq!(plan.get(3).unwrap().status, TaskStatus::Cancelled);
        assert!(DependencyScheduler::is_drained(&plan, 0));
    }

    #[test]
    fn test_outcome_of_cancelled_task_is_discarded() {
        let mut plan = diamond();
        let scheduler = DependencyScheduler::new(4);
        scheduler.next_dispatch(&mut plan, 0);
        plan.cancel(2, "no longer needed").unwrap();

        let recorded =
            DependencyScheduler::record(&mut plan, &TaskOutcome::completed(2, "late")).unwrap();
        assert_eq!(recorded, Recorded::Discarded(2));
        assert_eq!(plan.get(2).unwrap().status, TaskStatus::Cancelled);
        assert!(plan.get(2).unwrap().result.is_none());
    }

    #[test]
    fn test_record_unknown_task_is_an_error() {
        let mut plan = diamond();
        let err = DependencyScheduler::record(&mut plan, &TaskOutcome::completed(9, "x")).unwrap_err();
        assert_eq!(err, PlanError::UnknownTask(9));
    }
}
