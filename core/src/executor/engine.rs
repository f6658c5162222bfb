//! Drives one job through the stage graph.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};

use crate::capability::Capabilities;
use crate::config::{AppConfig, CostConfig, EngineConfig};
use crate::error::{CapabilityError, ExecutorError};
use crate::interrupt::{InterruptController, InterruptReport, InterruptRequest};
use crate::nodes::{
    Aggregator, Clarifier, Node, Planner, ResourceMonitor, Retriever, TaskSnapshot, Tester, Worker,
};
use crate::plan::TaskStatus;
use crate::state::{
    Applied, JobEvent, JobFailure, JobRecord, JobState, JobStatus, JobStore, NodeUpdate, Stage,
    StageTransition,
};

use super::outcome::JobOutcome;
use super::routing::{route, Route, RoutingLimits};
use super::scheduler::{DependencyScheduler, Recorded, WorkerPool};

/// Engine knobs pulled out of [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub engine: EngineConfig,
    pub cost: CostConfig,
    pub top_k: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ExecutorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            engine: cfg.engine.clone(),
            cost: cfg.cost.clone(),
            top_k: cfg.retrieval.top_k,
        }
    }

    fn limits(&self) -> RoutingLimits {
        RoutingLimits {
            max_self_corrections: self.engine.max_self_corrections,
        }
    }
}

/// Channels connecting an executor to its job controller.
pub struct JobChannels {
    pub events: broadcast::Sender<JobEvent>,
    pub snapshot: Arc<watch::Sender<JobState>>,
    pub interrupts: mpsc::Receiver<InterruptRequest>,
}

/// Sole owner of a job's state while it runs.
pub struct JobExecutor {
    state: JobState,
    caps: Capabilities,
    settings: ExecutorSettings,
    store: Arc<dyn JobStore>,
    channels: JobChannels,
    clarifier: Clarifier,
    retriever: Retriever,
    planner: Planner,
    monitor: ResourceMonitor,
    aggregator: Aggregator,
    tester: Tester,
    worker: Arc<Worker>,
    interrupts: InterruptController,
    scheduler: DependencyScheduler,
}

async fn run_node<N: Node>(
    node: &N,
    state: &JobState,
    caps: &Capabilities,
) -> Result<NodeUpdate, ExecutorError> {
    tracing::debug!(target: "taskweave.executor", job_id = %state.job_id, node = node.role(), "running node");
    let update = node.run(state, caps).await?;
    Ok(update.into())
}

impl JobExecutor {
    pub fn new(
        state: JobState,
        caps: Capabilities,
        settings: ExecutorSettings,
        store: Arc<dyn JobStore>,
        channels: JobChannels,
    ) -> Self {
        let engine = &settings.engine;
        Self {
            clarifier: Clarifier::new(engine.max_clarification_rounds),
            retriever: Retriever::new(settings.top_k),
            planner: Planner::new(),
            monitor: ResourceMonitor::new(settings.cost.clone()),
            aggregator: Aggregator::new(),
            tester: Tester::new(),
            worker: Arc::new(Worker::new(
                engine.intensive_validation,
                engine.repair_attempts,
            )),
            interrupts: InterruptController::new(),
            scheduler: DependencyScheduler::new(engine.effective_concurrency()),
            state,
            caps,
            settings,
            store,
            channels,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.state.job_id
    }

    /// Run until the job succeeds, fails, or pauses for clarification.
    pub async fn run(mut self) -> JobOutcome {
        tracing::info!(
            target: "taskweave.executor",
            job_id = %self.state.job_id,
            stage = %self.state.stage,
            "executor started"
        );
        let outcome = match self.drive().await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(err).await,
        };
        self.reject_queued_interrupts();
        outcome
    }

    async fn drive(&mut self) -> Result<JobOutcome, ExecutorError> {
        let limits = self.settings.limits();
        loop {
            self.drain_interrupts().await?;

            let stage = self.state.stage;
            match stage {
                Stage::Clarify => {
                    let update = run_node(&self.clarifier, &self.state, &self.caps).await?;
                    self.apply(update)?;
                }
                Stage::Retrieve => {
                    let update = run_node(&self.retriever, &self.state, &self.caps).await?;
                    self.apply(update)?;
                }
                Stage::Plan => self.run_planner().await?,
                Stage::EstimateCost => {
                    let update = run_node(&self.monitor, &self.state, &self.caps).await?;
                    self.apply(update)?;
                }
                Stage::Execute => self.execute_tasks().await?,
                Stage::Aggregate => {
                    if self.state.plan.has_active() {
                        return Err(ExecutorError::fatal(
                            "aggregation reached with pending or running tasks",
                        ));
                    }
                    let update = run_node(&self.aggregator, &self.state, &self.caps).await?;
                    self.apply(update)?;
                }
                Stage::Test => {
                    let update = run_node(&self.tester, &self.state, &self.caps).await?;
                    self.apply(update)?;
                }
                Stage::Completed | Stage::Failed => {
                    return JobOutcome::from_state(&self.state)
                        .ok_or_else(|| ExecutorError::fatal("terminal stage on a running job"));
                }
            }

            match route(stage, &self.state, &limits) {
                Route::Continue(next) => self.transition(next).await?,
                Route::AwaitClarification => return self.pause().await,
                Route::Replan => {
                    self.state.self_corrections += 1;
                    if let Some(report) = &self.state.validation_report {
                        self.state.planning_feedback.push(report.details.clone());
                    }
                    tracing::info!(
                        target: "taskweave.executor",
                        job_id = %self.state.job_id,
                        cycle = self.state.self_corrections,
                        "tests failed, replanning"
                    );
                    self.transition(Stage::Plan).await?;
                }
                Route::Succeed => return self.succeed().await,
                Route::Fail(reason) => return Err(ExecutorError::fatal(reason)),
            }
        }
    }

    fn apply(&mut self, update: NodeUpdate) -> Result<Applied, ExecutorError> {
        let kind = update.kind();
        let applied = self.state.apply(update)?;
        tracing::debug!(target: "taskweave.executor", job_id = %self.state.job_id, update = kind, ?applied, "update applied");
        self.publish();
        Ok(applied)
    }

    /// A rejected plan is discarded and the planner gets one more try with
    /// the reason attached; a second rejection fails the job.
    async fn run_planner(&mut self) -> Result<(), ExecutorError> {
        let mut hint: Option<String> = None;
        for attempt in 1..=2 {
            let rejection = match self
                .planner
                .plan(&self.state, &self.caps, hint.as_deref())
                .await
            {
                Ok(update) => match self.state.apply(NodeUpdate::Plan(update)) {
                    Ok(applied) => {
                        tracing::info!(target: "taskweave.executor", job_id = %self.state.job_id, ?applied, "plan updated");
                        self.publish();
                        return Ok(());
                    }
                    Err(err) => err.to_string(),
                },
                Err(err) if matches!(err.cause, CapabilityError::InvalidResponse(_)) => {
                    err.cause.to_string()
                }
                Err(err) => return Err(err.into()),
            };

            tracing::warn!(
                target: "taskweave.executor",
                job_id = %self.state.job_id,
                attempt = attempt,
                error = %rejection,
                "planner output rejected"
            );
            hint = Some(rejection);
        }

        Err(ExecutorError::fatal(format!(
            "planner output rejected twice: {}",
            hint.unwrap_or_default()
        )))
    }

    /// Dispatch eligible tasks and collect outcomes until nothing is left,
    /// applying interrupts as they arrive.
    async fn execute_tasks(&mut self) -> Result<(), ExecutorError> {
        let mut pool = WorkerPool::new(
            self.scheduler.max_concurrency(),
            self.worker.clone(),
            self.caps.clone(),
        );

        loop {
            self.dispatch_ready(&mut pool);
            if pool.in_flight() == 0 {
                if DependencyScheduler::is_drained(&self.state.plan, 0) {
                    return Ok(());
                }
                return Err(ExecutorError::fatal(
                    "scheduler stalled: pending tasks but nothing eligible",
                ));
            }

            tokio::select! {
                Some(outcome) = pool.next_completion() => {
                    let applied = self.apply(NodeUpdate::Task(outcome))?;
                    if let Applied::Task(recorded) = applied {
                        self.on_recorded(recorded);
                    }
                    if self.settings.engine.checkpoint_every_stage {
                        self.checkpoint().await?;
                    }
                }
                Some(request) = self.channels.interrupts.recv() => {
                    self.handle_interrupt(request).await?;
                }
            }
        }
    }

    fn dispatch_ready(&mut self, pool: &mut WorkerPool) {
        let dispatch = self
            .scheduler
            .next_dispatch(&mut self.state.plan, pool.in_flight());

        for id in dispatch.blocked {
            self.emit(JobEvent::TaskFinished {
                job_id: self.state.job_id.clone(),
                task_id: id,
                status: TaskStatus::Cancelled,
                timestamp: Utc::now(),
            });
        }
        for id in dispatch.started {
            let Some(snapshot) = TaskSnapshot::from_state(&self.state, id) else {
                continue;
            };
            tracing::info!(
                target: "taskweave.executor",
                job_id = %self.state.job_id,
                task_id = id,
                role = %snapshot.task.role,
                "task dispatched"
            );
            self.emit(JobEvent::TaskDispatched {
                job_id: self.state.job_id.clone(),
                task_id: id,
                role: snapshot.task.role,
                timestamp: Utc::now(),
            });
            pool.dispatch(snapshot);
        }
        self.publish();
    }

    fn on_recorded(&mut self, recorded: Recorded) {
        let job_id = self.state.job_id.clone();
        let event = match recorded {
            Recorded::Completed(task_id) => {
                self.state.costs.current += self.settings.cost.per_task;
                JobEvent::TaskFinished {
                    job_id,
                    task_id,
                    status: TaskStatus::Completed,
                    timestamp: Utc::now(),
                }
            }
            Recorded::Failed(task_id) => {
                self.state.costs.current += self.settings.cost.per_task;
                JobEvent::TaskFinished {
                    job_id,
                    task_id,
                    status: TaskStatus::Failed,
                    timestamp: Utc::now(),
                }
            }
            Recorded::Discarded(task_id) => JobEvent::TaskDiscarded {
                job_id,
                task_id,
                timestamp: Utc::now(),
            },
        };
        self.emit(event);
    }

    /// Safe point between stages: apply everything already queued.
    async fn drain_interrupts(&mut self) -> Result<(), ExecutorError> {
        while let Ok(request) = self.channels.interrupts.try_recv() {
            self.handle_interrupt(request).await?;
        }
        Ok(())
    }

    async fn handle_interrupt(&mut self, request: InterruptRequest) -> Result<(), ExecutorError> {
        let from = self.state.stage;
        let result = self
            .interrupts
            .handle(&mut self.state, &self.caps, &request.message)
            .await;

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                let _ = request
                    .reply
                    .send(InterruptReport::rejected(format!("interrupt failed the job: {err}")));
                return Err(err);
            }
        };

        if report.accepted {
            self.emit(JobEvent::InterruptApplied {
                job_id: self.state.job_id.clone(),
                summary: report.impact_summary.clone(),
                timestamp: Utc::now(),
            });
        }
        if let Some(to) = report.restart_stage {
            self.emit(JobEvent::StageChanged {
                job_id: self.state.job_id.clone(),
                from,
                to,
                timestamp: Utc::now(),
            });
        }
        self.publish();
        self.checkpoint().await?;

        if request.reply.send(report).is_err() {
            tracing::debug!(target: "taskweave.executor", job_id = %self.state.job_id, "interrupt caller went away");
        }
        Ok(())
    }

    async fn transition(&mut self, to: Stage) -> Result<(), ExecutorError> {
        let from = self.state.stage;
        StageTransition::validate(from, to)?;
        self.state.stage = to;
        self.state.touch();
        tracing::info!(
            target: "taskweave.executor",
            job_id = %self.state.job_id,
            from = %from,
            to = %to,
            "{}",
            StageTransition::stage_description(to)
        );
        self.emit(JobEvent::StageChanged {
            job_id: self.state.job_id.clone(),
            from,
            to,
            timestamp: Utc::now(),
        });
        self.publish();
        if self.settings.engine.checkpoint_every_stage {
            self.checkpoint().await?;
        }
        Ok(())
    }

    async fn pause(&mut self) -> Result<JobOutcome, ExecutorError> {
        self.state.status = JobStatus::AwaitingClarification;
        self.state.touch();
        self.checkpoint().await?;
        let questions = self.state.clarification.questions.clone();
        tracing::info!(
            target: "taskweave.executor",
            job_id = %self.state.job_id,
            questions = questions.len(),
            "paused for clarification"
        );
        self.emit(JobEvent::Paused {
            job_id: self.state.job_id.clone(),
            questions: questions.clone(),
            timestamp: Utc::now(),
        });
        self.publish();
        Ok(JobOutcome::AwaitingClarification { questions })
    }

    async fn succeed(&mut self) -> Result<JobOutcome, ExecutorError> {
        self.transition(Stage::Completed).await?;
        self.state.status = JobStatus::Succeeded;
        self.state.touch();
        self.checkpoint().await?;
        tracing::info!(
            target: "taskweave.executor",
            job_id = %self.state.job_id,
            self_corrections = self.state.self_corrections,
            cost = self.state.costs.current,
            "job succeeded"
        );
        self.emit(JobEvent::Completed {
            job_id: self.state.job_id.clone(),
            timestamp: Utc::now(),
        });
        self.publish();
        Ok(JobOutcome::Succeeded {
            deliverable: self.state.final_deliverable.clone().unwrap_or_default(),
        })
    }

    /// Terminal failure: keep the last state and report for inspection.
    async fn fail(&mut self, err: ExecutorError) -> JobOutcome {
        let reason = err.to_string();
        tracing::error!(
            target: "taskweave.executor",
            job_id = %self.state.job_id,
            stage = %self.state.stage,
            code = err.error_code().as_str(),
            error = %reason,
            "job failed"
        );

        let from = self.state.stage;
        if StageTransition::validate(from, Stage::Failed).is_ok() {
            self.state.stage = Stage::Failed;
            self.emit(JobEvent::StageChanged {
                job_id: self.state.job_id.clone(),
                from,
                to: Stage::Failed,
                timestamp: Utc::now(),
            });
        }
        self.state.status = JobStatus::Failed;
        self.state.failure = Some(JobFailure {
            reason: reason.clone(),
            code: err.error_code().as_str().to_string(),
            report: self.state.validation_report.clone(),
            failed_tasks: self.state.plan.ids_with_status(TaskStatus::Failed),
            cancelled_tasks: self.state.plan.ids_with_status(TaskStatus::Cancelled),
        });
        self.state.touch();

        if let Err(e) = self.checkpoint().await {
            tracing::error!(target: "taskweave.executor", job_id = %self.state.job_id, error = %e, "failed to persist failed job");
        }
        self.emit(JobEvent::Failed {
            job_id: self.state.job_id.clone(),
            reason,
            timestamp: Utc::now(),
        });
        self.publish();

        JobOutcome::from_state(&self.state).unwrap_or(JobOutcome::Failed {
            reason: err.to_string(),
            report: None,
            failed_tasks: Vec::new(),
            cancelled_tasks: Vec::new(),
        })
    }

    fn reject_queued_interrupts(&mut self) {
        self.channels.interrupts.close();
        while let Ok(request) = self.channels.interrupts.try_recv() {
            let _ = request.reply.send(InterruptReport::rejected(format!(
                "job is {}",
                self.state.status
            )));
        }
    }

    async fn checkpoint(&self) -> Result<(), ExecutorError> {
        self.store
            .save(&JobRecord::new(self.state.clone()))
            .await
            .map_err(ExecutorError::from)
    }

    fn publish(&self) {
        self.channels.snapshot.send_replace(self.state.clone());
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.channels.events.send(event);
    }
}
