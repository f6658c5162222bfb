use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

use crate::capability::Capabilities;
use crate::error::{JobError, StoreError};
use crate::executor::{ExecutorSettings, JobChannels, JobExecutor, JobOutcome};
use crate::interrupt::{InterruptController, InterruptReport, InterruptRequest};
use crate::state::{JobEvent, JobId, JobRecord, JobState, JobStatus, JobStore, Stage};

const EVENT_CAPACITY: usize = 1000;

/// Live view of a job known to this process.
struct JobHandle {
    snapshot: Arc<watch::Sender<JobState>>,
    /// `None` while no executor is attached (paused or terminal).
    interrupts: Option<mpsc::Sender<InterruptRequest>>,
    outcome: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    fn detached(state: JobState) -> Self {
        let (_, outcome) = watch::channel(JobOutcome::from_state(&state));
        let (snapshot, _) = watch::channel(state);
        Self {
            snapshot: Arc::new(snapshot),
            interrupts: None,
            outcome,
        }
    }

    fn state(&self) -> JobState {
        self.snapshot.borrow().clone()
    }
}

struct Inner {
    caps: Capabilities,
    settings: ExecutorSettings,
    store: Arc<dyn JobStore>,
    events: broadcast::Sender<JobEvent>,
    jobs: RwLock<HashMap<JobId, JobHandle>>,
}

/// Submits jobs, routes interrupts and clarification answers, and exposes
/// job status. Cheap to clone.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<Inner>,
}

impl JobController {
    pub fn new(caps: Capabilities, settings: ExecutorSettings, store: Arc<dyn JobStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                caps,
                settings,
                store,
                events,
                jobs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Create a job and start executing it in the background.
    pub async fn submit(
        &self,
        request: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<JobId, JobError> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let state = JobState::new(job_id.clone(), user_id, request);
        self.inner.store.save(&JobRecord::new(state.clone())).await?;

        tracing::info!(target: "taskweave.jobs", job_id = %job_id, user_id = %state.user_id, "job submitted");
        let _ = self.inner.events.send(JobEvent::Submitted {
            job_id: job_id.clone(),
            timestamp: Utc::now(),
        });

        let mut jobs = self.inner.jobs.write().await;
        self.spawn(&mut jobs, state);
        Ok(job_id)
    }

    /// Deliver a mid-flight instruction. Running jobs handle it at their next
    /// safe point; paused jobs fold it into the request.
    pub async fn interrupt(
        &self,
        job_id: &str,
        message: impl Into<String>,
    ) -> Result<InterruptReport, JobError> {
        let message = message.into();
        self.ensure_loaded(job_id).await?;

        let jobs = self.inner.jobs.write().await;
        let handle = jobs
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let state = handle.state();

        match state.status {
            JobStatus::Succeeded | JobStatus::Failed => Err(JobError::InvalidState {
                job_id: job_id.to_string(),
                action: "accept interrupts",
                status: state.status.to_string(),
            }),
            JobStatus::AwaitingClarification => self.amend_paused(handle, job_id, &message).await,
            JobStatus::Running => {
                let sender = handle
                    .interrupts
                    .clone()
                    .ok_or_else(|| JobError::Disconnected(job_id.to_string()))?;
                drop(jobs);

                let (request, reply) = InterruptRequest::new(message.clone());
                let report = match sender.send(request).await {
                    Ok(()) => {
                        tracing::debug!(target: "taskweave.jobs", job_id = %job_id, "interrupt queued");
                        reply.await.ok()
                    }
                    Err(_) => None,
                };
                match report {
                    Some(report) if report.accepted => Ok(report),
                    rejected => self.after_executor_stopped(job_id, &message, rejected).await,
                }
            }
        }
    }

    /// Fold an interrupt into the request of a job paused for clarification.
    async fn amend_paused(
        &self,
        handle: &JobHandle,
        job_id: &str,
        message: &str,
    ) -> Result<InterruptReport, JobError> {
        let mut state = handle.state();
        let report = InterruptController::new()
            .handle(&mut state, &self.inner.caps, message)
            .await
            .map_err(|e| JobError::Disconnected(format!("{job_id}: {e}")))?;
        self.inner.store.save(&JobRecord::new(state.clone())).await?;
        handle.snapshot.send_replace(state);
        Ok(report)
    }

    /// The executor gave the interrupt back unapplied. If the job paused for
    /// clarification in the meantime, the message still amends the request.
    async fn after_executor_stopped(
        &self,
        job_id: &str,
        message: &str,
        rejected: Option<InterruptReport>,
    ) -> Result<InterruptReport, JobError> {
        {
            let jobs = self.inner.jobs.write().await;
            if let Some(handle) = jobs.get(job_id) {
                if handle.state().status == JobStatus::AwaitingClarification {
                    tracing::debug!(
                        target: "taskweave.jobs",
                        job_id = %job_id,
                        "job paused before the interrupt was applied"
                    );
                    return self.amend_paused(handle, job_id, message).await;
                }
            }
        }
        match rejected {
            Some(report) => Ok(report),
            None => Err(self.stopped_error(job_id).await),
        }
    }

    /// Live snapshot, falling back to the stored record.
    pub async fn get_status(&self, job_id: &str) -> Result<JobState, JobError> {
        if let Some(handle) = self.inner.jobs.read().await.get(job_id) {
            return Ok(handle.state());
        }
        self.inner
            .store
            .load(job_id)
            .await?
            .map(|record| record.state)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Record answers for a paused job and restart it at clarification.
    pub async fn answer_clarification(
        &self,
        job_id: &str,
        answers: Vec<String>,
    ) -> Result<(), JobError> {
        self.ensure_loaded(job_id).await?;
        let mut jobs = self.inner.jobs.write().await;
        let handle = jobs
            .get(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let mut state = handle.state();

        if state.status != JobStatus::AwaitingClarification {
            return Err(JobError::InvalidState {
                job_id: job_id.to_string(),
                action: "take clarification answers",
                status: state.status.to_string(),
            });
        }

        state
            .clarification
            .answers
            .extend(answers.into_iter().filter(|a| !a.trim().is_empty()));
        state.clarification.rounds += 1;
        state.clarification.questions.clear();
        state.status = JobStatus::Running;
        state.stage = Stage::Clarify;
        state.touch();
        self.inner.store.save(&JobRecord::new(state.clone())).await?;

        tracing::info!(
            target: "taskweave.jobs",
            job_id = %job_id,
            round = state.clarification.rounds,
            "clarification answered, resuming"
        );
        self.spawn(&mut jobs, state);
        Ok(())
    }

    /// Reconstruct a job from the store after a restart. Running jobs pick up
    /// where their last checkpoint left off; tasks that were in flight are
    /// dispatched again.
    pub async fn resume(&self, job_id: &str) -> Result<JobState, JobError> {
        let mut jobs = self.inner.jobs.write().await;
        if let Some(handle) = jobs.get(job_id) {
            let live = handle
                .interrupts
                .as_ref()
                .is_some_and(|tx| !tx.is_closed());
            if live {
                return Ok(handle.state());
            }
        }

        let record = self
            .inner
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let mut state = record.state;

        if state.status != JobStatus::Running {
            tracing::info!(target: "taskweave.jobs", job_id = %job_id, status = %state.status, "job restored without executor");
            jobs.insert(job_id.to_string(), JobHandle::detached(state.clone()));
            return Ok(state);
        }

        let requeued = state
            .plan
            .requeue_interrupted()
            .map_err(|e| StoreError::Corrupted(format!("{job_id}: {e}")))?;
        state.touch();
        tracing::info!(
            target: "taskweave.jobs",
            job_id = %job_id,
            stage = %state.stage,
            requeued = requeued.len(),
            "job resumed from store"
        );
        self.spawn(&mut jobs, state.clone());
        Ok(state)
    }

    /// Wait until the job stops running (terminal or paused).
    pub async fn wait(&self, job_id: &str) -> Result<JobOutcome, JobError> {
        self.ensure_loaded(job_id).await?;
        let mut outcome = {
            let jobs = self.inner.jobs.read().await;
            jobs.get(job_id)
                .ok_or_else(|| JobError::NotFound(job_id.to_string()))?
                .outcome
                .clone()
        };
        let result = outcome
            .wait_for(|o| o.is_some())
            .await
            .map_err(|_| JobError::Disconnected(job_id.to_string()))?;
        result
            .clone()
            .ok_or_else(|| JobError::Disconnected(job_id.to_string()))
    }

    /// Ids known to this process or to the store.
    pub async fn list_jobs(&self) -> Result<Vec<JobId>, JobError> {
        let mut ids = self.inner.store.list().await?;
        ids.extend(self.inner.jobs.read().await.keys().cloned());
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn spawn(&self, jobs: &mut HashMap<JobId, JobHandle>, state: JobState) {
        let job_id = state.job_id.clone();
        let snapshot = match jobs.get(&job_id) {
            Some(existing) => {
                existing.snapshot.send_replace(state.clone());
                existing.snapshot.clone()
            }
            None => Arc::new(watch::channel(state.clone()).0),
        };
        let (interrupt_tx, interrupt_rx) =
            mpsc::channel(self.inner.settings.engine.interrupt_queue_capacity.max(1));
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let executor = JobExecutor::new(
            state,
            self.inner.caps.clone(),
            self.inner.settings.clone(),
            self.inner.store.clone(),
            JobChannels {
                events: self.inner.events.clone(),
                snapshot: snapshot.clone(),
                interrupts: interrupt_rx,
            },
        );

        jobs.insert(
            job_id.clone(),
            JobHandle {
                snapshot,
                interrupts: Some(interrupt_tx),
                outcome: outcome_rx,
            },
        );

        tokio::spawn(async move {
            let outcome = executor.run().await;
            tracing::debug!(target: "taskweave.jobs", job_id = %job_id, success = outcome.is_success(), "executor finished");
            let _ = outcome_tx.send(Some(outcome));
        });
    }

    /// Make sure a stored job has a handle in this process.
    async fn ensure_loaded(&self, job_id: &str) -> Result<(), JobError> {
        if self.inner.jobs.read().await.contains_key(job_id) {
            return Ok(());
        }
        let record = self
            .inner
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        self.inner
            .jobs
            .write()
            .await
            .entry(job_id.to_string())
            .or_insert_with(|| JobHandle::detached(record.state));
        Ok(())
    }

    async fn stopped_error(&self, job_id: &str) -> JobError {
        match self.get_status(job_id).await {
            Ok(state) if state.status != JobStatus::Running => JobError::InvalidState {
                job_id: job_id.to_string(),
                action: "accept interrupts",
                status: state.status.to_string(),
            },
            Ok(_) => JobError::Disconnected(job_id.to_string()),
            Err(e) => e,
        }
    }
}
