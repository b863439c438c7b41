//! In-process job queue.
//!
//! Jobs wrap one entity's action set. Pending jobs are admitted in FIFO
//! order; `priority` is carried for reporting only. At most
//! `max_concurrent` jobs run at once, bounded by a semaphore. Each job
//! executes its actions independently through the shared retry loop: there
//! is no abort-on-fatal inside a job.
//!
//! All bookkeeping lives behind one `std::sync::Mutex` that is never held
//! across an await point.

mod export;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use remedy_interchange::{ActionSpec, IdGenerator, Job, JobFailure, JobReport, JobStatus, UuidIds};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::clock::{Clock, SystemClock};
use crate::executor::{execute_with_retry, ActionExecutor, RateLimit, RetryPolicy};

pub use export::{export_jobs, ExportError, ExportFormat, API_BASE_VAR};

/// Queue tuning, read from the `[queue]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    pub max_concurrent: usize,
    /// How many finished jobs [`ExecutionStats`] reports.
    pub recent_completions: usize,
    pub dry_run: bool,
    pub retries: RetryPolicy,
    pub rate_limit: RateLimit,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            max_concurrent: 3,
            recent_completions: 10,
            dry_run: false,
            retries: RetryPolicy::default(),
            rate_limit: RateLimit::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error("job '{0}' is already processing")]
    AlreadyProcessing(String),

    #[error("job '{id}' is {status}, only queued jobs can be executed")]
    NotQueued { id: String, status: JobStatus },
}

/// What to enqueue. Only `entity_id` and `actions` are required.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub entity_id: String,
    pub actions: Vec<ActionSpec>,
    pub priority: i32,
    pub operator_id: String,
    pub environment: String,
    pub metadata: Map<String, Value>,
}

impl JobRequest {
    pub fn new(entity_id: impl Into<String>, actions: Vec<ActionSpec>) -> Self {
        JobRequest {
            entity_id: entity_id.into(),
            actions,
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn operator(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = operator_id.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Jobs grouped by where they are in the lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// In admission order.
    pub pending: Vec<Job>,
    pub processing: Vec<Job>,
    /// Most recent first.
    pub recent: Vec<Job>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total_jobs: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
    pub current_concurrency: usize,
    pub max_concurrent: usize,
    pub average_actions_per_job: f64,
    /// Ids of the most recently finished jobs, most recent first.
    pub recent_completions: Vec<String>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<String, Job>,
    /// Submission order, for listing.
    submitted: Vec<String>,
    pending: VecDeque<String>,
    processing: HashSet<String>,
    recent: VecDeque<String>,
}

struct Inner {
    state: Mutex<State>,
    executor: Arc<dyn ActionExecutor>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    options: QueueOptions,
    permits: Arc<Semaphore>,
    idle: Notify,
}

/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct JobQueueService {
    inner: Arc<Inner>,
}

impl JobQueueService {
    pub fn new(executor: Arc<dyn ActionExecutor>, options: QueueOptions) -> Self {
        Self::with_parts(executor, options, Arc::new(UuidIds), Arc::new(SystemClock))
    }

    pub fn with_parts(
        executor: Arc<dyn ActionExecutor>,
        options: QueueOptions,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
        JobQueueService {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                executor,
                ids,
                clock,
                options,
                permits,
                idle: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Submission and cancellation ─────────────────────────────────────────

    pub fn submit_job(&self, request: JobRequest) -> String {
        let id = self.inner.ids.next_id("job");
        let now = self.inner.clock.now();
        let job = Job {
            id: id.clone(),
            entity_id: request.entity_id,
            actions: request.actions,
            status: JobStatus::Queued,
            priority: request.priority,
            operator_id: request.operator_id,
            environment: request.environment,
            created_at: now,
            updated_at: now,
            metadata: request.metadata,
            report: None,
        };
        tracing::info!(
            job_id = %id,
            entity_id = %job.entity_id,
            actions = job.actions.len(),
            "job queued"
        );

        let mut state = self.lock();
        state.jobs.insert(id.clone(), job);
        state.submitted.push(id.clone());
        state.pending.push_back(id.clone());
        id
    }

    /// Cancel a queued job. Returns `false`, changing nothing, for unknown
    /// jobs and jobs that are processing or finished.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let now = self.inner.clock.now();
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Queued {
            return false;
        }
        job.status = JobStatus::Cancelled;
        job.updated_at = now;
        state.pending.retain(|id| id != job_id);
        drop(state);

        tracing::info!(job_id, "job cancelled");
        self.inner.idle.notify_waiters();
        true
    }

    // ── Execution ───────────────────────────────────────────────────────────

    /// Run one queued job now and return it in its final state.
    ///
    /// Waits for a concurrency permit like queue-admitted jobs do.
    pub async fn execute_job(&self, job_id: &str) -> Result<Job, QueueError> {
        self.check_queued(job_id)?;
        let permit = self.inner.permits.clone().acquire_owned().await.ok();
        let actions = self.begin(job_id)?;
        let guard = ProcessingGuard::new(self.clone(), job_id.to_string(), permit, false);
        self.run(guard, actions).await;

        self.get_job(job_id)
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))
    }

    /// Admit pending jobs while permits are free, each on its own task.
    ///
    /// Job failures are logged by the job itself and never surface here.
    /// Must be called from within a tokio runtime; outside one it does
    /// nothing.
    pub fn process_queue(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("process_queue called outside a tokio runtime, nothing admitted");
            return;
        };
        loop {
            let Ok(permit) = self.inner.permits.clone().try_acquire_owned() else {
                return;
            };
            let Some(job_id) = self.lock().pending.front().cloned() else {
                return;
            };
            let actions = match self.begin(&job_id) {
                Ok(actions) => actions,
                Err(err) => {
                    // begin() removes the id from pending on every path.
                    tracing::warn!(
                        job_id = %job_id,
                        error = %err,
                        "skipping unrunnable pending job"
                    );
                    continue;
                }
            };
            let service = self.clone();
            let guard = ProcessingGuard::new(self.clone(), job_id, Some(permit), true);
            handle.spawn(async move { service.run(guard, actions).await });
        }
    }

    /// Admit pending jobs and wait until none are pending or processing.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            self.process_queue();
            {
                let state = self.lock();
                if state.pending.is_empty() && state.processing.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    fn check_queued(&self, job_id: &str) -> Result<(), QueueError> {
        let state = self.lock();
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;
        match job.status {
            JobStatus::Queued => Ok(()),
            JobStatus::Processing => Err(QueueError::AlreadyProcessing(job_id.to_string())),
            status => Err(QueueError::NotQueued {
                id: job_id.to_string(),
                status,
            }),
        }
    }

    /// Move a queued job to `Processing` and hand out its actions.
    fn begin(&self, job_id: &str) -> Result<Vec<ActionSpec>, QueueError> {
        let now = self.inner.clock.now();
        let mut state = self.lock();
        state.pending.retain(|id| id != job_id);
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::UnknownJob(job_id.to_string()))?;
        match job.status {
            JobStatus::Queued => {}
            JobStatus::Processing => return Err(QueueError::AlreadyProcessing(job_id.to_string())),
            status => {
                return Err(QueueError::NotQueued {
                    id: job_id.to_string(),
                    status,
                })
            }
        }
        job.status = JobStatus::Processing;
        job.updated_at = now;
        let actions = job.actions.clone();
        state.processing.insert(job_id.to_string());
        tracing::info!(job_id, actions = actions.len(), "job started");
        Ok(actions)
    }

    async fn run(&self, mut guard: ProcessingGuard, actions: Vec<ActionSpec>) {
        let options = &self.inner.options;
        let mut report = JobReport {
            simulated: options.dry_run,
            ..JobReport::default()
        };
        for action in &actions {
            if options.dry_run {
                report.executed.push(action.id.clone());
            } else {
                let outcome =
                    execute_with_retry(self.inner.executor.as_ref(), action, &options.retries)
                        .await;
                match outcome.result {
                    Ok(_) => report.executed.push(action.id.clone()),
                    Err(err) => report.failed.push(JobFailure {
                        action_id: action.id.clone(),
                        error: err.to_string(),
                        attempts: outcome.attempts,
                    }),
                }
            }
            options.rate_limit.pause().await;
        }
        guard.report = Some(report);
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.lock().jobs.get(job_id).cloned()
    }

    /// Every job in submission order.
    pub fn list_jobs(&self) -> Vec<Job> {
        let state = self.lock();
        state
            .submitted
            .iter()
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect()
    }

    pub fn get_queue(&self) -> QueueSnapshot {
        let state = self.lock();
        let mut processing = jobs_for(&state, state.processing.iter());
        processing.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        QueueSnapshot {
            pending: jobs_for(&state, state.pending.iter()),
            processing,
            recent: jobs_for(&state, state.recent.iter()),
        }
    }

    pub fn execution_stats(&self) -> ExecutionStats {
        let state = self.lock();
        let mut by_status = BTreeMap::new();
        let mut total_actions = 0usize;
        for job in state.jobs.values() {
            *by_status.entry(job.status).or_insert(0) += 1;
            total_actions += job.actions.len();
        }
        let total_jobs = state.jobs.len();
        ExecutionStats {
            total_jobs,
            by_status,
            current_concurrency: state.processing.len(),
            max_concurrent: self.inner.options.max_concurrent,
            average_actions_per_job: if total_jobs == 0 {
                0.0
            } else {
                total_actions as f64 / total_jobs as f64
            },
            recent_completions: state.recent.iter().cloned().collect(),
        }
    }

    /// Render every job in `format`.
    pub fn export(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_jobs(&self.list_jobs(), format)
    }
}

fn jobs_for<'a>(state: &'a State, ids: impl Iterator<Item = &'a String>) -> Vec<Job> {
    ids.filter_map(|id| state.jobs.get(id).cloned()).collect()
}

/// Moves a job out of `Processing` when dropped, whether the run finished
/// or its task panicked. A missing report means the run was interrupted.
struct ProcessingGuard {
    service: JobQueueService,
    job_id: String,
    permit: Option<OwnedSemaphorePermit>,
    /// Admitted by `process_queue`, so finishing should admit the next job.
    readmit: bool,
    report: Option<JobReport>,
}

impl ProcessingGuard {
    fn new(
        service: JobQueueService,
        job_id: String,
        permit: Option<OwnedSemaphorePermit>,
        readmit: bool,
    ) -> Self {
        ProcessingGuard {
            service,
            job_id,
            permit,
            readmit,
            report: None,
        }
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        let inner = &self.service.inner;
        let now = inner.clock.now();
        let report = self.report.take();
        let status = match &report {
            Some(r) if r.failed.is_empty() => JobStatus::Completed,
            _ => JobStatus::Failed,
        };

        {
            let mut state = self.service.lock();
            state.processing.remove(&self.job_id);
            if let Some(job) = state.jobs.get_mut(&self.job_id) {
                job.status = status;
                job.updated_at = now;
                job.report = report.clone();
            }
            state.recent.push_front(self.job_id.clone());
            state.recent.truncate(inner.options.recent_completions);
        }

        match &report {
            Some(r) => tracing::info!(
                job_id = %self.job_id,
                %status,
                executed = r.executed.len(),
                failed = r.failed.len(),
                "job finished"
            ),
            None => tracing::error!(job_id = %self.job_id, "job interrupted, marked failed"),
        }

        self.permit.take();
        inner.idle.notify_waiters();
        if self.readmit {
            self.service.process_queue();
        }
    }
}
