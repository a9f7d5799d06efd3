//! Job lifecycle management.
//!
//! The supervisor admits runs against the global and per-user limits, runs
//! each admitted job on its own thread and records the outcome on the job
//! row. Stop requests (cancel, pause, timeout) are cooperative: the run
//! observes them before its next item.

mod maintenance;
mod signal;

pub use maintenance::{Maintenance, MaintenanceHandle};
pub use signal::{StopReason, StopSignal};

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::checkpoint::{CheckpointStore, SqliteCheckpointStore};
use crate::config::EngineConfig;
use crate::db::job_repo::{self, JobFinish};
use crate::db::{lead_repo, Database, DatabaseError};
use crate::job::{InvalidParams, Job, JobFilter, JobParams, JobStatus};
use crate::lead::Lead;
use crate::pipeline::{JobRunner, RunOutcome, RunSettings, Stage};
use crate::progress::{PersistentProgress, Progress, ProgressBoard};
use crate::providers::Collaborators;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {0} is already running")]
    AlreadyActive(String),

    #[error("Too many jobs running (limit {limit})")]
    CapacityReached { limit: usize },

    #[error("User {user_id} already runs {limit} job(s)")]
    UserLimitReached { user_id: String, limit: usize },

    #[error("Job {0} is not running in this process")]
    NotActive(String),

    #[error(transparent)]
    InvalidParams(#[from] InvalidParams),

    #[error("Job {job_id} cannot be resumed safely: {reason}")]
    ResumeUnsafe { job_id: String, reason: String },

    #[error("Job {0} changed state concurrently")]
    StateChanged(String),

    #[error("Failed to spawn run thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

const PARAMS_CHANGED: &str =
    "resume unsafe: job parameters changed since the last checkpoint; restart the job to run with the new parameters";

const INTERRUPTED: &str = "interrupted: process restarted while the job was running";

const DEFAULT_EVENT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct Limits {
    max_concurrent_jobs: usize,
    max_jobs_per_user: usize,
    job_timeout: Option<Duration>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: num_cpus::get(),
            max_jobs_per_user: 1,
            job_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

struct ActiveRun {
    user_id: String,
    signal: Arc<StopSignal>,
    started: Instant,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    db: Database,
    store: Arc<dyn CheckpointStore>,
    runner: JobRunner,
    limits: Limits,
    board: Arc<ProgressBoard>,
    broadcaster: JobProgressBroadcaster,
    event_retention: Duration,
    active: Mutex<HashMap<String, ActiveRun>>,
}

/// Owns the lifecycle of every job of this process.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<Inner>,
}

pub struct JobSupervisorBuilder {
    db: Database,
    collaborators: Collaborators,
    settings: RunSettings,
    limits: Limits,
    store: Option<Arc<dyn CheckpointStore>>,
    channel_capacity: usize,
    replay_buffer: usize,
    event_retention: Duration,
}

impl JobSupervisorBuilder {
    /// Takes run settings, limits and channel sizes from the engine config.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.settings = config.run_settings();
        self.limits = Limits {
            max_concurrent_jobs: config.max_concurrent_jobs,
            max_jobs_per_user: config.max_jobs_per_user,
            job_timeout: config.job_timeout(),
        };
        self.channel_capacity = config.progress.channel_capacity;
        self.replay_buffer = config.progress.replay_buffer;
        self.event_retention = config.progress.retention();
        self
    }

    pub fn settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_concurrent_jobs(mut self, limit: usize) -> Self {
        self.limits.max_concurrent_jobs = limit;
        self
    }

    pub fn max_jobs_per_user(mut self, limit: usize) -> Self {
        self.limits.max_jobs_per_user = limit;
        self
    }

    /// `None` disables the timeout.
    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.limits.job_timeout = timeout;
        self
    }

    /// How long the events of a stopped job stay available to
    /// `recent_events` once maintenance runs.
    pub fn event_retention(mut self, retention: Duration) -> Self {
        self.event_retention = retention;
        self
    }

    /// Replaces the SQLite checkpoint store.
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> JobSupervisor {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(SqliteCheckpointStore::new(self.db.clone())));
        let runner = JobRunner::new(
            self.db.clone(),
            Arc::clone(&store),
            self.collaborators,
            self.settings,
        );
        JobSupervisor {
            inner: Arc::new(Inner {
                db: self.db,
                store,
                runner,
                limits: self.limits,
                board: Arc::new(ProgressBoard::new()),
                broadcaster: JobProgressBroadcaster::new(self.channel_capacity, self.replay_buffer),
                event_retention: self.event_retention,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl JobSupervisor {
    pub fn builder(db: Database, collaborators: Collaborators) -> JobSupervisorBuilder {
        JobSupervisorBuilder {
            db,
            collaborators,
            settings: RunSettings::default(),
            limits: Limits::default(),
            store: None,
            channel_capacity: 100,
            replay_buffer: 100,
            event_retention: DEFAULT_EVENT_RETENTION,
        }
    }

    /// Creates a pending job.
    pub fn create_job(
        &self,
        user_id: &str,
        query: &str,
        params: JobParams,
    ) -> Result<Job, SupervisorError> {
        if query.trim().is_empty() {
            return Err(InvalidParams {
                reason: "query must not be empty".to_string(),
            }
            .into());
        }
        params.validate(self.inner.runner.settings().max_results_limit)?;

        let job = Job::new(user_id, query.trim(), params);
        job_repo::insert(&self.inner.db, &job)?;
        info!(job_id = %job.id, user_id, "Job created");
        self.inner.announce(&job.id, JobStatus::Pending, None, None);
        Ok(job)
    }

    /// Starts a pending job on its own thread.
    pub fn start(&self, user_id: &str, job_id: &str) -> Result<Job, SupervisorError> {
        let job = self.owned_job(user_id, job_id)?;
        if job.status != JobStatus::Pending {
            return Err(SupervisorError::InvalidTransition {
                job_id: job.id,
                from: job.status,
                to: JobStatus::Running,
            });
        }
        self.launch(job, &[JobStatus::Pending])
    }

    /// Resumes a paused or resumable job from its checkpoint.
    ///
    /// Passing parameters that differ from the stored ones fails the job:
    /// its checkpoint no longer matches and only a restart can use them.
    pub fn resume(
        &self,
        user_id: &str,
        job_id: &str,
        params: Option<JobParams>,
    ) -> Result<Job, SupervisorError> {
        let job = self.owned_job(user_id, job_id)?;
        if !job.status.is_resumable() {
            return Err(SupervisorError::InvalidTransition {
                job_id: job.id,
                from: job.status,
                to: JobStatus::Running,
            });
        }

        if let Some(params) = params {
            if params.fingerprint() != job.params.fingerprint() {
                return Err(self.reject_resume(&job));
            }
        }

        self.launch(job, &[JobStatus::Paused, JobStatus::FailedResumable])
    }

    /// Cancels a job. Running jobs stop at their next item; jobs that are
    /// not running are cancelled right away.
    pub fn cancel(&self, user_id: &str, job_id: &str) -> Result<(), SupervisorError> {
        let job = self.owned_job(user_id, job_id)?;
        let active = self.inner.lock_active();

        if let Some(run) = active.get(&job.id) {
            if run.signal.request(StopReason::Cancel) {
                info!(job_id = %job.id, "Cancellation requested");
            }
            return Ok(());
        }

        // Only reachable for `running` when the run died with an earlier process.
        if !job.status.can_transition_to(JobStatus::Cancelled) {
            return Err(SupervisorError::InvalidTransition {
                job_id: job.id,
                from: job.status,
                to: JobStatus::Cancelled,
            });
        }
        let outcome = JobFinish {
            status: JobStatus::Cancelled,
            error: None,
            error_stage: None,
            summary: None,
            clear_checkpoint: true,
        };
        if !job_repo::finish(&self.inner.db, &job.id, &[job.status], &outcome, Utc::now())? {
            return Err(SupervisorError::StateChanged(job.id));
        }
        drop(active);

        info!(job_id = %job.id, from = %job.status, "Job cancelled");
        self.inner.announce(&job.id, JobStatus::Cancelled, None, None);
        Ok(())
    }

    /// Asks a running job to pause at its next item.
    pub fn pause(&self, user_id: &str, job_id: &str) -> Result<(), SupervisorError> {
        let job = self.owned_job(user_id, job_id)?;
        let active = self.inner.lock_active();
        let run = active
            .get(&job.id)
            .ok_or_else(|| SupervisorError::NotActive(job.id.clone()))?;
        if run.signal.request(StopReason::Pause) {
            info!(job_id = %job.id, "Pause requested");
        }
        Ok(())
    }

    /// Puts a stopped or finished job back to `pending` with its leads,
    /// checkpoint and progress dropped. `params` replaces the stored ones.
    pub fn restart(
        &self,
        user_id: &str,
        job_id: &str,
        params: Option<JobParams>,
    ) -> Result<Job, SupervisorError> {
        let job = self.owned_job(user_id, job_id)?;
        let params = params.unwrap_or_else(|| job.params.clone());
        params.validate(self.inner.runner.settings().max_results_limit)?;

        let active = self.inner.lock_active();
        if active.contains_key(&job.id) {
            return Err(SupervisorError::AlreadyActive(job.id));
        }
        if !job.status.can_transition_to(JobStatus::Pending) {
            return Err(SupervisorError::InvalidTransition {
                job_id: job.id,
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        if !job_repo::reset_for_restart(&self.inner.db, &job.id, &[job.status], &params, Utc::now())? {
            return Err(SupervisorError::StateChanged(job.id));
        }
        drop(active);

        self.inner.board.remove(&job.id);
        self.inner.broadcaster.forget(&job.id);
        info!(job_id = %job.id, from = %job.status, "Job reset for restart");
        self.inner.announce(&job.id, JobStatus::Pending, None, None);
        self.inner.load(&job.id)
    }

    /// Latest progress of a job, from memory while it runs, else from its row.
    pub fn progress(&self, user_id: &str, job_id: &str) -> Result<Option<Progress>, SupervisorError> {
        let job = self.owned_job(user_id, job_id)?;
        Ok(self.inner.board.get(&job.id).or(job.progress))
    }

    pub fn get_job(&self, user_id: &str, job_id: &str) -> Result<Job, SupervisorError> {
        self.owned_job(user_id, job_id)
    }

    /// Jobs of a user, newest first, with the total count before paging.
    pub fn list_jobs(
        &self,
        user_id: &str,
        filter: &JobFilter,
    ) -> Result<(Vec<Job>, u64), SupervisorError> {
        Ok(job_repo::query(&self.inner.db, user_id, filter)?)
    }

    /// Leads of a job in discovery order.
    pub fn list_leads(&self, user_id: &str, job_id: &str) -> Result<Vec<Lead>, SupervisorError> {
        let job = self.owned_job(user_id, job_id)?;
        Ok(lead_repo::list_for_job(&self.inner.db, &job.id)?)
    }

    /// Marks jobs left `running` by an earlier process as resumable.
    ///
    /// Call once at startup, before starting new runs. Returns the ids of
    /// the recovered jobs.
    pub fn recover_interrupted(&self) -> Result<Vec<String>, SupervisorError> {
        let active = self.inner.lock_active();
        let recovered = recover_jobs(&self.inner.db, self.inner.store.as_ref(), |id| {
            active.contains_key(id)
        })?;
        drop(active);

        for (job_id, stage) in &recovered {
            self.inner.announce(
                job_id,
                JobStatus::FailedResumable,
                Some(INTERRUPTED.to_string()),
                *stage,
            );
        }
        Ok(recovered.into_iter().map(|(id, _)| id).collect())
    }

    /// Asks runs past the job timeout to stop. Returns how many were asked.
    pub fn check_timeouts(&self) -> usize {
        let Some(timeout) = self.inner.limits.job_timeout else {
            return 0;
        };
        let active = self.inner.lock_active();
        let mut signalled = 0;
        for (job_id, run) in active.iter() {
            if run.started.elapsed() >= timeout && run.signal.request(StopReason::Timeout) {
                warn!(job_id = %job_id, elapsed_secs = run.started.elapsed().as_secs(), "Job timed out");
                signalled += 1;
            }
        }
        signalled
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.inner.lock_active().contains_key(job_id)
    }

    /// Blocks until the run of `job_id` has finished. Returns immediately
    /// when the job is not running here.
    pub fn wait(&self, job_id: &str) {
        let handle = self
            .inner
            .lock_active()
            .get_mut(job_id)
            .and_then(|run| run.handle.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(job_id, "Run thread panicked outside the runner");
            }
        }
    }

    /// Pauses every running job and waits for the runs to stop.
    pub fn shutdown(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut active = self.inner.lock_active();
            active
                .iter_mut()
                .filter_map(|(job_id, run)| {
                    run.signal.request(StopReason::Pause);
                    run.handle.take().map(|h| (job_id.clone(), h))
                })
                .collect()
        };

        info!(count = handles.len(), "Shutting down, pausing running jobs");
        for (job_id, handle) in handles {
            if handle.join().is_err() {
                error!(job_id = %job_id, "Run thread panicked outside the runner");
            } else {
                debug!(job_id = %job_id, "Run stopped");
            }
        }
    }

    /// Live job events. Progress and status changes of every job.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobProgressEvent> {
        self.inner.broadcaster.subscribe()
    }

    /// Recent events of a job, oldest first.
    pub fn recent_events(&self, job_id: &str) -> Vec<JobProgressEvent> {
        self.inner.broadcaster.recent(job_id)
    }

    fn owned_job(&self, user_id: &str, job_id: &str) -> Result<Job, SupervisorError> {
        let job = self.inner.load(job_id)?;
        if job.user_id != user_id {
            return Err(SupervisorError::NotFound(job_id.to_string()));
        }
        Ok(job)
    }

    fn reject_resume(&self, job: &Job) -> SupervisorError {
        let outcome = JobFinish {
            status: JobStatus::Failed,
            error: Some(PARAMS_CHANGED.to_string()),
            error_stage: self.inner.checkpoint_stage(&job.id),
            summary: None,
            clear_checkpoint: true,
        };
        match job_repo::finish(&self.inner.db, &job.id, &[job.status], &outcome, Utc::now()) {
            Ok(true) => {
                warn!(job_id = %job.id, "Resume refused, parameters changed");
                self.inner
                    .announce(&job.id, JobStatus::Failed, outcome.error, outcome.error_stage);
                SupervisorError::ResumeUnsafe {
                    job_id: job.id.clone(),
                    reason: PARAMS_CHANGED.to_string(),
                }
            }
            Ok(false) => SupervisorError::StateChanged(job.id.clone()),
            Err(e) => e.into(),
        }
    }

    fn launch(&self, job: Job, from: &[JobStatus]) -> Result<Job, SupervisorError> {
        let inner = &self.inner;
        let mut active = inner.lock_active();

        if active.contains_key(&job.id) {
            return Err(SupervisorError::AlreadyActive(job.id));
        }
        if active.len() >= inner.limits.max_concurrent_jobs {
            return Err(SupervisorError::CapacityReached {
                limit: inner.limits.max_concurrent_jobs,
            });
        }
        let user_runs = active.values().filter(|r| r.user_id == job.user_id).count();
        if user_runs >= inner.limits.max_jobs_per_user {
            return Err(SupervisorError::UserLimitReached {
                user_id: job.user_id,
                limit: inner.limits.max_jobs_per_user,
            });
        }

        if !job_repo::mark_running(&inner.db, &job.id, from, Utc::now())? {
            return Err(SupervisorError::StateChanged(job.id));
        }
        let job = inner.load(&job.id)?;
        inner.announce(&job.id, JobStatus::Running, None, None);

        let signal = Arc::new(StopSignal::new());
        let thread_inner = Arc::clone(inner);
        let thread_job = job.clone();
        let thread_signal = Arc::clone(&signal);
        let spawned = thread::Builder::new()
            .name(format!("leadrun-job-{}", job.id))
            .spawn(move || thread_inner.execute(thread_job, thread_signal));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let outcome = JobFinish {
                    status: JobStatus::FailedResumable,
                    error: Some(format!("could not start run: {}", e)),
                    error_stage: None,
                    summary: None,
                    clear_checkpoint: false,
                };
                job_repo::finish(&inner.db, &job.id, &[JobStatus::Running], &outcome, Utc::now())?;
                inner.announce(&job.id, JobStatus::FailedResumable, outcome.error, None);
                return Err(SupervisorError::Spawn(e));
            }
        };

        // The run removes itself on exit, which waits for this lock.
        active.insert(
            job.id.clone(),
            ActiveRun {
                user_id: job.user_id.clone(),
                signal,
                started: Instant::now(),
                handle: Some(handle),
            },
        );
        drop(active);

        info!(job_id = %job.id, user_id = %job.user_id, "Job started");
        Ok(job)
    }
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.active.lock().unwrap_or_else(|poisoned| {
            warn!("Active run registry lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn load(&self, job_id: &str) -> Result<Job, SupervisorError> {
        job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| SupervisorError::NotFound(job_id.to_string()))
    }

    fn checkpoint_stage(&self, job_id: &str) -> Option<Stage> {
        match self.store.load(job_id) {
            Ok(checkpoint) => checkpoint.map(|c| c.stage),
            Err(e) => {
                warn!(job_id, error = %e, "Failed to read checkpoint");
                None
            }
        }
    }

    fn announce(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        error_stage: Option<Stage>,
    ) {
        self.broadcaster
            .send(JobProgressEvent::status(job_id, status, error, error_stage));
    }

    /// Body of a run thread.
    fn execute(&self, job: Job, signal: Arc<StopSignal>) {
        let reporter = PersistentProgress::new(
            &job.id,
            self.db.clone(),
            Arc::clone(&self.board),
            self.broadcaster.clone(),
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.runner.run(&job, &signal, &reporter)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(job_id = %job.id, panic = %message, "Run panicked");
            RunOutcome::FailedResumable {
                stage: self.checkpoint_stage(&job.id),
                error: format!("run panicked: {}", message),
            }
        });

        // Recorded under the registry lock, so a cancel accepted for this
        // run is applied to the outcome.
        let mut active = self.lock_active();
        let outcome = settle(outcome, signal.requested());
        self.finalize(&job, outcome);
        active.remove(&job.id);
    }

    fn finalize(&self, job: &Job, outcome: RunOutcome) {
        let finish = match outcome {
            RunOutcome::Completed(summary) => JobFinish {
                status: JobStatus::Completed,
                error: None,
                error_stage: None,
                summary: Some(summary),
                clear_checkpoint: true,
            },
            RunOutcome::Paused => JobFinish {
                status: JobStatus::Paused,
                error: None,
                error_stage: None,
                summary: None,
                clear_checkpoint: false,
            },
            RunOutcome::Cancelled => JobFinish {
                status: JobStatus::Cancelled,
                error: None,
                error_stage: None,
                summary: None,
                clear_checkpoint: true,
            },
            RunOutcome::FailedResumable { stage, error } => JobFinish {
                status: JobStatus::FailedResumable,
                error: Some(error),
                error_stage: stage,
                summary: None,
                clear_checkpoint: false,
            },
            RunOutcome::Failed { stage, error } => JobFinish {
                status: JobStatus::Failed,
                error: Some(error),
                error_stage: stage,
                summary: None,
                clear_checkpoint: true,
            },
        };

        match job_repo::finish(&self.db, &job.id, &[JobStatus::Running], &finish, Utc::now()) {
            Ok(true) => info!(job_id = %job.id, status = %finish.status, "Run finished"),
            Ok(false) => warn!(job_id = %job.id, "Job left running before its run finished"),
            // Stays `running`; recovery on the next start makes it resumable.
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to record run outcome"),
        }

        self.board.remove(&job.id);
        self.announce(&job.id, finish.status, finish.error, finish.error_stage);
    }
}

/// Applies a cancel the run did not observe before it returned.
fn settle(outcome: RunOutcome, requested: Option<StopReason>) -> RunOutcome {
    match outcome {
        RunOutcome::Cancelled => RunOutcome::Cancelled,
        outcome if requested == Some(StopReason::Cancel) => {
            debug!(?outcome, "Cancel arrived after the last item, cancelling");
            RunOutcome::Cancelled
        }
        outcome => outcome,
    }
}

/// Marks every `running` job as resumable, for tools that run no jobs
/// themselves.
pub fn recover_interrupted(
    db: &Database,
    store: &dyn CheckpointStore,
) -> Result<Vec<String>, SupervisorError> {
    Ok(recover_jobs(db, store, |_| false)?
        .into_iter()
        .map(|(id, _)| id)
        .collect())
}

fn recover_jobs(
    db: &Database,
    store: &dyn CheckpointStore,
    is_active: impl Fn(&str) -> bool,
) -> Result<Vec<(String, Option<Stage>)>, SupervisorError> {
    let mut recovered = Vec::new();

    for job in job_repo::find_by_status(db, JobStatus::Running)? {
        if is_active(&job.id) {
            continue;
        }
        let stage = match store.load(&job.id) {
            Ok(checkpoint) => checkpoint.map(|c| c.stage),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to read checkpoint");
                None
            }
        };
        let outcome = JobFinish {
            status: JobStatus::FailedResumable,
            error: Some(INTERRUPTED.to_string()),
            error_stage: stage,
            summary: None,
            clear_checkpoint: false,
        };
        if job_repo::finish(db, &job.id, &[JobStatus::Running], &outcome, Utc::now())? {
            warn!(job_id = %job.id, "Recovered interrupted job");
            recovered.push((job.id, stage));
        }
    }

    if !recovered.is_empty() {
        info!(count = recovered.len(), "Interrupted jobs recovered");
    }
    Ok(recovered)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bad state"));
        assert_eq!(panic_message(payload.as_ref()), "bad state");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_late_cancel_wins_over_outcome() {
        let summary = crate::job::JobSummary::default();
        assert_eq!(
            settle(RunOutcome::Paused, Some(StopReason::Cancel)),
            RunOutcome::Cancelled
        );
        assert_eq!(
            settle(RunOutcome::Completed(summary.clone()), Some(StopReason::Cancel)),
            RunOutcome::Cancelled
        );
        assert_eq!(
            settle(RunOutcome::Completed(summary.clone()), Some(StopReason::Pause)),
            RunOutcome::Completed(summary)
        );
        assert_eq!(settle(RunOutcome::Paused, None), RunOutcome::Paused);
        assert_eq!(
            settle(RunOutcome::Cancelled, Some(StopReason::Timeout)),
            RunOutcome::Cancelled
        );
    }

    #[test]
    fn test_error_messages() {
        let err = SupervisorError::InvalidTransition {
            job_id: "ab12cd34".to_string(),
            from: JobStatus::Completed,
            to: JobStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "Job ab12cd34 cannot move from completed to running"
        );
    }
}
