//! Test harness wiring scripted collaborators to an in-memory database.

#![allow(dead_code)]

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use leadrun::db::{job_repo, lead_repo};
use leadrun::progress::NoopProgress;
use leadrun::{
    Checkpoint, CheckpointStore, Collaborators, Database, Job, JobParams, JobRunner,
    JobSupervisor, JobSupervisorBuilder, Lead, LeadScorer, ProgressReporter, RunOutcome,
    RunSettings, StopSignal, Tier,
};

use super::fakes::{ClaimCheckingStore, FakeDrafter, FakeEnricher, ScriptedSource};

pub const USER: &str = "user-1";

/// Isolated environment: one database, one set of collaborators.
pub struct TestHarness {
    pub db: Database,
    pub source: Arc<ScriptedSource>,
    pub enricher: Arc<FakeEnricher>,
    pub drafter: Arc<FakeDrafter>,
    pub store: Arc<ClaimCheckingStore>,
    pub settings: RunSettings,
}

impl TestHarness {
    pub fn new(source: ScriptedSource) -> Self {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        Self::with_database(db, source)
    }

    /// Harness sharing `db` with another harness.
    pub fn with_database(db: Database, source: ScriptedSource) -> Self {
        Self {
            store: Arc::new(ClaimCheckingStore::new(db.clone())),
            db,
            source: Arc::new(source),
            enricher: Arc::new(FakeEnricher::new()),
            drafter: Arc::new(FakeDrafter::new()),
            settings: RunSettings {
                checkpoint_interval: 2,
                ..RunSettings::default()
            },
        }
    }

    pub fn checkpoint_interval(mut self, interval: usize) -> Self {
        self.settings.checkpoint_interval = interval;
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.source.clone(),
            self.enricher.clone(),
            Arc::new(LeadScorer::default()),
            self.drafter.clone(),
        )
    }

    pub fn runner(&self) -> JobRunner {
        JobRunner::new(
            self.db.clone(),
            self.store.clone(),
            self.collaborators(),
            self.settings.clone(),
        )
    }

    /// Supervisor builder sharing this harness' store and settings.
    pub fn supervisor(&self) -> JobSupervisorBuilder {
        JobSupervisor::builder(self.db.clone(), self.collaborators())
            .settings(self.settings.clone())
            .checkpoint_store(self.store.clone())
    }

    /// Inserts a pending job.
    pub fn create_job(&self, user_id: &str, params: JobParams) -> Job {
        let job = Job::new(user_id, "coffee shops in austin", params);
        job_repo::insert(&self.db, &job).expect("Failed to insert job");
        job
    }

    pub fn job(&self, job_id: &str) -> Job {
        job_repo::find_by_id(&self.db, job_id)
            .expect("Failed to load job")
            .expect("Job missing")
    }

    /// Runs the job once, as stored.
    pub fn run(&self, job_id: &str) -> RunOutcome {
        self.run_with(job_id, &StopSignal::new(), &NoopProgress)
    }

    pub fn run_with(
        &self,
        job_id: &str,
        signal: &StopSignal,
        reporter: &dyn ProgressReporter,
    ) -> RunOutcome {
        let job = self.job(job_id);
        self.runner().run(&job, signal, reporter)
    }

    /// Runs the job once; `None` when the run panicked.
    pub fn run_catching(&self, job_id: &str) -> Option<RunOutcome> {
        let job = self.job(job_id);
        let runner = self.runner();
        panic::catch_unwind(AssertUnwindSafe(|| {
            runner.run(&job, &StopSignal::new(), &NoopProgress)
        }))
        .ok()
    }

    pub fn leads(&self, job_id: &str) -> Vec<Lead> {
        lead_repo::list_for_job(&self.db, job_id).expect("Failed to list leads")
    }

    pub fn checkpoint(&self, job_id: &str) -> Option<Checkpoint> {
        self.store.load(job_id).expect("Failed to load checkpoint")
    }
}

/// The observable result of a run, for comparing runs.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadView {
    pub source_index: usize,
    pub name: String,
    pub place_id: Option<String>,
    pub normalized_phone: Option<String>,
    pub email: Option<String>,
    pub tier: Option<Tier>,
    pub qualified: bool,
    pub outreach: Option<String>,
}

pub fn view(leads: &[Lead]) -> Vec<LeadView> {
    leads
        .iter()
        .map(|lead| LeadView {
            source_index: lead.source_index,
            name: lead.name.clone(),
            place_id: lead.place_id.clone(),
            normalized_phone: lead.normalized_phone.clone(),
            email: lead.email.clone(),
            tier: lead.tier,
            qualified: lead.qualified,
            outreach: lead.outreach.as_ref().map(|d| d.message.clone()),
        })
        .collect()
}
