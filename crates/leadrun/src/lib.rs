pub mod broadcast;
pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod job;
pub mod lead;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod supervisor;
pub mod telemetry;

pub use broadcast::{JobProgressBroadcaster, JobProgressEvent};
pub use checkpoint::{Checkpoint, CheckpointStore, RunTally, SqliteCheckpointStore};
pub use config::{load_config, load_config_from_str, EngineConfig};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, LeadrunError, Result};
pub use job::{Job, JobFilter, JobParams, JobStatus, JobSummary, Language};
pub use lead::{Candidate, Enrichment, Lead, LeadScore, LeadScorer, OutreachDraft, Scorer, Tier};
pub use pipeline::{JobRunner, RunOutcome, RunSettings, Stage, StageError};
pub use progress::{Progress, ProgressBoard, ProgressReporter};
pub use providers::{
    CandidateSource, CandidateStream, Collaborators, Enricher, OutreachDrafter, ProviderError,
    ProviderErrorKind,
};
pub use supervisor::{
    JobSupervisor, JobSupervisorBuilder, Maintenance, MaintenanceHandle, StopReason, StopSignal,
    SupervisorError,
};
