//! Checkpoints: the durable resume point of a job run.
//!
//! A checkpoint names the stage in progress, the last index processed in
//! that stage's ordered input and the identifiers already handled. It is
//! saved wholesale and only ever claims items whose effects are already
//! committed, so a resumed run may repeat work past the checkpoint but
//! never skips any.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{checkpoint_repo, Database, DatabaseError};
use crate::pipeline::Stage;

/// Counters that must survive a restart together with the checkpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTally {
    /// Candidates pulled from the source, set when discovery finishes.
    pub examined: u64,
    pub duplicates: u64,
    pub malformed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub stage: Stage,
    pub processed_ids: BTreeSet<String>,
    /// Last processed position in the stage's input. `None` until the
    /// stage has handled its first item.
    pub last_index: Option<usize>,
    pub saved_at: DateTime<Utc>,
    pub params_fingerprint: String,
    pub tally: RunTally,
}

impl Checkpoint {
    /// A checkpoint at the start of `stage`.
    pub fn new(stage: Stage, params_fingerprint: impl Into<String>) -> Self {
        Self {
            stage,
            processed_ids: BTreeSet::new(),
            last_index: None,
            saved_at: Utc::now(),
            params_fingerprint: params_fingerprint.into(),
            tally: RunTally::default(),
        }
    }

    /// First index a resumed run should process.
    pub fn resume_index(&self) -> usize {
        self.last_index.map_or(0, |i| i + 1)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processed_ids.contains(id)
    }

    /// Claims `id` as handled at position `index`.
    pub fn record(&mut self, id: String, index: usize) {
        self.processed_ids.insert(id);
        self.last_index = Some(self.last_index.map_or(index, |last| last.max(index)));
    }

    /// Moves to the start of the next stage, carrying the tally forward.
    pub fn advance_to(&self, stage: Stage) -> Self {
        Self {
            stage,
            processed_ids: BTreeSet::new(),
            last_index: None,
            saved_at: Utc::now(),
            params_fingerprint: self.params_fingerprint.clone(),
            tally: self.tally,
        }
    }
}

/// Durable storage for checkpoints, one per job.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, job_id: &str) -> Result<Option<Checkpoint>, DatabaseError>;
    fn save(&self, job_id: &str, checkpoint: &Checkpoint) -> Result<(), DatabaseError>;
    fn clear(&self, job_id: &str) -> Result<(), DatabaseError>;
}

/// Checkpoints kept in the `checkpoints` and `checkpoint_ids` tables.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    db: Database,
}

impl SqliteCheckpointStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self, job_id: &str) -> Result<Option<Checkpoint>, DatabaseError> {
        checkpoint_repo::load(&self.db, job_id)
    }

    fn save(&self, job_id: &str, checkpoint: &Checkpoint) -> Result<(), DatabaseError> {
        checkpoint_repo::save(&self.db, job_id, checkpoint)
    }

    fn clear(&self, job_id: &str) -> Result<(), DatabaseError> {
        checkpoint_repo::clear(&self.db, job_id)
    }
}
