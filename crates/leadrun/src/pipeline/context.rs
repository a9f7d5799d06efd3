use chrono::Utc;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::db::{Database, DatabaseError};
use crate::job::Job;
use crate::progress::RunProgress;
use crate::providers::Collaborators;
use crate::supervisor::{StopReason, StopSignal};

use super::error::StageError;

/// Engine settings a run needs.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Items processed between two checkpoint commits.
    pub checkpoint_interval: usize,
    pub max_results_limit: u32,
    pub default_country_code: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            checkpoint_interval: 5,
            max_results_limit: 500,
            default_country_code: "1".to_string(),
        }
    }
}

/// State of one run, shared by its stage handlers.
pub struct RunContext<'a> {
    pub job: &'a Job,
    pub db: &'a Database,
    pub collaborators: &'a Collaborators,
    pub settings: &'a RunSettings,
    pub checkpoint: Checkpoint,
    pub progress: RunProgress<'a>,
    store: &'a dyn CheckpointStore,
    signal: &'a StopSignal,
    // Items recorded since the last commit.
    pending: usize,
}

impl<'a> RunContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job: &'a Job,
        db: &'a Database,
        collaborators: &'a Collaborators,
        settings: &'a RunSettings,
        checkpoint: Checkpoint,
        progress: RunProgress<'a>,
        store: &'a dyn CheckpointStore,
        signal: &'a StopSignal,
    ) -> Self {
        Self {
            job,
            db,
            collaborators,
            settings,
            checkpoint,
            progress,
            store,
            signal,
            pending: 0,
        }
    }

    pub fn stop_requested(&self) -> Option<StopReason> {
        self.signal.requested()
    }

    /// Claims an item whose effects are already persisted, advances
    /// progress and commits a checkpoint every `checkpoint_interval` items.
    pub fn complete_item(
        &mut self,
        id: String,
        index: usize,
        message: Option<String>,
    ) -> Result<(), StageError> {
        self.checkpoint.record(id, index);
        self.progress.advance(message);
        self.pending += 1;
        if self.pending >= self.settings.checkpoint_interval.max(1) {
            let stage = self.checkpoint.stage;
            self.commit()
                .map_err(|e| StageError::storage(stage, e))?;
        }
        Ok(())
    }

    /// Saves the current checkpoint.
    pub fn commit(&mut self) -> Result<(), DatabaseError> {
        self.checkpoint.saved_at = Utc::now();
        self.store.save(&self.job.id, &self.checkpoint)?;
        self.pending = 0;
        Ok(())
    }
}
