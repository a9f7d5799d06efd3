//! Live progress of job runs.
//!
//! A run writes its progress through a [`ProgressReporter`]; pollers read
//! the latest value from the [`ProgressBoard`] or the job row. Writes are
//! last-write-wins and a failed write never fails the run.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::db::{job_repo, Database};
use crate::pipeline::Stage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub step: Stage,
    /// Units of work done so far, cumulative across stages.
    pub current: u64,
    /// Estimated units of work for the whole run. Never below `current`.
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: &Progress);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _progress: &Progress) {}
}

/// In-memory latest progress per job, for cheap polling.
#[derive(Default)]
pub struct ProgressBoard {
    entries: RwLock<HashMap<String, Progress>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, job_id: &str, progress: Progress) {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| {
            log::warn!("RwLock poisoned in ProgressBoard::set, recovering");
            poisoned.into_inner()
        });
        entries.insert(job_id.to_string(), progress);
    }

    pub fn get(&self, job_id: &str) -> Option<Progress> {
        let entries = self.entries.read().unwrap_or_else(|poisoned| {
            log::warn!("RwLock poisoned in ProgressBoard::get, recovering");
            poisoned.into_inner()
        });
        entries.get(job_id).cloned()
    }

    pub fn remove(&self, job_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| {
            log::warn!("RwLock poisoned in ProgressBoard::remove, recovering");
            poisoned.into_inner()
        });
        entries.remove(job_id);
    }
}

/// Reporter used by supervised runs: writes the job row, the board and the
/// broadcast channel.
pub struct PersistentProgress {
    job_id: String,
    db: Database,
    board: Arc<ProgressBoard>,
    broadcaster: JobProgressBroadcaster,
}

impl PersistentProgress {
    pub fn new(
        job_id: &str,
        db: Database,
        board: Arc<ProgressBoard>,
        broadcaster: JobProgressBroadcaster,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            db,
            board,
            broadcaster,
        }
    }
}

impl ProgressReporter for PersistentProgress {
    fn report(&self, progress: &Progress) {
        if let Err(e) = job_repo::update_progress(&self.db, &self.job_id, progress, Utc::now()) {
            log::warn!("Failed to persist progress for job {}: {}", self.job_id, e);
        }
        self.board.set(&self.job_id, progress.clone());
        self.broadcaster
            .send(JobProgressEvent::progress(&self.job_id, progress.clone()));
    }
}

/// Run-owned progress counter. `current` only moves forward and `total`
/// is kept at or above `current`.
pub struct RunProgress<'a> {
    reporter: &'a dyn ProgressReporter,
    state: Progress,
}

impl<'a> RunProgress<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            state: Progress {
                step: Stage::Discover,
                current: 0,
                total: 0,
                message: None,
            },
        }
    }

    /// Positions the counter at the start (or resume point) of a stage.
    pub fn seed(&mut self, step: Stage, current: u64, total: u64) {
        self.state.step = step;
        self.state.current = self.state.current.max(current);
        self.state.total = total.max(self.state.current);
        self.state.message = Some(step.activity().to_string());
        self.reporter.report(&self.state);
    }

    /// Counts one unit of work.
    pub fn advance(&mut self, message: Option<String>) {
        self.state.current += 1;
        self.state.total = self.state.total.max(self.state.current);
        if message.is_some() {
            self.state.message = message;
        }
        self.reporter.report(&self.state);
    }

    pub fn finish(&mut self, message: &str) {
        self.state.total = self.state.current;
        self.state.message = Some(message.to_string());
        self.reporter.report(&self.state);
    }

    pub fn current(&self) -> u64 {
        self.state.current
    }

    pub fn snapshot(&self) -> Progress {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<Progress>>);

    impl ProgressReporter for Recording {
        fn report(&self, progress: &Progress) {
            self.0.lock().unwrap().push(progress.clone());
        }
    }

    #[test]
    fn test_current_never_decreases() {
        let rec = Recording::default();
        let mut run = RunProgress::new(&rec);
        run.seed(Stage::Discover, 5, 20);
        run.advance(None);
        run.seed(Stage::Enrich, 2, 20);
        assert_eq!(run.current(), 6);

        let seen = rec.0.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0].current <= w[1].current));
    }

    #[test]
    fn test_total_stays_at_or_above_current() {
        let rec = Recording::default();
        let mut run = RunProgress::new(&rec);
        run.seed(Stage::Discover, 0, 2);
        run.advance(None);
        run.advance(None);
        run.advance(None);
        assert_eq!(run.snapshot().total, 3);

        run.seed(Stage::Enrich, 1, 2);
        assert_eq!(run.snapshot().total, 3);
    }

    #[test]
    fn test_finish_closes_total() {
        let mut run = RunProgress::new(&NoopProgress);
        run.seed(Stage::Score, 4, 9);
        run.finish("Completed");
        let p = run.snapshot();
        assert_eq!(p.current, 4);
        assert_eq!(p.total, 4);
        assert_eq!(p.message.as_deref(), Some("Completed"));
    }

    #[test]
    fn test_board_last_write_wins() {
        let board = ProgressBoard::new();
        let p = |current| Progress {
            step: Stage::Discover,
            current,
            total: 10,
            message: None,
        };
        board.set("job-1", p(1));
        board.set("job-1", p(2));
        assert_eq!(board.get("job-1").unwrap().current, 2);
        board.remove("job-1");
        assert!(board.get("job-1").is_none());
    }

    #[test]
    fn test_persistent_progress_writes_everywhere() {
        let db = Database::open_in_memory().unwrap();
        let job = crate::job::Job::new("u1", "bakeries", Default::default());
        job_repo::insert(&db, &job).unwrap();

        let board = Arc::new(ProgressBoard::new());
        let broadcaster = JobProgressBroadcaster::default();
        let mut rx = broadcaster.subscribe();
        let reporter = PersistentProgress::new(&job.id, db.clone(), board.clone(), broadcaster);

        let progress = Progress {
            step: Stage::Enrich,
            current: 7,
            total: 12,
            message: Some("Enriching".to_string()),
        };
        reporter.report(&progress);

        assert_eq!(board.get(&job.id), Some(progress.clone()));
        assert_eq!(rx.try_recv().unwrap().progress, Some(progress.clone()));
        let stored = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(stored.progress, Some(progress));
    }
}
