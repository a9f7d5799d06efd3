//! Job progress broadcaster for real-time job status streaming.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::JobStatus;
use crate::pipeline::Stage;
use crate::progress::Progress;

/// Progress or status change of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage the error surfaced in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stage: Option<Stage>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    /// A progress update of a running job.
    pub fn progress(job_id: &str, progress: Progress) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Running,
            progress: Some(progress),
            error: None,
            error_stage: None,
            timestamp: Utc::now(),
        }
    }

    /// A lifecycle transition.
    pub fn status(
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        error_stage: Option<Stage>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            progress: None,
            error,
            error_stage,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts job progress events and keeps the most recent events of
/// each job for subscribers that connect late.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
    recent: Arc<Mutex<HashMap<String, VecDeque<JobProgressEvent>>>>,
    replay_buffer: usize,
}

impl JobProgressBroadcaster {
    /// Creates a broadcaster with the given channel capacity and per-job
    /// replay buffer length.
    pub fn new(capacity: usize, replay_buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
            recent: Arc::new(Mutex::new(HashMap::new())),
            replay_buffer,
        }
    }

    /// Sends an event to all subscribers and records it for replay.
    pub fn send(&self, event: JobProgressEvent) {
        if self.replay_buffer > 0 {
            let mut recent = self.recent.lock().unwrap_or_else(|poisoned| {
                log::warn!("Replay buffer lock poisoned, recovering");
                poisoned.into_inner()
            });
            let buffer = recent.entry(event.job_id.clone()).or_default();
            if buffer.len() >= self.replay_buffer {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }

        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Recent events of a job, oldest first.
    pub fn recent(&self, job_id: &str) -> Vec<JobProgressEvent> {
        let recent = self.recent.lock().unwrap_or_else(|poisoned| {
            log::warn!("Replay buffer lock poisoned, recovering");
            poisoned.into_inner()
        });
        recent
            .get(job_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops the replay buffers of jobs that stopped running more than
    /// `retention` ago. Returns how many buffers were dropped.
    pub fn evict_idle(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return 0;
        };

        let mut recent = self.recent.lock().unwrap_or_else(|poisoned| {
            log::warn!("Replay buffer lock poisoned, recovering");
            poisoned.into_inner()
        });
        let before = recent.len();
        recent.retain(|_, buffer| {
            buffer
                .back()
                .is_some_and(|last| last.status == JobStatus::Running || last.timestamp > cutoff)
        });
        before - recent.len()
    }

    /// Drops the replay buffer of a job.
    pub fn forget(&self, job_id: &str) {
        let mut recent = self.recent.lock().unwrap_or_else(|poisoned| {
            log::warn!("Replay buffer lock poisoned, recovering");
            poisoned.into_inner()
        });
        recent.remove(job_id);
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(current: u64) -> Progress {
        Progress {
            step: Stage::Discover,
            current,
            total: 10,
            message: None,
        }
    }

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = JobProgressBroadcaster::new(10, 10);
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobProgressEvent::progress("job-1", progress(3)));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_id, "job-1");
        assert_eq!(received.status, JobStatus::Running);
        assert_eq!(received.progress.unwrap().current, 3);
    }

    #[test]
    fn test_replay_buffer_is_bounded_per_job() {
        let broadcaster = JobProgressBroadcaster::new(10, 3);
        for i in 0..5 {
            broadcaster.send(JobProgressEvent::progress("job-1", progress(i)));
        }
        broadcaster.send(JobProgressEvent::progress("job-2", progress(9)));

        let recent = broadcaster.recent("job-1");
        let currents: Vec<u64> = recent
            .iter()
            .filter_map(|e| e.progress.as_ref().map(|p| p.current))
            .collect();
        assert_eq!(currents, vec![2, 3, 4]);
        assert_eq!(broadcaster.recent("job-2").len(), 1);
    }

    #[test]
    fn test_forget_drops_history() {
        let broadcaster = JobProgressBroadcaster::default();
        broadcaster.send(JobProgressEvent::status(
            "job-1",
            JobStatus::Failed,
            Some("boom".to_string()),
            Some(Stage::Enrich),
        ));
        assert_eq!(broadcaster.recent("job-1").len(), 1);

        broadcaster.forget("job-1");
        assert!(broadcaster.recent("job-1").is_empty());
    }

    #[test]
    fn test_evict_idle_keeps_running_and_recent_jobs() {
        let broadcaster = JobProgressBroadcaster::default();
        broadcaster.send(JobProgressEvent::status("done", JobStatus::Completed, None, None));
        broadcaster.send(JobProgressEvent::progress("busy", progress(4)));

        let mut old = JobProgressEvent::status("paused", JobStatus::Paused, None, None);
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        broadcaster.send(old);

        assert_eq!(broadcaster.evict_idle(Duration::from_secs(3600)), 1);
        assert!(broadcaster.recent("paused").is_empty());
        assert_eq!(broadcaster.recent("done").len(), 1);

        assert_eq!(broadcaster.evict_idle(Duration::ZERO), 1);
        assert!(broadcaster.recent("done").is_empty());
        assert_eq!(broadcaster.recent("busy").len(), 1);
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = JobProgressBroadcaster::new(1, 0);
        broadcaster.send(JobProgressEvent::progress("job-1", progress(1)));
        assert!(broadcaster.recent("job-1").is_empty());
    }
}
