//! Job record, parameters and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::Stage;
use crate::progress::Progress;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    FailedResumable,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::FailedResumable => "failed_resumable",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "paused" => Some(JobStatus::Paused),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "failed_resumable" => Some(JobStatus::FailedResumable),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never run again without an explicit restart.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// States that keep their checkpoint and may re-enter `running`.
    pub fn is_resumable(&self) -> bool {
        matches!(self, JobStatus::Paused | JobStatus::FailedResumable)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Completed)
            | (Running, Failed)
            | (Running, FailedResumable)
            | (Running, Paused)
            | (Running, Cancelled) => true,
            (FailedResumable, Running) | (Paused, Running) => true,
            (FailedResumable, Cancelled) | (Paused, Cancelled) => true,
            // A resume attempt with changed parameters fails the job outright.
            (FailedResumable, Failed) | (Paused, Failed) => true,
            // Restart.
            (Completed | Failed | FailedResumable | Paused | Cancelled, Pending) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language used for generated outreach drafts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Id,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Id => "id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "en" => Some(Language::En),
            "id" => Some(Language::Id),
            _ => None,
        }
    }
}

/// Rejected job parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid job parameters: {reason}")]
pub struct InvalidParams {
    pub reason: String,
}

/// User-supplied knobs of a job. Changing any of them between runs
/// invalidates the checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobParams {
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default)]
    pub min_score: u8,
    #[serde(default)]
    pub skip_enrichment: bool,
    #[serde(default)]
    pub skip_outreach: bool,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub language: Language,
}

fn default_max_results() -> u32 {
    20
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_score: 0,
            skip_enrichment: false,
            skip_outreach: false,
            context: None,
            language: Language::En,
        }
    }
}

impl JobParams {
    pub fn validate(&self, max_results_limit: u32) -> Result<(), InvalidParams> {
        if self.max_results == 0 {
            return Err(InvalidParams {
                reason: "max_results must be at least 1".to_string(),
            });
        }
        if self.max_results > max_results_limit {
            return Err(InvalidParams {
                reason: format!(
                    "max_results {} exceeds the limit of {}",
                    self.max_results, max_results_limit
                ),
            });
        }
        if self.min_score > 100 {
            return Err(InvalidParams {
                reason: format!("min_score {} is outside 0..=100", self.min_score),
            });
        }
        Ok(())
    }

    /// Stable textual identity of the parameters, stored with each checkpoint.
    ///
    /// `serde_json::Value` objects keep their keys sorted, so equal
    /// parameters always produce the same string.
    pub fn fingerprint(&self) -> String {
        serde_json::json!({
            "max_results": self.max_results,
            "min_score": self.min_score,
            "skip_enrichment": self.skip_enrichment,
            "skip_outreach": self.skip_outreach,
            "context": self.context,
            "language": self.language.as_str(),
        })
        .to_string()
    }
}

/// Final tallies written when a job completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Leads that passed `min_score`.
    pub total_leads: u64,
    pub hot: u64,
    pub warm: u64,
    pub cold: u64,
    pub disqualified: u64,
    pub candidates_examined: u64,
    pub duplicates_skipped: u64,
    pub malformed_skipped: u64,
    pub duration_seconds: f64,
}

/// A lead collection job as persisted in the `jobs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub query: String,
    pub status: JobStatus,
    pub params: JobParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a pending job with a fresh short identifier.
    pub fn new(user_id: &str, query: &str, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: new_job_id(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            status: JobStatus::Pending,
            params,
            error: None,
            error_stage: None,
            progress: None,
            summary: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }
}

/// Eight hex characters taken from a v4 UUID.
pub fn new_job_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Filter for listing a user's jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}
