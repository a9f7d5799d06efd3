use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lead::LeadScorer;
use crate::pipeline::RunSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub version: String,
    /// SQLite file. Defaults to `~/.leadrun/data/leadrun.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_max_jobs_per_user")]
    pub max_jobs_per_user: usize,
    /// 0 disables the timeout.
    #[serde(default = "default_job_timeout_minutes")]
    pub job_timeout_minutes: u64,
    /// Pause between two maintenance passes of a supervisor.
    #[serde(default = "default_maintenance_interval_seconds")]
    pub maintenance_interval_seconds: u64,
    #[serde(default = "default_max_results_limit")]
    pub max_results_limit: u32,
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_checkpoint_interval() -> usize {
    5
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

fn default_max_jobs_per_user() -> usize {
    1
}

fn default_job_timeout_minutes() -> u64 {
    30
}

fn default_maintenance_interval_seconds() -> u64 {
    60
}

fn default_max_results_limit() -> u32 {
    500
}

fn default_country_code() -> String {
    "1".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            checkpoint_interval: default_checkpoint_interval(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_jobs_per_user: default_max_jobs_per_user(),
            job_timeout_minutes: default_job_timeout_minutes(),
            maintenance_interval_seconds: default_maintenance_interval_seconds(),
            max_results_limit: default_max_results_limit(),
            default_country_code: default_country_code(),
            scoring: ScoringConfig::default(),
            progress: ProgressConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Configured database file, else the default location.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_minutes > 0).then(|| Duration::from_secs(self.job_timeout_minutes * 60))
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_seconds)
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            checkpoint_interval: self.checkpoint_interval,
            max_results_limit: self.max_results_limit,
            default_country_code: self.default_country_code.clone(),
        }
    }

    pub fn scorer(&self) -> LeadScorer {
        LeadScorer::new(self.scoring.hot_threshold, self.scoring.warm_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_hot_threshold")]
    pub hot_threshold: u8,
    #[serde(default = "default_warm_threshold")]
    pub warm_threshold: u8,
}

fn default_hot_threshold() -> u8 {
    75
}

fn default_warm_threshold() -> u8 {
    50
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hot_threshold: default_hot_threshold(),
            warm_threshold: default_warm_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Events kept per job for late subscribers.
    #[serde(default = "default_replay_buffer")]
    pub replay_buffer: usize,
    /// How long events of a stopped job stay available for replay.
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u64,
}

impl ProgressConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_minutes * 60)
    }
}

fn default_channel_capacity() -> usize {
    100
}

fn default_replay_buffer() -> usize {
    100
}

fn default_retention_minutes() -> u64 {
    24 * 60
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            replay_buffer: default_replay_buffer(),
            retention_minutes: default_retention_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
