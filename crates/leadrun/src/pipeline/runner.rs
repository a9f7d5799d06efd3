use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::db::{lead_repo, Database, DatabaseError};
use crate::job::{Job, JobSummary};
use crate::progress::{ProgressReporter, RunProgress};
use crate::providers::Collaborators;
use crate::supervisor::{StopReason, StopSignal};

use super::context::{RunContext, RunSettings};
use super::error::{StageError, StageOutcome};
use super::stage::{self, Stage};
use super::stages::handler_for;

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(JobSummary),
    Paused,
    Cancelled,
    FailedResumable {
        stage: Option<Stage>,
        error: String,
    },
    Failed {
        stage: Option<Stage>,
        error: String,
    },
}

/// Drives one job through its stages, resuming from its checkpoint.
pub struct JobRunner {
    db: Database,
    store: Arc<dyn CheckpointStore>,
    collaborators: Collaborators,
    settings: RunSettings,
}

impl JobRunner {
    pub fn new(
        db: Database,
        store: Arc<dyn CheckpointStore>,
        collaborators: Collaborators,
        settings: RunSettings,
    ) -> Self {
        Self {
            db,
            store,
            collaborators,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Runs `job` until it completes, fails or is asked to stop.
    ///
    /// The caller owns the job's status; this only reports the outcome.
    pub fn run(
        &self,
        job: &Job,
        signal: &StopSignal,
        reporter: &dyn ProgressReporter,
    ) -> RunOutcome {
        let _run_span = info_span!("job_run",
            job_id = %job.id,
            user_id = %job.user_id,
        )
        .entered();

        if let Err(e) = job.params.validate(self.settings.max_results_limit) {
            return RunOutcome::Failed {
                stage: None,
                error: e.to_string(),
            };
        }

        let plan = stage::plan(&job.params);
        let fingerprint = job.params.fingerprint();

        let checkpoint = match self.store.load(&job.id) {
            Ok(Some(checkpoint)) => {
                if let Err(e) = verify(&checkpoint, &plan, &fingerprint) {
                    warn!(error = %e, "Refusing to resume from checkpoint");
                    return RunOutcome::Failed {
                        stage: e.stage(),
                        error: e.to_string(),
                    };
                }
                info!(
                    stage = %checkpoint.stage,
                    resume_index = checkpoint.resume_index(),
                    "Resuming from checkpoint"
                );
                checkpoint
            }
            Ok(None) => Checkpoint::new(Stage::Discover, fingerprint),
            Err(e) => {
                return RunOutcome::FailedResumable {
                    stage: None,
                    error: format!("could not load checkpoint: {}", e),
                };
            }
        };

        // `verify` guarantees the checkpoint stage is planned.
        let start = plan
            .iter()
            .position(|s| *s == checkpoint.stage)
            .unwrap_or(0);

        let mut ctx = RunContext::new(
            job,
            &self.db,
            &self.collaborators,
            &self.settings,
            checkpoint,
            RunProgress::new(reporter),
            self.store.as_ref(),
            signal,
        );

        for (pos, &stage) in plan.iter().enumerate().skip(start) {
            let _stage_span = info_span!("stage", stage = %stage).entered();

            if ctx.checkpoint.stage != stage {
                ctx.checkpoint = ctx.checkpoint.advance_to(stage);
                if let Err(e) = ctx.commit() {
                    return storage_failure(stage, e);
                }
            }
            if let Err(e) = seed_progress(&mut ctx, &plan, pos) {
                return storage_failure(stage, e);
            }

            let resume_index = ctx.checkpoint.resume_index();
            debug!(resume_index, "Stage starting");

            match handler_for(stage).run(&mut ctx, resume_index) {
                Ok(StageOutcome::Completed) => {
                    if let Err(e) = ctx.commit() {
                        return storage_failure(stage, e);
                    }
                    debug!(processed = ctx.checkpoint.processed_ids.len(), "Stage complete");
                }
                Ok(StageOutcome::Stopped(reason)) => return stop(&mut ctx, stage, reason),
                Err(e) => return fail(&mut ctx, e),
            }
        }

        match summarize(&ctx) {
            Ok(summary) => {
                ctx.progress.finish("Completed");
                info!(
                    total_leads = summary.total_leads,
                    hot = summary.hot,
                    warm = summary.warm,
                    cold = summary.cold,
                    "Job completed"
                );
                RunOutcome::Completed(summary)
            }
            Err(e) => storage_failure(ctx.checkpoint.stage, e),
        }
    }
}

fn verify(checkpoint: &Checkpoint, plan: &[Stage], fingerprint: &str) -> Result<(), StageError> {
    if checkpoint.params_fingerprint != fingerprint {
        return Err(StageError::data_integrity(
            Some(checkpoint.stage),
            "job parameters changed since the last checkpoint; restart the job to run with the new parameters",
        ));
    }
    if !plan.contains(&checkpoint.stage) {
        return Err(StageError::data_integrity(
            Some(checkpoint.stage),
            format!(
                "checkpoint stage '{}' is no longer part of this job; restart the job",
                checkpoint.stage
            ),
        ));
    }
    Ok(())
}

/// Units of work per planned stage. Finished stages report actual
/// counts; later stages are estimated from what is known so far.
fn stage_units(ctx: &RunContext<'_>, plan: &[Stage], pos: usize) -> Result<Vec<u64>, DatabaseError> {
    let done = &plan[..pos];
    let discovered = done.contains(&Stage::Discover);
    let scored = done.contains(&Stage::Score);

    let examined = if discovered {
        ctx.checkpoint.tally.examined
    } else {
        u64::from(ctx.job.params.max_results)
    };
    let leads = if discovered {
        lead_repo::count_for_job(ctx.db, &ctx.job.id)?
    } else {
        examined
    };
    let qualified = if scored {
        lead_repo::count_qualified(ctx.db, &ctx.job.id)?
    } else {
        leads
    };

    Ok(plan
        .iter()
        .map(|s| match s {
            Stage::Discover => examined,
            Stage::Enrich | Stage::Score => leads,
            Stage::Outreach => qualified,
        })
        .collect())
}

fn seed_progress(
    ctx: &mut RunContext<'_>,
    plan: &[Stage],
    pos: usize,
) -> Result<(), DatabaseError> {
    let units = stage_units(ctx, plan, pos)?;
    let base: u64 = units[..pos].iter().sum();
    let total: u64 = units.iter().sum();
    let current = base + ctx.checkpoint.resume_index() as u64;
    ctx.progress.seed(plan[pos], current, total);
    Ok(())
}

fn stop(ctx: &mut RunContext<'_>, stage: Stage, reason: StopReason) -> RunOutcome {
    info!(?reason, current = ctx.progress.current(), "Stop requested");
    match reason {
        StopReason::Cancel => RunOutcome::Cancelled,
        StopReason::Pause => match ctx.commit() {
            Ok(()) => RunOutcome::Paused,
            Err(e) => storage_failure(stage, e),
        },
        StopReason::Timeout => {
            if let Err(e) = ctx.commit() {
                warn!(error = %e, "Failed to save checkpoint after timeout");
            }
            RunOutcome::FailedResumable {
                stage: Some(stage),
                error: "timed out: job exceeded its time limit".to_string(),
            }
        }
    }
}

fn fail(ctx: &mut RunContext<'_>, err: StageError) -> RunOutcome {
    if err.is_resumable() {
        if let Err(e) = ctx.commit() {
            warn!(error = %e, "Failed to save checkpoint after stage failure");
        }
        warn!(error = %err, "Stage failed, job can be resumed");
        return RunOutcome::FailedResumable {
            stage: err.stage(),
            error: err.to_string(),
        };
    }
    warn!(error = %err, "Stage failed permanently");
    RunOutcome::Failed {
        stage: err.stage(),
        error: err.to_string(),
    }
}

fn storage_failure(stage: Stage, err: DatabaseError) -> RunOutcome {
    let err = StageError::storage(stage, err);
    warn!(error = %err, "Storage failure, job can be resumed");
    RunOutcome::FailedResumable {
        stage: Some(stage),
        error: err.to_string(),
    }
}

fn summarize(ctx: &RunContext<'_>) -> Result<JobSummary, DatabaseError> {
    let counts = lead_repo::tier_counts(ctx.db, &ctx.job.id)?;
    let started = ctx.job.started_at.unwrap_or(ctx.job.created_at);
    let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
    let tally = ctx.checkpoint.tally;

    Ok(JobSummary {
        total_leads: counts.qualified,
        hot: counts.hot,
        warm: counts.warm,
        cold: counts.cold,
        disqualified: counts.disqualified,
        candidates_examined: tally.examined,
        duplicates_skipped: tally.duplicates,
        malformed_skipped: tally.malformed,
        duration_seconds: elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobParams;

    #[test]
    fn test_verify_rejects_changed_parameters() {
        let params = JobParams::default();
        let plan = stage::plan(&params);
        let cp = Checkpoint::new(Stage::Discover, params.fingerprint());
        assert!(verify(&cp, &plan, &params.fingerprint()).is_ok());

        let changed = JobParams {
            max_results: 50,
            ..Default::default()
        };
        let err = verify(&cp, &plan, &changed.fingerprint()).unwrap_err();
        assert!(err.to_string().starts_with("resume unsafe:"));
    }

    #[test]
    fn test_verify_rejects_unplanned_stage() {
        let params = JobParams {
            skip_enrichment: true,
            ..Default::default()
        };
        let plan = stage::plan(&params);
        let cp = Checkpoint::new(Stage::Enrich, params.fingerprint());
        let err = verify(&cp, &plan, &params.fingerprint()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Enrich));
        assert!(err.to_string().contains("no longer part of this job"));
    }
}
