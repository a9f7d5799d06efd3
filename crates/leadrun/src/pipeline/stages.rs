//! Stage handlers.
//!
//! Every handler walks an ordered input from `resume_index`, checks the
//! stop signal before each item, persists the item's effect and only then
//! claims it in the checkpoint. Items whose effect an interrupted run
//! already stored are claimed without calling the provider again.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::db::lead_repo;
use crate::lead::{classify, phone, Dedup, DedupKey, Lead};

use super::context::RunContext;
use super::error::{StageError, StageOutcome};
use super::stage::Stage;

pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    fn run(&self, ctx: &mut RunContext<'_>, resume_index: usize)
        -> Result<StageOutcome, StageError>;
}

/// Returns the handler of a stage.
pub fn handler_for(stage: Stage) -> &'static dyn StageHandler {
    match stage {
        Stage::Discover => &Discover,
        Stage::Enrich => &Enrich,
        Stage::Score => &Score,
        Stage::Outreach => &Outreach,
    }
}

/// Pulls candidates from the source, deduplicates them and stores the new
/// ones as leads.
pub struct Discover;

impl StageHandler for Discover {
    fn stage(&self) -> Stage {
        Stage::Discover
    }

    fn run(
        &self,
        ctx: &mut RunContext<'_>,
        resume_index: usize,
    ) -> Result<StageOutcome, StageError> {
        let stage = Stage::Discover;
        let limit = ctx.job.params.max_results as usize;
        let mut index = resume_index;

        if index < limit {
            let source = Arc::clone(&ctx.collaborators.source);
            let mut stream = source
                .fetch(&ctx.job.query, &ctx.job.params, index)
                .map_err(|e| StageError::from_provider(stage, e))?;

            while index < limit {
                if let Some(reason) = ctx.stop_requested() {
                    return Ok(StageOutcome::Stopped(reason));
                }
                let Some(item) = stream.next() else {
                    break;
                };

                let candidate = match item {
                    Ok(candidate) => candidate,
                    Err(e) if e.is_malformed() => {
                        warn!(index, error = %e.message, "Skipping malformed candidate");
                        ctx.checkpoint.tally.malformed += 1;
                        ctx.complete_item(format!("malformed:{}", index), index, None)?;
                        index += 1;
                        continue;
                    }
                    Err(e) => return Err(StageError::from_provider(stage, e)),
                };

                let normalized = candidate
                    .phone
                    .as_deref()
                    .and_then(|p| phone::normalize(p, &ctx.settings.default_country_code));
                let key = DedupKey::for_candidate(candidate.provider_id(), normalized.as_deref());
                let id = key
                    .as_ref()
                    .map(DedupKey::identifier)
                    .unwrap_or_else(|| format!("index:{}", index));
                let message = Some(format!("Found {}", candidate.name));

                if ctx.checkpoint.contains(&id) {
                    debug!(index, "Candidate repeats an earlier one in this job");
                    ctx.checkpoint.tally.duplicates += 1;
                    ctx.complete_item(id, index, message)?;
                    index += 1;
                    continue;
                }

                // Stored before the last checkpoint reached it.
                let replayed = lead_repo::exists_at(ctx.db, &ctx.job.id, index)
                    .map_err(|e| StageError::storage(stage, e))?;
                if replayed {
                    debug!(index, "Lead already stored by an interrupted run");
                    ctx.complete_item(id, index, message)?;
                    index += 1;
                    continue;
                }

                match classify(&ctx.job.user_id, key.as_ref(), ctx.db)
                    .map_err(|e| StageError::storage(stage, e))?
                {
                    Dedup::Duplicate => {
                        debug!(
                            index,
                            phone = %normalized.as_deref().map(phone::redact).unwrap_or_default(),
                            "Skipping known lead"
                        );
                        ctx.checkpoint.tally.duplicates += 1;
                    }
                    Dedup::New => {
                        let lead = Lead::from_candidate(
                            &ctx.job.id,
                            &ctx.job.user_id,
                            index,
                            candidate,
                            normalized,
                        );
                        lead_repo::insert(ctx.db, &lead)
                            .map_err(|e| StageError::storage(stage, e))?;
                    }
                }
                ctx.complete_item(id, index, message)?;
                index += 1;
            }
        }

        ctx.checkpoint.tally.examined = index as u64;
        Ok(StageOutcome::Completed)
    }
}

/// Merges provider enrichment into every lead of the job.
pub struct Enrich;

impl StageHandler for Enrich {
    fn stage(&self) -> Stage {
        Stage::Enrich
    }

    fn run(
        &self,
        ctx: &mut RunContext<'_>,
        resume_index: usize,
    ) -> Result<StageOutcome, StageError> {
        let stage = Stage::Enrich;
        let leads = lead_repo::list_for_job(ctx.db, &ctx.job.id)
            .map_err(|e| StageError::storage(stage, e))?;

        for (index, mut lead) in leads.into_iter().enumerate().skip(resume_index) {
            if let Some(reason) = ctx.stop_requested() {
                return Ok(StageOutcome::Stopped(reason));
            }
            let id = format!("lead:{}", lead.id);
            if ctx.checkpoint.contains(&id) {
                ctx.complete_item(id, index, None)?;
                continue;
            }
            if lead.enriched_at.is_some() {
                debug!(lead_id = %lead.id, "Lead already enriched by an interrupted run");
                ctx.complete_item(id, index, Some(format!("Enriched {}", lead.name)))?;
                continue;
            }

            match ctx.collaborators.enricher.enrich(&lead) {
                Ok(enrichment) => {
                    lead.apply_enrichment(enrichment);
                    lead_repo::update_enrichment(ctx.db, &lead)
                        .map_err(|e| StageError::storage(stage, e))?;
                }
                Err(e) if e.is_malformed() => {
                    warn!(lead_id = %lead.id, error = %e.message, "Skipping malformed enrichment");
                    ctx.checkpoint.tally.malformed += 1;
                }
                Err(e) => return Err(StageError::from_provider(stage, e)),
            }
            ctx.complete_item(id, index, Some(format!("Enriched {}", lead.name)))?;
        }

        Ok(StageOutcome::Completed)
    }
}

/// Scores every lead and marks those reaching `min_score` as qualified.
pub struct Score;

impl StageHandler for Score {
    fn stage(&self) -> Stage {
        Stage::Score
    }

    fn run(
        &self,
        ctx: &mut RunContext<'_>,
        resume_index: usize,
    ) -> Result<StageOutcome, StageError> {
        let stage = Stage::Score;
        let min_score = f64::from(ctx.job.params.min_score);
        let leads = lead_repo::list_for_job(ctx.db, &ctx.job.id)
            .map_err(|e| StageError::storage(stage, e))?;

        for (index, lead) in leads.into_iter().enumerate().skip(resume_index) {
            if let Some(reason) = ctx.stop_requested() {
                return Ok(StageOutcome::Stopped(reason));
            }
            let id = format!("lead:{}", lead.id);
            if ctx.checkpoint.contains(&id) {
                ctx.complete_item(id, index, None)?;
                continue;
            }

            match ctx.collaborators.scorer.score(&lead) {
                Ok(score) => {
                    let qualified = score.total >= min_score;
                    lead_repo::update_score(
                        ctx.db,
                        &lead.id,
                        score.total,
                        score.tier,
                        qualified,
                        Utc::now(),
                    )
                    .map_err(|e| StageError::storage(stage, e))?;
                    debug!(lead_id = %lead.id, total = score.total, tier = %score.tier, qualified, "Lead scored");
                }
                Err(e) if e.is_malformed() => {
                    warn!(lead_id = %lead.id, error = %e.message, "Leaving lead unscored");
                    ctx.checkpoint.tally.malformed += 1;
                }
                Err(e) => return Err(StageError::from_provider(stage, e)),
            }
            ctx.complete_item(id, index, Some(format!("Scored {}", lead.name)))?;
        }

        Ok(StageOutcome::Completed)
    }
}

/// Drafts outreach for every qualified lead.
pub struct Outreach;

impl StageHandler for Outreach {
    fn stage(&self) -> Stage {
        Stage::Outreach
    }

    fn run(
        &self,
        ctx: &mut RunContext<'_>,
        resume_index: usize,
    ) -> Result<StageOutcome, StageError> {
        let stage = Stage::Outreach;
        let leads = lead_repo::list_qualified(ctx.db, &ctx.job.id)
            .map_err(|e| StageError::storage(stage, e))?;

        for (index, lead) in leads.into_iter().enumerate().skip(resume_index) {
            if let Some(reason) = ctx.stop_requested() {
                return Ok(StageOutcome::Stopped(reason));
            }
            let id = format!("lead:{}", lead.id);
            if ctx.checkpoint.contains(&id) {
                ctx.complete_item(id, index, None)?;
                continue;
            }
            if lead.outreach.is_some() {
                debug!(lead_id = %lead.id, "Draft already stored by an interrupted run");
                ctx.complete_item(id, index, Some(format!("Drafted outreach for {}", lead.name)))?;
                continue;
            }

            let draft = ctx.collaborators.drafter.draft(
                &lead,
                ctx.job.params.context.as_deref(),
                ctx.job.params.language,
            );
            match draft {
                Ok(draft) => {
                    lead_repo::update_outreach(ctx.db, &lead.id, &draft, Utc::now())
                        .map_err(|e| StageError::storage(stage, e))?;
                }
                Err(e) if e.is_malformed() => {
                    warn!(lead_id = %lead.id, error = %e.message, "Skipping malformed draft");
                    ctx.checkpoint.tally.malformed += 1;
                }
                Err(e) => return Err(StageError::from_provider(stage, e)),
            }
            ctx.complete_item(id, index, Some(format!("Drafted outreach for {}", lead.name)))?;
        }

        Ok(StageOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_stage_has_its_handler() {
        for stage in Stage::ALL {
            assert_eq!(handler_for(stage).stage(), stage);
        }
    }
}
