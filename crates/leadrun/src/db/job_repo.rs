//! Job repository: CRUD and state transitions for the `jobs` table.
//!
//! Status changes are compare-and-set: each transition names the states
//! it may start from and reports whether the row actually moved.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_timestamp, parse_timestamp, placeholders, Database, DatabaseError};
use crate::job::{Job, JobFilter, JobParams, JobStatus, JobSummary, Language};
use crate::pipeline::Stage;
use crate::progress::Progress;

/// A raw job row from the database.
#[derive(Debug, Clone)]
struct JobRow {
    id: String,
    user_id: String,
    query: String,
    status: String,
    max_results: i64,
    min_score: i64,
    skip_enrichment: bool,
    skip_outreach: bool,
    context: Option<String>,
    language: String,
    error: Option<String>,
    error_stage: Option<String>,
    progress: Option<String>,
    summary: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            query: row.get("query")?,
            status: row.get("status")?,
            max_results: row.get("max_results")?,
            min_score: row.get("min_score")?,
            skip_enrichment: row.get("skip_enrichment")?,
            skip_outreach: row.get("skip_outreach")?,
            context: row.get("context")?,
            language: row.get("language")?,
            error: row.get("error")?,
            error_stage: row.get("error_stage")?,
            progress: row.get("progress")?,
            summary: row.get("summary")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<Job, DatabaseError> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| DatabaseError::InvalidValue {
            column: "status",
            value: self.status.clone(),
        })?;
        let language =
            Language::parse(&self.language).ok_or_else(|| DatabaseError::InvalidValue {
                column: "language",
                value: self.language.clone(),
            })?;
        let error_stage = self
            .error_stage
            .as_deref()
            .map(|s| {
                Stage::parse(s).ok_or_else(|| DatabaseError::InvalidValue {
                    column: "error_stage",
                    value: s.to_string(),
                })
            })
            .transpose()?;
        let progress = self
            .progress
            .as_deref()
            .map(|s| {
                serde_json::from_str::<Progress>(s).map_err(|e| DatabaseError::Json {
                    column: "progress",
                    source: e,
                })
            })
            .transpose()?;
        let summary = self
            .summary
            .as_deref()
            .map(|s| {
                serde_json::from_str::<JobSummary>(s).map_err(|e| DatabaseError::Json {
                    column: "summary",
                    source: e,
                })
            })
            .transpose()?;

        Ok(Job {
            params: JobParams {
                max_results: u32::try_from(self.max_results).map_err(|_| {
                    DatabaseError::InvalidValue {
                        column: "max_results",
                        value: self.max_results.to_string(),
                    }
                })?,
                min_score: u8::try_from(self.min_score).map_err(|_| {
                    DatabaseError::InvalidValue {
                        column: "min_score",
                        value: self.min_score.to_string(),
                    }
                })?,
                skip_enrichment: self.skip_enrichment,
                skip_outreach: self.skip_outreach,
                context: self.context,
                language,
            },
            id: self.id,
            user_id: self.user_id,
            query: self.query,
            status,
            error: self.error,
            error_stage,
            progress,
            summary,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            started_at: self
                .started_at
                .as_deref()
                .map(|s| parse_timestamp("started_at", s))
                .transpose()?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|s| parse_timestamp("completed_at", s))
                .transpose()?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

/// How a run left the job.
#[derive(Debug, Clone)]
pub struct JobFinish {
    pub status: JobStatus,
    pub error: Option<String>,
    pub error_stage: Option<Stage>,
    pub summary: Option<JobSummary>,
    /// Drop the checkpoint in the same transaction.
    pub clear_checkpoint: bool,
}

fn to_json<T: serde::Serialize>(column: &'static str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Json { column, source: e })
}

fn status_params(from: &[JobStatus]) -> Vec<Box<dyn rusqlite::types::ToSql>> {
    from.iter()
        .map(|s| Box::new(s.as_str()) as Box<dyn rusqlite::types::ToSql>)
        .collect()
}

fn execute_boxed(
    conn: &Connection,
    sql: &str,
    values: &[Box<dyn rusqlite::types::ToSql>],
) -> Result<usize, DatabaseError> {
    let params_ref: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();
    Ok(conn.execute(sql, params_ref.as_slice())?)
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    let progress = job
        .progress
        .as_ref()
        .map(|p| to_json("progress", p))
        .transpose()?;
    let summary = job
        .summary
        .as_ref()
        .map(|s| to_json("summary", s))
        .transpose()?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, user_id, query, status, max_results, min_score,
             skip_enrichment, skip_outreach, context, language, error, error_stage,
             progress, summary, created_at, started_at, completed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                job.id,
                job.user_id,
                job.query,
                job.status.as_str(),
                job.params.max_results,
                job.params.min_score,
                job.params.skip_enrichment,
                job.params.skip_outreach,
                job.params.context,
                job.params.language.as_str(),
                job.error,
                job.error_stage.map(|s| s.as_str()),
                progress,
                summary,
                format_timestamp(job.created_at),
                job.started_at.map(format_timestamp),
                job.completed_at.map(format_timestamp),
                format_timestamp(job.updated_at),
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Job>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Lists a user's jobs, newest first, returning (jobs, total_count).
pub fn query(
    db: &Database,
    user_id: &str,
    filter: &JobFilter,
) -> Result<(Vec<Job>, u64), DatabaseError> {
    let (rows, total) = db.with_conn(|conn| {
        let mut conditions = vec!["user_id = ?1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(user_id.to_string())];

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        // Count total matching rows.
        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        // Fetch paginated results.
        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })?;

    let jobs = rows
        .into_iter()
        .map(JobRow::into_job)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((jobs, total))
}

/// All jobs currently in the given status, oldest first.
pub fn find_by_status(db: &Database, status: JobStatus) -> Result<Vec<Job>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at")?;
        let rows = stmt
            .query_map(params![status.as_str()], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(JobRow::into_job).collect()
}

/// Moves a job to `running`. `started_at` is only set on the first start.
///
/// Returns `false` when the job was not in one of the `from` states.
pub fn mark_running(
    db: &Database,
    id: &str,
    from: &[JobStatus],
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let ts = format_timestamp(now);
    db.with_conn(|conn| {
        let sql = format!(
            "UPDATE jobs SET status = 'running', started_at = COALESCE(started_at, ?2),
             error = NULL, error_stage = NULL, completed_at = NULL, updated_at = ?2
             WHERE id = ?1 AND status IN ({})",
            placeholders(3, from.len())
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(id.to_string()), Box::new(ts)];
        values.extend(status_params(from));
        Ok(execute_boxed(conn, &sql, &values)? == 1)
    })
}

/// Writes the latest progress snapshot.
pub fn update_progress(
    db: &Database,
    id: &str,
    progress: &Progress,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let json = to_json("progress", progress)?;
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET progress = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, json, format_timestamp(now)],
        )?;
        Ok(())
    })
}

/// Records the outcome of a run. Terminal states also get `completed_at`.
///
/// Returns `false` when the job was not in one of the `from` states, in
/// which case nothing is written.
pub fn finish(
    db: &Database,
    id: &str,
    from: &[JobStatus],
    outcome: &JobFinish,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let summary = outcome
        .summary
        .as_ref()
        .map(|s| to_json("summary", s))
        .transpose()?;
    let ts = format_timestamp(now);
    let completed_at = outcome.status.is_terminal().then(|| ts.clone());

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let sql = format!(
            "UPDATE jobs SET status = ?2, error = ?3, error_stage = ?4,
             summary = COALESCE(?5, summary), completed_at = ?6, updated_at = ?7
             WHERE id = ?1 AND status IN ({})",
            placeholders(8, from.len())
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(id.to_string()),
            Box::new(outcome.status.as_str()),
            Box::new(outcome.error.clone()),
            Box::new(outcome.error_stage.map(|s| s.as_str())),
            Box::new(summary),
            Box::new(completed_at),
            Box::new(ts),
        ];
        values.extend(status_params(from));

        let changed = execute_boxed(&tx, &sql, &values)? == 1;
        if changed && outcome.clear_checkpoint {
            super::checkpoint_repo::clear_in(&tx, id)?;
        }
        tx.commit()?;
        Ok(changed)
    })
}

/// Puts a finished or stopped job back to `pending` with fresh state.
///
/// Drops the job's leads, checkpoint and progress in one transaction.
pub fn reset_for_restart(
    db: &Database,
    id: &str,
    from: &[JobStatus],
    params: &JobParams,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let ts = format_timestamp(now);
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let sql = format!(
            "UPDATE jobs SET status = 'pending', max_results = ?2, min_score = ?3,
             skip_enrichment = ?4, skip_outreach = ?5, context = ?6, language = ?7,
             error = NULL, error_stage = NULL, progress = NULL, summary = NULL,
             started_at = NULL, completed_at = NULL, updated_at = ?8
             WHERE id = ?1 AND status IN ({})",
            placeholders(9, from.len())
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(id.to_string()),
            Box::new(params.max_results),
            Box::new(params.min_score),
            Box::new(params.skip_enrichment),
            Box::new(params.skip_outreach),
            Box::new(params.context.clone()),
            Box::new(params.language.as_str()),
            Box::new(ts),
        ];
        values.extend(status_params(from));

        let changed = execute_boxed(&tx, &sql, &values)? == 1;
        if changed {
            let removed = tx.execute("DELETE FROM leads WHERE job_id = ?1", params![id])?;
            super::checkpoint_repo::clear_in(&tx, id)?;
            log::debug!("Reset job {} for restart, removed {} leads", id, removed);
        }
        tx.commit()?;
        Ok(changed)
    })
}
