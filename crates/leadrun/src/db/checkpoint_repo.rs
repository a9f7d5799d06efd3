//! Checkpoint repository for the `checkpoints` and `checkpoint_ids` tables.
//!
//! The header row holds the stage, position and tally; processed
//! identifiers are kept per (job, stage) so earlier stages' sets survive
//! a stage boundary.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::checkpoint::{Checkpoint, RunTally};
use crate::pipeline::Stage;

/// Replaces the job's checkpoint in a single transaction.
pub fn save(db: &Database, job_id: &str, checkpoint: &Checkpoint) -> Result<(), DatabaseError> {
    let tally = serde_json::to_string(&checkpoint.tally).map_err(|e| DatabaseError::Json {
        column: "tally",
        source: e,
    })?;
    let last_index = checkpoint.last_index.map(|i| i as i64);
    let stage = checkpoint.stage.as_str();

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO checkpoints (job_id, stage, last_index, params_fingerprint, tally, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(job_id) DO UPDATE SET stage = excluded.stage,
                 last_index = excluded.last_index,
                 params_fingerprint = excluded.params_fingerprint,
                 tally = excluded.tally,
                 saved_at = excluded.saved_at",
            params![
                job_id,
                stage,
                last_index,
                checkpoint.params_fingerprint,
                tally,
                format_timestamp(checkpoint.saved_at),
            ],
        )?;
        tx.execute(
            "DELETE FROM checkpoint_ids WHERE job_id = ?1 AND stage = ?2",
            params![job_id, stage],
        )?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO checkpoint_ids (job_id, stage, identifier) VALUES (?1, ?2, ?3)",
            )?;
            for id in &checkpoint.processed_ids {
                insert.execute(params![job_id, stage, id])?;
            }
        }
        tx.commit()?;
        log::debug!(
            "Saved checkpoint for job {} at {}:{:?} ({} ids)",
            job_id,
            stage,
            checkpoint.last_index,
            checkpoint.processed_ids.len()
        );
        Ok(())
    })
}

/// Loads the job's checkpoint with the processed set of its stage.
pub fn load(db: &Database, job_id: &str) -> Result<Option<Checkpoint>, DatabaseError> {
    db.with_conn(|conn| {
        let header = conn
            .query_row(
                "SELECT stage, last_index, params_fingerprint, tally, saved_at
                 FROM checkpoints WHERE job_id = ?1",
                params![job_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Option<i64>>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some(header) = header else {
            return Ok(None);
        };
        let (stage, last_index, params_fingerprint, tally, saved_at) = header;

        let stage = Stage::parse(&stage).ok_or(DatabaseError::InvalidValue {
            column: "stage",
            value: stage,
        })?;
        let last_index = last_index
            .map(|i| {
                usize::try_from(i).map_err(|_| DatabaseError::InvalidValue {
                    column: "last_index",
                    value: i.to_string(),
                })
            })
            .transpose()?;
        let tally: RunTally = serde_json::from_str(&tally).map_err(|e| DatabaseError::Json {
            column: "tally",
            source: e,
        })?;

        let mut stmt = conn.prepare(
            "SELECT identifier FROM checkpoint_ids WHERE job_id = ?1 AND stage = ?2",
        )?;
        let processed_ids = stmt
            .query_map(params![job_id, stage.as_str()], |r| r.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Some(Checkpoint {
            stage,
            processed_ids,
            last_index,
            saved_at: parse_timestamp("saved_at", &saved_at)?,
            params_fingerprint,
            tally,
        }))
    })
}

/// Removes the job's checkpoint and every processed set.
pub fn clear(db: &Database, job_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        clear_in(&tx, job_id)?;
        tx.commit()?;
        Ok(())
    })
}

/// Same as [`clear`] on an already locked connection or open transaction.
pub(crate) fn clear_in(conn: &Connection, job_id: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM checkpoint_ids WHERE job_id = ?1", params![job_id])?;
    conn.execute("DELETE FROM checkpoints WHERE job_id = ?1", params![job_id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo;
    use crate::job::{Job, JobParams};

    fn setup() -> (Database, Job) {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("u1", "gyms", JobParams::default());
        job_repo::insert(&db, &job).unwrap();
        (db, job)
    }

    #[test]
    fn test_load_missing() {
        let (db, job) = setup();
        assert!(load(&db, &job.id).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let (db, job) = setup();
        let mut cp = Checkpoint::new(Stage::Discover, "fp-1");
        cp.record("place:A".to_string(), 0);
        cp.record("phone:+15551234567".to_string(), 1);
        cp.tally.duplicates = 1;
        save(&db, &job.id, &cp).unwrap();

        let loaded = load(&db, &job.id).unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::Discover);
        assert_eq!(loaded.last_index, Some(1));
        assert_eq!(loaded.processed_ids, cp.processed_ids);
        assert_eq!(loaded.params_fingerprint, "fp-1");
        assert_eq!(loaded.tally.duplicates, 1);
        assert_eq!(loaded.saved_at, cp.saved_at);
    }

    #[test]
    fn test_save_overwrites_wholesale() {
        let (db, job) = setup();
        let mut cp = Checkpoint::new(Stage::Discover, "fp");
        cp.record("place:A".to_string(), 0);
        save(&db, &job.id, &cp).unwrap();

        cp.record("place:B".to_string(), 1);
        save(&db, &job.id, &cp).unwrap();

        let loaded = load(&db, &job.id).unwrap().unwrap();
        assert_eq!(loaded.processed_ids.len(), 2);
        assert_eq!(loaded.resume_index(), 2);
    }

    #[test]
    fn test_stage_boundary_loads_only_current_stage_ids() {
        let (db, job) = setup();
        let mut cp = Checkpoint::new(Stage::Discover, "fp");
        cp.record("place:A".to_string(), 0);
        save(&db, &job.id, &cp).unwrap();

        let next = cp.advance_to(Stage::Enrich);
        save(&db, &job.id, &next).unwrap();

        let loaded = load(&db, &job.id).unwrap().unwrap();
        assert_eq!(loaded.stage, Stage::Enrich);
        assert_eq!(loaded.last_index, None);
        assert!(loaded.processed_ids.is_empty());

        // The discovery set is still on disk.
        let kept: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM checkpoint_ids WHERE job_id = ?1 AND stage = 'discover'",
                    params![job.id],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(kept, 1);
    }

    #[test]
    fn test_clear() {
        let (db, job) = setup();
        let mut cp = Checkpoint::new(Stage::Score, "fp");
        cp.record("lead:1".to_string(), 0);
        save(&db, &job.id, &cp).unwrap();

        clear(&db, &job.id).unwrap();
        assert!(load(&db, &job.id).unwrap().is_none());
    }
}
