//! Versioned schema migrations.
//!
//! The highest version in `_migrations` is the schema version. An
//! ADD COLUMN migration whose column already exists is recorded without
//! running.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Schema history, oldest first.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_leads_table",
        sql: include_str!("sql/002_create_leads.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_checkpoint_tables",
        sql: include_str!("sql/003_create_checkpoints.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "add_error_stage_to_jobs",
        sql: include_str!("sql/004_add_error_stage.sql"),
        kind: MigrationKind::AddColumn {
            table: "jobs",
            column: "error_stage",
        },
    },
    Migration {
        version: 5,
        description: "add_enriched_at_to_leads",
        sql: include_str!("sql/005_add_enriched_at.sql"),
        kind: MigrationKind::AddColumn {
            table: "leads",
            column: "enriched_at",
        },
    },
];

/// Applies every migration newer than the recorded schema version.
///
/// Each migration commits together with its `_migrations` row, so an
/// interrupted upgrade resumes at the first unrecorded version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied = schema_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        log::debug!("Schema is current at v{}", applied);
        return Ok(());
    }

    for migration in pending {
        apply(conn, migration)?;
    }
    log::info!("Schema migrated from v{} to v{}", applied, schema_version(conn)?);
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let needed = match &migration.kind {
        MigrationKind::Standard => true,
        MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    if needed {
        log::info!("Applying migration v{}: {}", migration.version, migration.description);
        tx.execute_batch(migration.sql).map_err(failed)?;
    } else {
        log::debug!(
            "Recording migration v{} ({}) without running it, schema already has it",
            migration.version,
            migration.description
        );
    }
    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // Only alphanumeric and underscores allowed in the identifier.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.try_fold(false, |found, name| Ok(found || name? == column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh_conn();
        run_all(&conn).unwrap();

        let latest = MIGRATIONS.last().unwrap().version;
        assert_eq!(schema_version(&conn).unwrap(), latest);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh_conn();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_add_column_is_skipped_when_present() {
        let conn = fresh_conn();
        conn.execute_batch(include_str!("sql/001_create_jobs.sql"))
            .unwrap();
        conn.execute_batch(include_str!("sql/004_add_error_stage.sql"))
            .unwrap();

        // error_stage already exists; v4 must not try to add it twice.
        run_all(&conn).unwrap();
        assert!(column_exists(&conn, "jobs", "error_stage").unwrap());
    }

    #[test]
    fn test_column_exists_check() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE test_tbl (id TEXT, name TEXT);")
            .unwrap();

        assert!(column_exists(&conn, "test_tbl", "id").unwrap());
        assert!(!column_exists(&conn, "test_tbl", "missing").unwrap());
        assert!(column_exists(&conn, "bad name;", "id").is_err());
    }

    #[test]
    fn test_checkpoint_ids_cascade_with_job() {
        let conn = fresh_conn();
        run_all(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO jobs (id, user_id, query, max_results, created_at, updated_at)
                 VALUES ('j1', 'u1', 'coffee', 10, '2026-01-01', '2026-01-01');
             INSERT INTO checkpoint_ids (job_id, stage, identifier)
                 VALUES ('j1', 'discover', 'place:p1');
             DELETE FROM jobs WHERE id = 'j1';",
        )
        .unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM checkpoint_ids", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
