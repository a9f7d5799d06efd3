//! Operator CLI for inspecting and recovering lead collection jobs.
//!
//! Runs no jobs itself; providers are wired by the embedding service.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;

use leadrun::config::{load_config, EngineConfig};
use leadrun::db::{job_repo, lead_repo, Database};
use leadrun::{
    supervisor, telemetry, ConfigError, Job, JobFilter, JobStatus, LeadrunError,
    SqliteCheckpointStore, SupervisorError,
};

#[derive(Parser)]
#[command(name = "leadrun")]
#[command(about = "Inspect and recover lead collection jobs", version)]
struct Cli {
    /// Engine config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mark jobs left running by a stopped process as resumable
    Recover,

    /// List a user's jobs, newest first
    Jobs {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },

    /// Print a job as JSON
    Show { job: String },

    /// Print the leads of a job as JSON
    Leads {
        job: String,
        #[arg(long)]
        user: String,
    },
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    JobStatus::parse(s).ok_or_else(|| format!("unknown job status '{}'", s))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LeadrunError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    telemetry::init_logging(&config.logging)?;

    let path = cli
        .database
        .clone()
        .or_else(|| config.resolved_database_path())
        .ok_or_else(|| ConfigError::Validation {
            message: "no database_path configured and no home directory found".to_string(),
        })?;
    let db = Database::open(&path)?;
    info!("leadrun v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Recover => {
            let store = SqliteCheckpointStore::new(db.clone());
            let recovered = supervisor::recover_interrupted(&db, &store)?;
            println!("Recovered {} job(s)", recovered.len());
            for job_id in recovered {
                println!("  {}", job_id);
            }
        }
        Commands::Jobs {
            user,
            status,
            limit,
        } => {
            let filter = JobFilter {
                status,
                limit: Some(limit),
                offset: None,
            };
            let (jobs, total) = job_repo::query(&db, &user, &filter)?;
            for job in &jobs {
                println!(
                    "{}  {:<16}  {}  {}",
                    job.id,
                    job.status.as_str(),
                    job.created_at.format("%Y-%m-%d %H:%M"),
                    job.query
                );
            }
            println!("{} of {} job(s)", jobs.len(), total);
        }
        Commands::Show { job } => {
            let job = find_job(&db, &job)?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Leads { job, user } => {
            let job = find_job(&db, &job)?;
            if job.user_id != user {
                return Err(SupervisorError::NotFound(job.id).into());
            }
            let leads = lead_repo::list_for_job(&db, &job.id)?;
            println!("{}", serde_json::to_string_pretty(&leads)?);
        }
    }

    Ok(())
}

fn find_job(db: &Database, job_id: &str) -> Result<Job, LeadrunError> {
    job_repo::find_by_id(db, job_id)?
        .ok_or_else(|| SupervisorError::NotFound(job_id.to_string()).into())
}
