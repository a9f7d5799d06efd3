pub mod model;

pub use model::{
    new_job_id, InvalidParams, Job, JobFilter, JobParams, JobStatus, JobSummary, Language,
};
