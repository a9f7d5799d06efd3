pub mod context;
pub mod error;
pub mod runner;
pub mod stage;
pub mod stages;

pub use context::{RunContext, RunSettings};
pub use error::{StageError, StageOutcome};
pub use runner::{JobRunner, RunOutcome};
pub use stage::{plan, Stage};
pub use stages::{handler_for, StageHandler};
