pub mod dedup;
pub mod model;
pub mod phone;
pub mod scorer;

pub use dedup::{classify, Dedup, DedupKey, KnownLeads};
pub use model::{
    Candidate, Enrichment, Lead, LeadScore, OutreachDraft, ScoreBreakdown, Tier,
};
pub use scorer::{LeadScorer, Scorer};
