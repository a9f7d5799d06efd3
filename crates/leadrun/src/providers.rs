//! External collaborators of a job run.
//!
//! Place search, enrichment and outreach drafting live outside this crate.
//! The pipeline talks to them only through these traits, and they report
//! failures as a [`ProviderError`] whose kind decides whether the job can
//! be resumed.

use std::sync::Arc;

use thiserror::Error;

use crate::job::{JobParams, Language};
use crate::lead::{Candidate, Enrichment, Lead, OutreachDraft, Scorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Timeouts, 5xx responses, rate limiting. Retrying later may succeed.
    Transient,
    /// Bad credentials, rejected query. Retrying will not help.
    Permanent,
    /// A single record could not be understood. Only that record is skipped.
    Malformed,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::Transient => write!(f, "transient"),
            ProviderErrorKind::Permanent => write!(f, "permanent"),
            ProviderErrorKind::Malformed => write!(f, "malformed"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Permanent, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Malformed, message)
    }

    /// Upstream rejected the call for exceeding its quota.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::transient(format!("rate limited: {}", message.into()))
    }

    pub fn is_malformed(&self) -> bool {
        self.kind == ProviderErrorKind::Malformed
    }
}

/// Candidates in discovery order. Item `n` is the candidate at
/// `start_index + n` of the job's sequence.
pub type CandidateStream<'a> =
    Box<dyn Iterator<Item = Result<Candidate, ProviderError>> + Send + 'a>;

/// Place-search provider.
///
/// For a given query and parameters the sequence must be stable, so
/// resuming at `start_index` yields the same candidates an uninterrupted
/// run would have seen from that position.
pub trait CandidateSource: Send + Sync {
    fn fetch(
        &self,
        query: &str,
        params: &JobParams,
        start_index: usize,
    ) -> Result<CandidateStream<'_>, ProviderError>;
}

/// Finds additional contact details for a lead.
pub trait Enricher: Send + Sync {
    fn enrich(&self, lead: &Lead) -> Result<Enrichment, ProviderError>;
}

/// Drafts an outreach message for a qualified lead.
pub trait OutreachDrafter: Send + Sync {
    fn draft(
        &self,
        lead: &Lead,
        context: Option<&str>,
        language: Language,
    ) -> Result<OutreachDraft, ProviderError>;
}

/// The set of collaborators a run uses.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn CandidateSource>,
    pub enricher: Arc<dyn Enricher>,
    pub scorer: Arc<dyn Scorer>,
    pub drafter: Arc<dyn OutreachDrafter>,
}

impl Collaborators {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        enricher: Arc<dyn Enricher>,
        scorer: Arc<dyn Scorer>,
        drafter: Arc<dyn OutreachDrafter>,
    ) -> Self {
        Self {
            source,
            enricher,
            scorer,
            drafter,
        }
    }
}
