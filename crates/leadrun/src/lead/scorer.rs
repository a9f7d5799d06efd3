//! Lead scoring.
//!
//! Five factors worth up to 25 points each (rating, review volume, data
//! completeness, social presence and business signals) are summed and
//! normalized from 125 down to a 0..=100 score.

use crate::providers::ProviderError;

use super::model::{Lead, LeadScore, ScoreBreakdown, Tier};

const FACTOR_MAX: u32 = 25;
const RAW_MAX: f64 = 125.0;

/// Scores a lead. Implementations must be deterministic for a given lead.
pub trait Scorer: Send + Sync {
    fn score(&self, lead: &Lead) -> Result<LeadScore, ProviderError>;
}

/// Default five-factor scorer.
#[derive(Debug, Clone)]
pub struct LeadScorer {
    hot_threshold: f64,
    warm_threshold: f64,
}

impl LeadScorer {
    pub fn new(hot_threshold: u8, warm_threshold: u8) -> Self {
        Self {
            hot_threshold: f64::from(hot_threshold),
            warm_threshold: f64::from(warm_threshold),
        }
    }

    pub fn tier_for(&self, total: f64) -> Tier {
        if total >= self.hot_threshold {
            Tier::Hot
        } else if total >= self.warm_threshold {
            Tier::Warm
        } else {
            Tier::Cold
        }
    }

    pub fn breakdown(&self, lead: &Lead) -> ScoreBreakdown {
        ScoreBreakdown {
            rating: score_rating(lead.rating),
            reviews: score_reviews(lead.review_count),
            completeness: score_completeness(lead),
            social: score_social(lead),
            signals: score_signals(lead),
        }
    }
}

impl Default for LeadScorer {
    fn default() -> Self {
        Self::new(75, 50)
    }
}

impl Scorer for LeadScorer {
    fn score(&self, lead: &Lead) -> Result<LeadScore, ProviderError> {
        let breakdown = self.breakdown(lead);
        let raw = breakdown.rating
            + breakdown.reviews
            + breakdown.completeness
            + breakdown.social
            + breakdown.signals;
        let total = (f64::from(raw) * 100.0 / RAW_MAX).min(100.0);

        Ok(LeadScore {
            total,
            tier: self.tier_for(total),
            breakdown,
        })
    }
}

fn score_rating(rating: Option<f64>) -> u32 {
    match rating {
        None => 0,
        Some(r) if r >= 4.5 => 25,
        Some(r) if r >= 4.0 => 20,
        Some(r) if r >= 3.5 => 15,
        Some(r) if r >= 3.0 => 10,
        Some(_) => 5,
    }
}

fn score_reviews(count: u32) -> u32 {
    match count {
        100.. => 25,
        50..=99 => 20,
        20..=49 => 15,
        5..=19 => 10,
        1..=4 => 5,
        0 => 0,
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn score_completeness(lead: &Lead) -> u32 {
    let mut score = 0;
    if present(&lead.phone) {
        score += 5;
    }
    if present(&lead.website) {
        score += 5;
    }
    if present(&lead.email) {
        score += 8;
    }
    if present(&lead.owner_name) {
        score += 7;
    }
    score.min(FACTOR_MAX)
}

fn score_social(lead: &Lead) -> u32 {
    let mut score = 0;
    if present(&lead.linkedin) {
        score += 8;
    }
    if present(&lead.instagram) {
        score += 6;
    }
    if present(&lead.facebook) {
        score += 5;
    }
    if present(&lead.twitter) {
        score += 3;
    }
    score.min(FACTOR_MAX)
}

fn score_signals(lead: &Lead) -> u32 {
    let mut score = match lead.photos_count {
        20.. => 5,
        10..=19 => 3,
        1..=9 => 1,
        0 => 0,
    };
    if present(&lead.price_level) {
        score += 2;
    }
    if lead.is_claimed == Some(true) {
        score += 5;
    }
    if lead.website_reachable {
        score += 2;
    }
    if lead.has_contact_form {
        score += 1;
    }
    if lead
        .website
        .as_deref()
        .is_some_and(|w| w.starts_with("https"))
    {
        score += 2;
    }
    score.min(FACTOR_MAX)
}
