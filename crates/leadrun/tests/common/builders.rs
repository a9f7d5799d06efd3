//! Builders for candidates and job parameters.

#![allow(dead_code)]

use leadrun::{Candidate, JobParams, ProviderError};

/// Builder for `Candidate` instances.
pub struct CandidateBuilder {
    candidate: Candidate,
}

impl CandidateBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            candidate: Candidate {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn place_id(mut self, id: &str) -> Self {
        self.candidate.place_id = Some(id.to_string());
        self
    }

    pub fn phone(mut self, phone: &str) -> Self {
        self.candidate.phone = Some(phone.to_string());
        self
    }

    pub fn website(mut self, url: &str) -> Self {
        self.candidate.website = Some(url.to_string());
        self
    }

    pub fn rating(mut self, rating: f64, reviews: u32) -> Self {
        self.candidate.rating = Some(rating);
        self.candidate.review_count = reviews;
        self
    }

    pub fn build(self) -> Candidate {
        self.candidate
    }
}

/// A candidate with only a place id, named after it.
pub fn place(id: &str) -> Candidate {
    CandidateBuilder::new(&format!("Business {}", id))
        .place_id(id)
        .build()
}

/// A well-formed script item.
pub fn ok(candidate: Candidate) -> Result<Candidate, ProviderError> {
    Ok(candidate)
}

/// A script item the provider could not parse.
pub fn malformed(detail: &str) -> Result<Candidate, ProviderError> {
    Err(ProviderError::malformed(detail))
}

/// `count` distinct candidates with varied ratings.
pub fn distinct_places(prefix: &str, count: usize) -> Vec<Result<Candidate, ProviderError>> {
    (0..count)
        .map(|i| {
            ok(CandidateBuilder::new(&format!("{} {}", prefix, i))
                .place_id(&format!("{}-{}", prefix, i))
                .phone(&format!("(512) 555-01{:02}", i))
                .rating(3.0 + (i % 5) as f64 * 0.5, (i as u32) * 15)
                .build())
        })
        .collect()
}

/// Builder for `JobParams`.
pub struct ParamsBuilder {
    params: JobParams,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: JobParams::default(),
        }
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.params.max_results = max_results;
        self
    }

    pub fn min_score(mut self, min_score: u8) -> Self {
        self.params.min_score = min_score;
        self
    }

    pub fn skip_enrichment(mut self) -> Self {
        self.params.skip_enrichment = true;
        self
    }

    pub fn skip_outreach(mut self) -> Self {
        self.params.skip_outreach = true;
        self
    }

    pub fn context(mut self, context: &str) -> Self {
        self.params.context = Some(context.to_string());
        self
    }

    pub fn build(self) -> JobParams {
        self.params
    }
}

impl Default for ParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
