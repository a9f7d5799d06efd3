use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Temperature bucket derived from the lead score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(Tier::Hot),
            "warm" => Some(Tier::Warm),
            "cold" => Some(Tier::Cold),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business as returned by the place-search provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    #[serde(default)]
    pub place_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub maps_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub price_level: Option<String>,
    #[serde(default)]
    pub is_claimed: Option<bool>,
    #[serde(default)]
    pub years_in_business: Option<u32>,
    #[serde(default)]
    pub photos_count: u32,
    /// Untouched upstream payload.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Candidate {
    /// Provider place id, ignoring the placeholder some providers emit.
    pub fn provider_id(&self) -> Option<&str> {
        self.place_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && !id.eq_ignore_ascii_case("unknown"))
    }
}

/// Contact details found by the enrichment provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Enrichment {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub facebook: Option<String>,
    #[serde(default)]
    pub instagram: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub website_reachable: Option<bool>,
    #[serde(default)]
    pub has_contact_form: Option<bool>,
}

/// Outreach message drafted for a qualified lead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutreachDraft {
    pub channel: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

/// Per-factor breakdown of a lead score, each factor 0..=25.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub rating: u32,
    pub reviews: u32,
    pub completeness: u32,
    pub social: u32,
    pub signals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeadScore {
    /// Normalized score, 0..=100.
    pub total: f64,
    pub tier: Tier,
    pub breakdown: ScoreBreakdown,
}

/// A deduplicated business record owned by a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub job_id: String,
    pub user_id: String,
    /// Position of the source candidate in the job's discovery sequence.
    pub source_index: usize,
    pub place_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub normalized_phone: Option<String>,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub maps_url: Option<String>,
    pub category: Option<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub price_level: Option<String>,
    pub is_claimed: Option<bool>,
    pub years_in_business: Option<u32>,
    pub photos_count: u32,
    pub owner_name: Option<String>,
    pub linkedin: Option<String>,
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub twitter: Option<String>,
    pub website_reachable: bool,
    pub has_contact_form: bool,
    /// Set once enrichment results are merged and stored.
    pub enriched_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub tier: Option<Tier>,
    pub qualified: bool,
    pub outreach: Option<OutreachDraft>,
    pub raw_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Builds a lead from a discovered candidate.
    ///
    /// The WhatsApp handle is the normalized number without its `+`.
    pub fn from_candidate(
        job_id: &str,
        user_id: &str,
        source_index: usize,
        candidate: Candidate,
        normalized_phone: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let place_id = candidate.provider_id().map(str::to_string);
        let whatsapp = normalized_phone
            .as_deref()
            .map(|p| p.trim_start_matches('+').to_string());
        let raw_data = match candidate.raw {
            serde_json::Value::Null => None,
            raw => Some(raw),
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            source_index,
            place_id,
            name: candidate.name,
            phone: candidate.phone,
            normalized_phone,
            email: candidate.email,
            whatsapp,
            website: candidate.website,
            address: candidate.address,
            maps_url: candidate.maps_url,
            category: candidate.category,
            rating: candidate.rating,
            review_count: candidate.review_count,
            price_level: candidate.price_level,
            is_claimed: candidate.is_claimed,
            years_in_business: candidate.years_in_business,
            photos_count: candidate.photos_count,
            owner_name: None,
            linkedin: None,
            facebook: None,
            instagram: None,
            twitter: None,
            website_reachable: false,
            has_contact_form: false,
            enriched_at: None,
            score: None,
            tier: None,
            qualified: false,
            outreach: None,
            raw_data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges enrichment results. Discovered values win over enriched ones.
    pub fn apply_enrichment(&mut self, enrichment: Enrichment) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value.filter(|v| !v.trim().is_empty());
            }
        }

        fill(&mut self.email, enrichment.email);
        fill(&mut self.owner_name, enrichment.owner_name);
        fill(&mut self.linkedin, enrichment.linkedin);
        fill(&mut self.facebook, enrichment.facebook);
        fill(&mut self.instagram, enrichment.instagram);
        fill(&mut self.twitter, enrichment.twitter);
        if let Some(reachable) = enrichment.website_reachable {
            self.website_reachable = reachable;
        }
        if let Some(form) = enrichment.has_contact_form {
            self.has_contact_form = form;
        }
        let now = Utc::now();
        self.enriched_at = Some(now);
        self.updated_at = now;
    }
}
