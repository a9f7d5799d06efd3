use serde::{Deserialize, Serialize};

use crate::job::JobParams;

/// A step of the lead pipeline. Stages always run in declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    Enrich,
    Score,
    Outreach,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Discover, Stage::Enrich, Stage::Score, Stage::Outreach];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::Enrich => "enrich",
            Stage::Score => "score",
            Stage::Outreach => "outreach",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discover" => Some(Stage::Discover),
            "enrich" => Some(Stage::Enrich),
            "score" => Some(Stage::Score),
            "outreach" => Some(Stage::Outreach),
            _ => None,
        }
    }

    /// Human-readable activity shown in progress messages.
    pub fn activity(&self) -> &'static str {
        match self {
            Stage::Discover => "Searching for businesses",
            Stage::Enrich => "Enriching contact details",
            Stage::Score => "Scoring leads",
            Stage::Outreach => "Drafting outreach messages",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the stages a job with these parameters executes, in order.
///
/// Scoring is never skipped; it decides which leads qualify.
pub fn plan(params: &JobParams) -> Vec<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|stage| match stage {
            Stage::Enrich => !params.skip_enrichment,
            Stage::Outreach => !params.skip_outreach,
            Stage::Discover | Stage::Score => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_plan() {
        let params = JobParams::default();
        assert_eq!(plan(&params), Stage::ALL.to_vec());
    }

    #[test]
    fn test_plan_skips_optional_stages() {
        let params = JobParams {
            skip_enrichment: true,
            skip_outreach: true,
            ..Default::default()
        };
        assert_eq!(plan(&params), vec![Stage::Discover, Stage::Score]);
    }

    #[test]
    fn test_parse_roundtrip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(Stage::parse("publish"), None);
    }
}
