//! JSON bodies returned by the lookup commands and HTTP routes.

use serde::{Deserialize, Serialize};

use behavior_drift::{Direction, DriftScore, EntitySummary, Explanation, StrongestDay};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub entities: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftPoint {
    pub day: u32,
    pub drift_score: f64,
}

impl From<&DriftScore> for DriftPoint {
    fn from(s: &DriftScore) -> Self {
        Self {
            day: s.day,
            drift_score: s.drift_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftTimeline {
    pub user_id: String,
    pub timeline: Vec<DriftPoint>,
}

impl DriftTimeline {
    pub fn new(user_id: &str, scores: &[DriftScore]) -> Self {
        Self {
            user_id: user_id.to_string(),
            timeline: scores.iter().map(DriftPoint::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestDrift {
    pub user_id: String,
    pub day: u32,
    pub drift_score: f64,
}

impl From<&DriftScore> for LatestDrift {
    fn from(s: &DriftScore) -> Self {
        Self {
            user_id: s.entity_id.clone(),
            day: s.day,
            drift_score: s.drift_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub contribution: f64,
    pub direction: Direction,
}

impl From<&Explanation> for FeatureContribution {
    fn from(e: &Explanation) -> Self {
        Self {
            feature: e.feature.clone(),
            contribution: e.contribution,
            direction: e.direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftExplanationResponse {
    pub user_id: String,
    pub day: u32,
    pub explanations: Vec<FeatureContribution>,
}

impl From<&StrongestDay> for DriftExplanationResponse {
    fn from(s: &StrongestDay) -> Self {
        Self {
            user_id: s.entity_id.clone(),
            day: s.day,
            explanations: s.explanations.iter().map(FeatureContribution::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetResponse {
    pub user_id: String,
    pub onset_day: Option<u32>,
    pub threshold: f64,
    pub run_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub user_id: String,
    pub days_scored: usize,
    pub mean_score: f64,
    pub max_score: f64,
    pub peak_day: u32,
    pub latest_day: u32,
    pub latest_score: f64,
    pub onset_day: Option<u32>,
}

impl From<&EntitySummary> for SummaryResponse {
    fn from(s: &EntitySummary) -> Self {
        Self {
            user_id: s.entity_id.clone(),
            days_scored: s.days_scored,
            mean_score: s.mean_score,
            max_score: s.max_score,
            peak_day: s.peak_day,
            latest_day: s.latest.day,
            latest_score: s.latest.drift_score,
            onset_day: s.onset_day,
        }
    }
}
