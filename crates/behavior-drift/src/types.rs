//! Core data types for observations, representations, drift scores, and explanations.

use serde::{Deserialize, Serialize};

/// One raw per-day feature vector for an entity.
///
/// `values` is aligned with the configured [`FeatureSet`](crate::FeatureSet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_id: String,
    pub day: u32,
    pub values: Vec<f64>,
}

/// Rolling-mean feature vector summarizing the trailing window ending at `day`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    pub entity_id: String,
    pub day: u32,
    pub values: Vec<f64>,
}

/// Normalized distance between the current and reference window means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftScore {
    pub entity_id: String,
    pub day: u32,
    pub drift_score: f64,
}

/// Sign of a feature contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Direction assigned to an exactly-zero contribution.
pub const ZERO_CONTRIBUTION_DIRECTION: Direction = Direction::Decrease;

impl Direction {
    /// `Increase` iff the contribution is strictly positive.
    pub fn from_contribution(contribution: f64) -> Self {
        if contribution > 0.0 {
            Direction::Increase
        } else if contribution < 0.0 {
            Direction::Decrease
        } else {
            ZERO_CONTRIBUTION_DIRECTION
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increase" => Ok(Direction::Increase),
            "decrease" => Ok(Direction::Decrease),
            other => Err(DriftError::MalformedInput(format!(
                "unknown direction '{other}', expected 'increase' or 'decrease'"
            ))),
        }
    }
}

/// Per-feature attribution for one scored day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub entity_id: String,
    pub day: u32,
    /// Base feature name (no window suffix).
    pub feature: String,
    pub contribution: f64,
    pub direction: Direction,
}

/// Output tables of a full pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub representations: Vec<Representation>,
    pub scores: Vec<DriftScore>,
    pub explanations: Vec<Explanation>,
}

/// Errors that can occur in the drift library.
///
/// Insufficient history and near-zero references are not errors: the former
/// silently yields no rows, the latter saturates through the epsilon term.
#[derive(thiserror::Error, Debug)]
pub enum DriftError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type DriftResult<T> = Result<T, DriftError>;
