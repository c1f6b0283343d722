//! Pipeline configuration: feature list, window sizes, and numeric constants.
//!
//! A [`PipelineConfig`] is built once and handed to each stage constructor.
//! Nothing in the crate reads a global feature list.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{DriftError, DriftResult};

/// Default trailing window for representations (days).
pub const DEFAULT_WINDOW_SIZE: usize = 14;

/// Default reference window length (representations).
pub const DEFAULT_REFERENCE_WINDOW: usize = 30;

/// Default current window length (representations).
pub const DEFAULT_CURRENT_WINDOW: usize = 14;

/// Default stabilizing constant for near-zero denominators.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Default number of explanation rows per scored day.
pub const DEFAULT_TOP_K: usize = 3;

/// Ordered, duplicate-free list of feature names.
///
/// The order is significant: it fixes the column order of vectors and breaks
/// ties when ranking explanations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSet {
    names: Vec<String>,
}

impl FeatureSet {
    /// Build a feature set, rejecting empty, duplicate, or unencodable names.
    pub fn new<I, S>(names: I) -> DriftResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(DriftError::InvalidConfig(
                "feature list must not be empty".to_string(),
            ));
        }

        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(DriftError::InvalidConfig(format!(
                    "feature #{i} has an empty name"
                )));
            }
            if name.contains([',', '"', '\n', '\r']) {
                return Err(DriftError::InvalidConfig(format!(
                    "feature name '{name}' contains a reserved character"
                )));
            }
            if name == "entity_id" || name == "day" {
                return Err(DriftError::InvalidConfig(format!(
                    "feature name '{name}' collides with a key column"
                )));
            }
            if names[..i].contains(name) {
                return Err(DriftError::InvalidConfig(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }

        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Column name of a feature in the representations table.
    pub fn representation_column(name: &str, window_size: usize) -> String {
        format!("{name}_mean_{window_size}d")
    }
}

impl TryFrom<Vec<String>> for FeatureSet {
    type Error = DriftError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        FeatureSet::new(names)
    }
}

impl From<FeatureSet> for Vec<String> {
    fn from(set: FeatureSet) -> Self {
        set.names
    }
}

/// How gaps in an entity's day sequence are treated.
///
/// Windows are positional either way; `Reject` refuses inputs where that
/// would make a window span more calendar days than rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    #[default]
    Allow,
    Reject,
}

/// Fixed parameters of one pipeline construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub features: FeatureSet,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_reference_window")]
    pub reference_window: usize,
    #[serde(default = "default_current_window")]
    pub current_window: usize,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub gap_policy: GapPolicy,
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_reference_window() -> usize {
    DEFAULT_REFERENCE_WINDOW
}

fn default_current_window() -> usize {
    DEFAULT_CURRENT_WINDOW
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl PipelineConfig {
    /// Configuration with default windows for the given features.
    pub fn new(features: FeatureSet) -> Self {
        Self {
            features,
            window_size: DEFAULT_WINDOW_SIZE,
            reference_window: DEFAULT_REFERENCE_WINDOW,
            current_window: DEFAULT_CURRENT_WINDOW,
            epsilon: DEFAULT_EPSILON,
            top_k: DEFAULT_TOP_K,
            gap_policy: GapPolicy::Allow,
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_reference_window(mut self, reference_window: usize) -> Self {
        self.reference_window = reference_window;
        self
    }

    pub fn with_current_window(mut self, current_window: usize) -> Self {
        self.current_window = current_window;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_gap_policy(mut self, gap_policy: GapPolicy) -> Self {
        self.gap_policy = gap_policy;
        self
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> DriftResult<Self> {
        let file = std::fs::File::open(path)?;
        let config: PipelineConfig = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check window sizes and epsilon.
    pub fn validate(&self) -> DriftResult<()> {
        if self.features.is_empty() {
            return Err(DriftError::InvalidConfig(
                "feature list must not be empty".to_string(),
            ));
        }
        if self.window_size == 0 {
            return Err(DriftError::InvalidConfig(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.reference_window == 0 {
            return Err(DriftError::InvalidConfig(
                "reference_window must be at least 1".to_string(),
            ));
        }
        if self.current_window == 0 {
            return Err(DriftError::InvalidConfig(
                "current_window must be at least 1".to_string(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(DriftError::InvalidConfig(format!(
                "epsilon must be finite and positive, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FeatureSet {
        FeatureSet::new(["session_count", "avg_session_duration"]).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new(features());
        assert_eq!(config.window_size, 14);
        assert_eq!(config.reference_window, 30);
        assert_eq!(config.current_window, 14);
        assert_eq!(config.epsilon, 1e-8);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.gap_policy, GapPolicy::Allow);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feature_set_rejects_duplicates() {
        assert!(FeatureSet::new(["a", "b", "a"]).is_err());
    }

    #[test]
    fn test_feature_set_rejects_empty() {
        assert!(FeatureSet::new(Vec::<String>::new()).is_err());
        assert!(FeatureSet::new(["a", " "]).is_err());
    }

    #[test]
    fn test_feature_set_rejects_reserved() {
        assert!(FeatureSet::new(["a,b"]).is_err());
        assert!(FeatureSet::new(["day"]).is_err());
    }

    #[test]
    fn test_representation_column() {
        assert_eq!(
            FeatureSet::representation_column("session_count", 14),
            "session_count_mean_14d"
        );
    }

    #[test]
    fn test_zero_windows_invalid() {
        assert!(PipelineConfig::new(features()).with_window_size(0).validate().is_err());
        assert!(PipelineConfig::new(features()).with_reference_window(0).validate().is_err());
        assert!(PipelineConfig::new(features()).with_current_window(0).validate().is_err());
    }

    #[test]
    fn test_bad_epsilon_invalid() {
        assert!(PipelineConfig::new(features()).with_epsilon(-1.0).validate().is_err());
        assert!(PipelineConfig::new(features()).with_epsilon(f64::NAN).validate().is_err());
        // Zero would divide by zero on an all-zero reference.
        assert!(PipelineConfig::new(features()).with_epsilon(0.0).validate().is_err());
        assert!(PipelineConfig::new(features()).with_epsilon(1e-12).validate().is_ok());
    }

    #[test]
    fn test_json_defaults_fill_in() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"features": ["x", "y"], "top_k": 1}"#).unwrap();
        assert_eq!(config.features.names(), ["x", "y"]);
        assert_eq!(config.top_k, 1);
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.gap_policy, GapPolicy::Allow);
    }

    #[test]
    fn test_json_rejects_duplicate_features() {
        let result: Result<PipelineConfig, _> =
            serde_json::from_str(r#"{"features": ["x", "x"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"features": ["x"], "window_size": 7, "gap_policy": "reject"}"#,
        )
        .unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.window_size, 7);
        assert_eq!(config.gap_policy, GapPolicy::Reject);
    }
}
