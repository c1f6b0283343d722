//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use behavior_drift::config::DEFAULT_WINDOW_SIZE;
use behavior_drift::{DriftError, FeatureSet, GapPolicy, PipelineConfig};

use crate::types::{ServiceError, ServiceResult};

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "BEHAVIOR_DRIFT_DATA_DIR";

const DEFAULT_DATA_DIR: &str = "data";

/// Resolve the directory holding the pipeline output tables.
pub fn resolve_data_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(DATA_DIR_ENV) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    PathBuf::from(DEFAULT_DATA_DIR)
}

/// Pipeline parameters given on the command line.
///
/// Flags win over the JSON config file, which wins over the built-in defaults.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PipelineOverrides {
    /// JSON pipeline configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated feature columns, in order.
    #[arg(long, value_delimiter = ',')]
    pub features: Option<Vec<String>>,

    /// Rolling window size W in days.
    #[arg(long)]
    pub window: Option<usize>,

    /// Reference window R in representation rows.
    #[arg(long)]
    pub reference: Option<usize>,

    /// Current window C in representation rows.
    #[arg(long)]
    pub current: Option<usize>,

    /// Stabilizing constant added to denominators.
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// Number of explanation rows per scored day.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Fail on missing calendar days instead of warning.
    #[arg(long)]
    pub reject_gaps: bool,
}

impl PipelineOverrides {
    /// Read the JSON config file, if any, once for the whole command.
    pub fn load(&self) -> ServiceResult<PipelineDraft<'_>> {
        let file = self.config.as_deref().map(load_config_file).transpose()?;
        Ok(PipelineDraft {
            overrides: self,
            file,
        })
    }
}

/// Command-line overrides paired with the already-loaded config file.
#[derive(Debug, Clone)]
pub struct PipelineDraft<'a> {
    overrides: &'a PipelineOverrides,
    file: Option<PipelineConfig>,
}

impl PipelineDraft<'_> {
    /// Feature list known before any table is read, if any.
    pub fn known_features(&self) -> ServiceResult<Option<FeatureSet>> {
        if let Some(names) = &self.overrides.features {
            return Ok(Some(FeatureSet::new(names.iter().map(|n| n.trim()))?));
        }
        Ok(self.file.as_ref().map(|c| c.features.clone()))
    }

    /// Effective rolling window size.
    pub fn window_size(&self) -> usize {
        self.overrides.window.unwrap_or_else(|| {
            self.file
                .as_ref()
                .map_or(DEFAULT_WINDOW_SIZE, |c| c.window_size)
        })
    }

    /// Full configuration for the given feature list.
    pub fn resolve(&self, features: FeatureSet) -> ServiceResult<PipelineConfig> {
        let o = self.overrides;
        let mut config = match &self.file {
            Some(c) => PipelineConfig {
                features,
                ..c.clone()
            },
            None => PipelineConfig::new(features),
        };

        if let Some(w) = o.window {
            config.window_size = w;
        }
        if let Some(r) = o.reference {
            config.reference_window = r;
        }
        if let Some(c) = o.current {
            config.current_window = c;
        }
        if let Some(e) = o.epsilon {
            config.epsilon = e;
        }
        if let Some(k) = o.top_k {
            config.top_k = k;
        }
        if o.reject_gaps {
            config.gap_policy = GapPolicy::Reject;
        }

        config.validate()?;
        Ok(config)
    }
}

fn load_config_file(path: &Path) -> ServiceResult<PipelineConfig> {
    tracing::info!("Loading pipeline config from {}", path.display());
    PipelineConfig::from_json_file(path).map_err(|e| match e {
        DriftError::Io(io) => ServiceError::Io(std::io::Error::new(
            io.kind(),
            format!("Failed to read config {}: {io}", path.display()),
        )),
        other => other.into(),
    })
}
