//! Opening the scores and explanations tables from a data directory.

use std::path::Path;

use behavior_drift::table::{EXPLANATIONS_FILE, SCORES_FILE};
use behavior_drift::{DriftIndex, TableReader};

use crate::types::{ServiceError, ServiceResult};

/// Read-only view over one data directory's drift output.
#[derive(Debug)]
pub struct DriftStore {
    index: DriftIndex,
    has_explanations: bool,
}

impl DriftStore {
    /// Load `drift_scores.csv` and, when present, `drift_explanations.csv` from `data_dir`.
    pub fn open(data_dir: &Path) -> ServiceResult<Self> {
        let scores_path = data_dir.join(SCORES_FILE);
        if !scores_path.exists() {
            return Err(missing_table(&scores_path, "score"));
        }
        let scores = TableReader::read_scores_file(&scores_path)?;

        let explanations_path = data_dir.join(EXPLANATIONS_FILE);
        let has_explanations = explanations_path.exists();
        let explanations = if has_explanations {
            TableReader::read_explanations_file(&explanations_path)?
        } else {
            tracing::warn!(
                "No explanations table at {}; explanation lookups are unavailable",
                explanations_path.display()
            );
            Vec::new()
        };

        let index = DriftIndex::new(scores, explanations);
        tracing::info!(
            "Opened drift store at {} with {} entities",
            data_dir.display(),
            index.entity_count()
        );

        Ok(Self {
            index,
            has_explanations,
        })
    }

    /// Wrap an already-built index that includes explanations.
    pub fn from_index(index: DriftIndex) -> Self {
        Self {
            index,
            has_explanations: true,
        }
    }

    pub fn index(&self) -> &DriftIndex {
        &self.index
    }

    /// Fails when the explanations table was not found at open time.
    pub fn require_explanations(&self) -> ServiceResult<()> {
        if self.has_explanations {
            Ok(())
        } else {
            Err(missing_table(Path::new(EXPLANATIONS_FILE), "explain"))
        }
    }
}

fn missing_table(path: &Path, stage: &str) -> ServiceError {
    ServiceError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("Missing table {}; run the {stage} stage first", path.display()),
    ))
}
