//! Reference-vs-current window drift scoring.

use crate::config::PipelineConfig;
use crate::types::{DriftScore, Representation};
use crate::window::{l2_distance, l2_norm, mean_vector, WindowSpec};

/// Normalized drift between two mean vectors: `‖cur − ref‖ / (‖ref‖ + ε)`.
///
/// Not symmetric: only the reference magnitude normalizes. A zero reference
/// saturates towards `‖cur‖ / ε`.
pub fn drift_score(mu_ref: &[f64], mu_cur: &[f64], epsilon: f64) -> f64 {
    l2_distance(mu_cur, mu_ref) / (l2_norm(mu_ref) + epsilon)
}

/// Scores every representation index that has a full reference and current window.
#[derive(Debug, Clone)]
pub struct DriftScorer {
    windows: WindowSpec,
    epsilon: f64,
    dim: usize,
}

impl DriftScorer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            windows: WindowSpec::from_config(config),
            epsilon: config.epsilon,
            dim: config.features.len(),
        }
    }

    /// Score one entity's representations (sorted by day).
    ///
    /// Entities with fewer than `R + C` representations yield nothing.
    pub fn score_entity(&self, representations: &[Representation]) -> Vec<DriftScore> {
        if representations.len() < self.windows.span() {
            return Vec::new();
        }

        (self.windows.first_index()..representations.len())
            .filter_map(|i| {
                let bounds = self.windows.bounds(i)?;
                let mu_ref = mean_vector(
                    representations[bounds.reference].iter().map(|r| r.values.as_slice()),
                    self.dim,
                );
                let mu_cur = mean_vector(
                    representations[bounds.current].iter().map(|r| r.values.as_slice()),
                    self.dim,
                );

                let row = &representations[i];
                if l2_norm(&mu_ref) == 0.0 {
                    tracing::debug!(
                        "Degenerate reference for {} on day {}: score saturates on epsilon",
                        row.entity_id,
                        row.day
                    );
                }

                Some(DriftScore {
                    entity_id: row.entity_id.clone(),
                    day: row.day,
                    drift_score: drift_score(&mu_ref, &mu_cur, self.epsilon),
                })
            })
            .collect()
    }
}
