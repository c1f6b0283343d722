//! Per-feature drift attribution.
//!
//! For each scored day the explainer recomputes the same reference/current
//! window means as the scorer, turns the per-feature difference into a signed
//! relative change, and keeps the `top_k` largest by magnitude.

use crate::config::{FeatureSet, PipelineConfig};
use crate::types::{Direction, Explanation, Representation};
use crate::window::{mean_vector, WindowSpec};

/// Signed relative change per feature: `(cur − ref) / (|ref| + ε)`.
pub fn contributions(mu_ref: &[f64], mu_cur: &[f64], epsilon: f64) -> Vec<f64> {
    mu_ref
        .iter()
        .zip(mu_cur.iter())
        .map(|(r, c)| (c - r) / (r.abs() + epsilon))
        .collect()
}

/// Indices of the `k` largest contributions by absolute value.
///
/// The sort is stable, so equal magnitudes keep feature-list order.
pub fn rank_top_k(contributions: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..contributions.len()).collect();
    order.sort_by(|&a, &b| contributions[b].abs().total_cmp(&contributions[a].abs()));
    order.truncate(k);
    order
}

/// Emits the top contributing features for each scored day.
#[derive(Debug, Clone)]
pub struct DriftExplainer {
    features: FeatureSet,
    windows: WindowSpec,
    epsilon: f64,
    top_k: usize,
}

impl DriftExplainer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            features: config.features.clone(),
            windows: WindowSpec::from_config(config),
            epsilon: config.epsilon,
            top_k: config.top_k,
        }
    }

    /// Explain the given scored days of one entity.
    ///
    /// `representations` must be sorted by day. Days without a matching
    /// representation, or whose reference window would start before the
    /// first row, are skipped.
    pub fn explain_entity(
        &self,
        representations: &[Representation],
        scored_days: &[u32],
    ) -> Vec<Explanation> {
        if self.top_k == 0 {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(scored_days.len() * self.top_k.min(self.features.len()));
        for &day in scored_days {
            let Ok(index) = representations.binary_search_by_key(&day, |r| r.day) else {
                tracing::debug!("No representation for scored day {day}; skipping");
                continue;
            };
            out.extend(self.explain_index(representations, index));
        }
        out
    }

    /// Explanation rows for the windows ending at `index`, if both fit.
    pub fn explain_index(&self, representations: &[Representation], index: usize) -> Vec<Explanation> {
        let Some(bounds) = self.windows.bounds(index) else {
            return Vec::new();
        };
        if bounds.current.end > representations.len() {
            return Vec::new();
        }

        let dim = self.features.len();
        let mu_ref = mean_vector(
            representations[bounds.reference].iter().map(|r| r.values.as_slice()),
            dim,
        );
        let mu_cur = mean_vector(
            representations[bounds.current].iter().map(|r| r.values.as_slice()),
            dim,
        );

        let row = &representations[index];
        self.select(&row.entity_id, row.day, &mu_ref, &mu_cur)
    }

    /// Rank contributions between two mean vectors and build explanation rows.
    pub(crate) fn select(
        &self,
        entity_id: &str,
        day: u32,
        mu_ref: &[f64],
        mu_cur: &[f64],
    ) -> Vec<Explanation> {
        let contribs = contributions(mu_ref, mu_cur, self.epsilon);
        rank_top_k(&contribs, self.top_k)
            .into_iter()
            .filter_map(|f| {
                let feature = self.features.get(f)?;
                let contribution = contribs[f];
                Some(Explanation {
                    entity_id: entity_id.to_string(),
                    day,
                    feature: feature.to_string(),
                    contribution,
                    direction: Direction::from_contribution(contribution),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(top_k: usize) -> PipelineConfig {
        PipelineConfig::new(FeatureSet::new(["a", "b", "c", "d"]).unwrap())
            .with_reference_window(4)
            .with_current_window(2)
            .with_top_k(top_k)
    }

    fn reps(rows: &[[f64; 4]]) -> Vec<Representation> {
        rows.iter()
            .enumerate()
            .map(|(i, v)| Representation {
                entity_id: "u1".to_string(),
                day: 100 + i as u32,
                values: v.to_vec(),
            })
            .collect()
    }

    #[test]
    fn test_contributions_signed_relative() {
        let c = contributions(&[2.0, -4.0, 0.0], &[3.0, -2.0, 0.0], 0.0);
        assert_eq!(c[0], 0.5);
        assert_eq!(c[1], 0.5);
        assert!(c[2].is_nan());

        let c = contributions(&[0.0], &[0.0], 1e-8);
        assert_eq!(c[0], 0.0);
    }

    #[test]
    fn test_rank_by_magnitude() {
        let order = rank_top_k(&[0.1, -0.9, 0.5, 0.3], 3);
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_rank_ties_keep_feature_order() {
        let order = rank_top_k(&[0.2, -0.5, 0.5, 0.2], 4);
        assert_eq!(order, vec![1, 2, 0, 3]);

        let order = rank_top_k(&[0.0, 0.0, 0.0], 2);
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_rank_k_larger_than_features() {
        assert_eq!(rank_top_k(&[1.0, 2.0], 5), vec![1, 0]);
        assert!(rank_top_k(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_explain_step_change() {
        let mut rows = vec![[1.0, 1.0, 1.0, 1.0]; 4];
        rows.extend(vec![[1.0, 3.0, 0.5, 1.1]; 2]);
        let reps = reps(&rows);
        let explainer = DriftExplainer::new(&config(3));
        let out = explainer.explain_entity(&reps, &[105]);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].feature, "b");
        assert!((out[0].contribution - 2.0).abs() < 1e-6);
        assert_eq!(out[0].direction, Direction::Increase);
        assert_eq!(out[1].feature, "c");
        assert_eq!(out[1].direction, Direction::Decrease);
        assert_eq!(out[2].feature, "d");
        assert!(out.iter().all(|e| e.day == 105 && e.entity_id == "u1"));
    }

    #[test]
    fn test_skips_days_without_full_reference() {
        let reps = reps(&vec![[1.0, 1.0, 1.0, 1.0]; 6]);
        let explainer = DriftExplainer::new(&config(2));
        assert!(explainer.explain_entity(&reps, &[104]).is_empty());
        assert_eq!(explainer.explain_entity(&reps, &[105]).len(), 2);
    }

    #[test]
    fn test_skips_unknown_day() {
        let reps = reps(&vec![[1.0, 1.0, 1.0, 1.0]; 6]);
        let explainer = DriftExplainer::new(&config(2));
        assert!(explainer.explain_entity(&reps, &[999]).is_empty());
    }

    #[test]
    fn test_zero_contribution_direction() {
        let reps = reps(&vec![[1.0, 2.0, 3.0, 4.0]; 6]);
        let out = DriftExplainer::new(&config(4)).explain_entity(&reps, &[105]);
        assert_eq!(out.len(), 4);
        let names: Vec<_> = out.iter().map(|e| e.feature.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        assert!(out
            .iter()
            .all(|e| e.contribution == 0.0 && e.direction == Direction::Decrease));
    }

    #[test]
    fn test_all_zero_features_contribute_zero() {
        let reps = reps(&vec![[0.0, 0.0, 0.0, 0.0]; 6]);
        let out = DriftExplainer::new(&config(4)).explain_entity(&reps, &[105]);
        assert_eq!(out.len(), 4);
        assert!(out
            .iter()
            .all(|e| e.contribution == 0.0 && e.direction == Direction::Decrease));
    }

    #[test]
    fn test_top_k_zero_emits_nothing() {
        let reps = reps(&vec![[1.0, 2.0, 3.0, 4.0]; 6]);
        assert!(DriftExplainer::new(&config(0)).explain_entity(&reps, &[105]).is_empty());
    }
}
