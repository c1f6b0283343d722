//! Rolling-window behavioral representations.

use crate::config::{FeatureSet, PipelineConfig};
use crate::types::{Observation, Representation};
use crate::window::mean_vector;

/// Turns one entity's daily observations into trailing-mean vectors.
#[derive(Debug, Clone)]
pub struct RepresentationBuilder {
    features: FeatureSet,
    window_size: usize,
}

impl RepresentationBuilder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            features: config.features.clone(),
            window_size: config.window_size,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Build representations for one entity.
    ///
    /// `observations` must belong to a single entity and be sorted by day.
    /// Windows are positional: the trailing `window_size` rows, whatever the
    /// calendar distance between them. Fewer rows than the window yield an
    /// empty result.
    pub fn build_entity(&self, observations: &[Observation]) -> Vec<Representation> {
        let w = self.window_size;
        if w == 0 || observations.len() < w {
            return Vec::new();
        }

        let dim = self.features.len();
        (w - 1..observations.len())
            .map(|i| {
                let window = &observations[i + 1 - w..=i];
                let current = &observations[i];
                Representation {
                    entity_id: current.entity_id.clone(),
                    day: current.day,
                    values: mean_vector(window.iter().map(|o| o.values.as_slice()), dim),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(day: u32, values: Vec<f64>) -> Observation {
        Observation {
            entity_id: "u1".to_string(),
            day,
            values,
        }
    }

    fn builder(window: usize) -> RepresentationBuilder {
        let features = FeatureSet::new(["a", "b"]).unwrap();
        RepresentationBuilder::new(&PipelineConfig::new(features).with_window_size(window))
    }

    #[test]
    fn test_row_count() {
        let series: Vec<_> = (0..20).map(|d| obs(d, vec![d as f64, 1.0])).collect();
        let reps = builder(14).build_entity(&series);
        assert_eq!(reps.len(), 20 - 14 + 1);
        assert_eq!(reps[0].day, 13);
        assert_eq!(reps.last().unwrap().day, 19);
    }

    #[test]
    fn test_trailing_mean() {
        let series: Vec<_> = (0..5).map(|d| obs(d, vec![d as f64, 10.0 * d as f64])).collect();
        let reps = builder(3).build_entity(&series);
        assert_eq!(reps.len(), 3);
        // days 0,1,2 -> 1.0; days 2,3,4 -> 3.0
        assert_eq!(reps[0].values, vec![1.0, 10.0]);
        assert_eq!(reps[2].values, vec![3.0, 30.0]);
    }

    #[test]
    fn test_insufficient_history() {
        let series: Vec<_> = (0..13).map(|d| obs(d, vec![1.0, 1.0])).collect();
        assert!(builder(14).build_entity(&series).is_empty());
        assert!(builder(14).build_entity(&[]).is_empty());
    }

    #[test]
    fn test_positional_windows_ignore_gaps() {
        let series = vec![
            obs(0, vec![1.0, 0.0]),
            obs(5, vec![3.0, 0.0]),
            obs(40, vec![5.0, 0.0]),
        ];
        let reps = builder(2).build_entity(&series);
        assert_eq!(reps.len(), 2);
        assert_eq!(reps[0].day, 5);
        assert_eq!(reps[0].values[0], 2.0);
        assert_eq!(reps[1].day, 40);
        assert_eq!(reps[1].values[0], 4.0);
    }

    #[test]
    fn test_window_of_one_is_identity() {
        let series: Vec<_> = (0..4).map(|d| obs(d, vec![d as f64 * 0.5, 2.0])).collect();
        let reps = builder(1).build_entity(&series);
        assert_eq!(reps.len(), 4);
        for (r, o) in reps.iter().zip(series.iter()) {
            assert_eq!(r.values, o.values);
            assert_eq!(r.day, o.day);
        }
    }
}
