//! Append-only per-entity tracking with bounded ring buffers.
//!
//! [`EntityTracker`] keeps the last `W` observations and the last `R + C`
//! representations of one entity, so each new day costs one window of work
//! instead of a full recomputation. It shares the mean and window functions
//! with the batch stages, which keeps its rows identical to a batch run over
//! the same history.

use std::collections::VecDeque;

use crate::config::{FeatureSet, GapPolicy, PipelineConfig};
use crate::drift::drift_score;
use crate::explain::DriftExplainer;
use crate::types::{DriftError, DriftResult, DriftScore, Explanation, Representation};
use crate::window::{mean_vector, WindowSpec};

/// Rows produced by pushing one observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerStep {
    pub representation: Option<Representation>,
    pub score: Option<DriftScore>,
    pub explanations: Vec<Explanation>,
}

/// Incremental drift state for a single entity.
#[derive(Debug, Clone)]
pub struct EntityTracker {
    entity_id: String,
    features: FeatureSet,
    window_size: usize,
    windows: WindowSpec,
    epsilon: f64,
    gap_policy: GapPolicy,
    explainer: DriftExplainer,
    observations: VecDeque<Vec<f64>>,
    representations: VecDeque<Vec<f64>>,
    last_day: Option<u32>,
}

impl EntityTracker {
    pub fn new(entity_id: impl Into<String>, config: &PipelineConfig) -> DriftResult<Self> {
        config.validate()?;
        let windows = WindowSpec::from_config(config);
        Ok(Self {
            entity_id: entity_id.into(),
            features: config.features.clone(),
            window_size: config.window_size,
            windows,
            epsilon: config.epsilon,
            gap_policy: config.gap_policy,
            explainer: DriftExplainer::new(config),
            observations: VecDeque::with_capacity(config.window_size),
            representations: VecDeque::with_capacity(windows.span()),
            last_day: None,
        })
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn last_day(&self) -> Option<u32> {
        self.last_day
    }

    /// Append the next day's observation and return whatever it completes.
    pub fn push(&mut self, day: u32, values: Vec<f64>) -> DriftResult<TrackerStep> {
        if values.len() != self.features.len() {
            return Err(DriftError::MalformedInput(format!(
                "entity '{}' day {day}: {} feature values, expected {}",
                self.entity_id,
                values.len(),
                self.features.len()
            )));
        }
        if let Some(prev) = self.last_day {
            if day <= prev {
                return Err(DriftError::MalformedInput(format!(
                    "entity '{}': day {day} follows day {prev}; days must be strictly increasing",
                    self.entity_id
                )));
            }
            if day - prev > 1 && self.gap_policy == GapPolicy::Reject {
                return Err(DriftError::MalformedInput(format!(
                    "entity '{}': gap between day {prev} and day {day}",
                    self.entity_id
                )));
            }
        }
        self.last_day = Some(day);

        push_bounded(&mut self.observations, values, self.window_size);
        if self.observations.len() < self.window_size {
            return Ok(TrackerStep::default());
        }

        let dim = self.features.len();
        let rep_values = mean_vector(self.observations.iter().map(Vec::as_slice), dim);
        push_bounded(&mut self.representations, rep_values.clone(), self.windows.span());
        let representation = Representation {
            entity_id: self.entity_id.clone(),
            day,
            values: rep_values,
        };

        if self.representations.len() < self.windows.span() {
            return Ok(TrackerStep {
                representation: Some(representation),
                ..TrackerStep::default()
            });
        }

        // The buffer holds exactly R + C rows, so its last index is where both windows end.
        let Some(bounds) = self.windows.bounds(self.representations.len() - 1) else {
            return Ok(TrackerStep {
                representation: Some(representation),
                ..TrackerStep::default()
            });
        };
        let mu_ref = mean_vector(
            self.representations.range(bounds.reference).map(Vec::as_slice),
            dim,
        );
        let mu_cur = mean_vector(
            self.representations.range(bounds.current).map(Vec::as_slice),
            dim,
        );

        let score = DriftScore {
            entity_id: self.entity_id.clone(),
            day,
            drift_score: drift_score(&mu_ref, &mu_cur, self.epsilon),
        };
        let explanations = self.explainer.select(&self.entity_id, day, &mu_ref, &mu_cur);

        Ok(TrackerStep {
            representation: Some(representation),
            score: Some(score),
            explanations,
        })
    }
}

fn push_bounded(buf: &mut VecDeque<Vec<f64>>, value: Vec<f64>, capacity: usize) {
    if buf.len() == capacity {
        buf.pop_front();
    }
    buf.push_back(value);
}
