//! Read-time lookups over persisted drift scores and explanations.
//!
//! Nothing here is stored: strongest day, onset, and summaries are all
//! aggregated on demand from the two output tables.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{DriftError, DriftResult, DriftScore, Explanation};

/// Default score threshold for onset detection.
pub const DEFAULT_ONSET_THRESHOLD: f64 = 0.15;

/// Default number of consecutive days above threshold for onset detection.
pub const DEFAULT_ONSET_RUN_LENGTH: usize = 3;

/// Threshold and run length defining drift onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnsetRule {
    pub threshold: f64,
    pub run_length: usize,
}

impl Default for OnsetRule {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ONSET_THRESHOLD,
            run_length: DEFAULT_ONSET_RUN_LENGTH,
        }
    }
}

/// The day with the largest summed |contribution| and its explanation rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongestDay {
    pub entity_id: String,
    pub day: u32,
    pub total_contribution: f64,
    pub explanations: Vec<Explanation>,
}

/// Per-entity score statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub days_scored: usize,
    pub mean_score: f64,
    pub max_score: f64,
    pub peak_day: u32,
    pub latest: DriftScore,
    pub onset_day: Option<u32>,
}

#[derive(Debug, Default)]
struct EntityRows {
    scores: Vec<DriftScore>,
    explanations: Vec<Explanation>,
}

/// In-memory index of drift output tables keyed by entity.
#[derive(Debug, Default)]
pub struct DriftIndex {
    order: Vec<String>,
    entities: HashMap<String, EntityRows>,
}

impl DriftIndex {
    pub fn new(scores: Vec<DriftScore>, explanations: Vec<Explanation>) -> Self {
        let mut index = Self::default();

        for score in scores {
            index.slot(&score.entity_id).scores.push(score);
        }
        for explanation in explanations {
            index.slot(&explanation.entity_id).explanations.push(explanation);
        }
        for rows in index.entities.values_mut() {
            rows.scores.sort_by_key(|s| s.day);
        }

        index
    }

    fn slot(&mut self, entity_id: &str) -> &mut EntityRows {
        if !self.entities.contains_key(entity_id) {
            self.order.push(entity_id.to_string());
        }
        self.entities.entry(entity_id.to_string()).or_default()
    }

    /// Entity ids in first-appearance order.
    pub fn entities(&self) -> &[String] {
        &self.order
    }

    pub fn entity_count(&self) -> usize {
        self.order.len()
    }

    /// Full drift score timeline, ordered by day.
    pub fn timeline(&self, entity_id: &str) -> DriftResult<&[DriftScore]> {
        match self.entities.get(entity_id) {
            Some(rows) if !rows.scores.is_empty() => Ok(&rows.scores),
            _ => Err(DriftError::UnknownEntity(entity_id.to_string())),
        }
    }

    /// Score on the most recent scored day.
    pub fn latest(&self, entity_id: &str) -> DriftResult<&DriftScore> {
        self.timeline(entity_id)?
            .last()
            .ok_or_else(|| DriftError::UnknownEntity(entity_id.to_string()))
    }

    /// Day whose explanation rows have the largest summed |contribution|.
    ///
    /// Ties go to the earliest day.
    pub fn strongest_explanation(&self, entity_id: &str) -> DriftResult<StrongestDay> {
        let rows = match self.entities.get(entity_id) {
            Some(rows) if !rows.explanations.is_empty() => &rows.explanations,
            _ => return Err(DriftError::UnknownEntity(entity_id.to_string())),
        };

        let mut totals: BTreeMap<u32, f64> = BTreeMap::new();
        for e in rows {
            *totals.entry(e.day).or_insert(0.0) += e.contribution.abs();
        }

        // Ascending day order, so only a strictly larger total displaces the earlier day.
        let mut best: Option<(u32, f64)> = None;
        for (&day, &total) in &totals {
            if best.map_or(true, |(_, top)| total > top) {
                best = Some((day, total));
            }
        }
        let Some(best) = best else {
            return Err(DriftError::UnknownEntity(entity_id.to_string()));
        };

        Ok(StrongestDay {
            entity_id: entity_id.to_string(),
            day: best.0,
            total_contribution: best.1,
            explanations: rows.iter().filter(|e| e.day == best.0).cloned().collect(),
        })
    }

    /// First day starting a run of `run_length` consecutive scores above the threshold.
    pub fn onset(&self, entity_id: &str, rule: OnsetRule) -> DriftResult<Option<u32>> {
        Ok(detect_onset(self.timeline(entity_id)?, rule))
    }

    /// Count, mean, peak, latest, and onset of one entity's scores.
    pub fn summary(&self, entity_id: &str, rule: OnsetRule) -> DriftResult<EntitySummary> {
        let timeline = self.timeline(entity_id)?;
        let latest = self.latest(entity_id)?.clone();

        let mut peak = &timeline[0];
        let mut sum = 0.0;
        for s in timeline {
            sum += s.drift_score;
            if s.drift_score > peak.drift_score {
                peak = s;
            }
        }

        Ok(EntitySummary {
            entity_id: entity_id.to_string(),
            days_scored: timeline.len(),
            mean_score: sum / timeline.len() as f64,
            max_score: peak.drift_score,
            peak_day: peak.day,
            latest,
            onset_day: detect_onset(timeline, rule),
        })
    }
}

/// Onset over an already day-ordered timeline.
///
/// A run length of zero is treated as one.
pub fn detect_onset(timeline: &[DriftScore], rule: OnsetRule) -> Option<u32> {
    let run = rule.run_length.max(1);
    let mut streak = 0usize;
    for (i, s) in timeline.iter().enumerate() {
        if s.drift_score > rule.threshold {
            streak += 1;
            if streak == run {
                return Some(timeline[i + 1 - run].day);
            }
        } else {
            streak = 0;
        }
    }
    None
}
