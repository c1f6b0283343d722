//! Batch pipeline: group rows per entity, run each stage in parallel, merge.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::config::{GapPolicy, PipelineConfig};
use crate::drift::DriftScorer;
use crate::explain::DriftExplainer;
use crate::representation::RepresentationBuilder;
use crate::types::{
    DriftError, DriftResult, DriftScore, Explanation, Observation, PipelineOutput, Representation,
};

/// Rows that carry an entity key and a day.
pub trait Keyed {
    fn entity_id(&self) -> &str;
    fn day(&self) -> u32;
}

impl Keyed for Observation {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }
    fn day(&self) -> u32 {
        self.day
    }
}

impl Keyed for Representation {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }
    fn day(&self) -> u32 {
        self.day
    }
}

impl Keyed for DriftScore {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }
    fn day(&self) -> u32 {
        self.day
    }
}

impl Keyed for Explanation {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }
    fn day(&self) -> u32 {
        self.day
    }
}

/// One entity's rows, in input order.
#[derive(Debug, Clone)]
pub struct EntitySeries<T> {
    pub entity_id: String,
    pub rows: Vec<T>,
}

/// Group rows by entity, keeping entities in first-appearance order.
pub fn group_by_entity<T: Keyed + Clone>(rows: &[T]) -> Vec<EntitySeries<T>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<EntitySeries<T>> = Vec::new();

    for row in rows {
        let slot = *index.entry(row.entity_id()).or_insert_with(|| {
            groups.push(EntitySeries {
                entity_id: row.entity_id().to_string(),
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(row.clone());
    }

    groups
}

/// Check that an entity's days are strictly increasing (and contiguous under `Reject`).
pub fn validate_days<T: Keyed>(series: &EntitySeries<T>, gap_policy: GapPolicy) -> DriftResult<()> {
    let mut gaps = 0usize;
    for pair in series.rows.windows(2) {
        let (prev, next) = (pair[0].day(), pair[1].day());
        if next <= prev {
            return Err(DriftError::MalformedInput(format!(
                "entity '{}': day {next} follows day {prev}; days must be strictly increasing",
                series.entity_id
            )));
        }
        if next - prev > 1 {
            if gap_policy == GapPolicy::Reject {
                return Err(DriftError::MalformedInput(format!(
                    "entity '{}': gap between day {prev} and day {next}",
                    series.entity_id
                )));
            }
            gaps += 1;
        }
    }

    if gaps > 0 {
        tracing::warn!(
            "Entity '{}' has {gaps} day gap(s); windows stay positional",
            series.entity_id
        );
    }
    Ok(())
}

/// The three drift stages built from one configuration.
#[derive(Debug, Clone)]
pub struct DriftPipeline {
    config: PipelineConfig,
    builder: RepresentationBuilder,
    scorer: DriftScorer,
    explainer: DriftExplainer,
}

impl DriftPipeline {
    /// Validate the configuration and construct each stage from it.
    pub fn new(config: PipelineConfig) -> DriftResult<Self> {
        config.validate()?;
        Ok(Self {
            builder: RepresentationBuilder::new(&config),
            scorer: DriftScorer::new(&config),
            explainer: DriftExplainer::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 1: observations to representations.
    pub fn build_representations(
        &self,
        observations: &[Observation],
    ) -> DriftResult<Vec<Representation>> {
        self.check_width(observations.iter().map(|o| (o.values.len(), &o.entity_id, o.day)))?;
        let groups = self.grouped(observations)?;

        let chunks: Vec<Vec<Representation>> = groups
            .par_iter()
            .map(|g| self.builder.build_entity(&g.rows))
            .collect();

        let short = chunks.iter().filter(|c| c.is_empty()).count();
        let out: Vec<Representation> = chunks.into_iter().flatten().collect();
        tracing::info!(
            "Built {} representations for {} entities ({} with insufficient history)",
            out.len(),
            groups.len(),
            short
        );
        Ok(out)
    }

    /// Stage 2: representations to drift scores.
    pub fn score(&self, representations: &[Representation]) -> DriftResult<Vec<DriftScore>> {
        self.check_width(representations.iter().map(|r| (r.values.len(), &r.entity_id, r.day)))?;
        let groups = self.grouped(representations)?;

        let chunks: Vec<Vec<DriftScore>> = groups
            .par_iter()
            .map(|g| self.scorer.score_entity(&g.rows))
            .collect();

        let short = chunks.iter().filter(|c| c.is_empty()).count();
        let out: Vec<DriftScore> = chunks.into_iter().flatten().collect();
        tracing::info!(
            "Computed {} drift scores for {} entities ({} with insufficient history)",
            out.len(),
            groups.len(),
            short
        );
        Ok(out)
    }

    /// Stage 3: explain the days present in `scores`.
    pub fn explain(
        &self,
        representations: &[Representation],
        scores: &[DriftScore],
    ) -> DriftResult<Vec<Explanation>> {
        self.check_width(representations.iter().map(|r| (r.values.len(), &r.entity_id, r.day)))?;
        let groups = self.grouped(representations)?;

        let mut scored_days: HashMap<&str, Vec<u32>> = HashMap::new();
        for s in scores {
            scored_days.entry(s.entity_id.as_str()).or_default().push(s.day);
        }

        let chunks: Vec<Vec<Explanation>> = groups
            .par_iter()
            .map(|g| match scored_days.get(g.entity_id.as_str()) {
                Some(days) => self.explainer.explain_entity(&g.rows, days),
                None => Vec::new(),
            })
            .collect();

        let out: Vec<Explanation> = chunks.into_iter().flatten().collect();
        tracing::info!(
            "Generated {} explanations for {} scored entities",
            out.len(),
            scored_days.len()
        );
        Ok(out)
    }

    /// Run all three stages.
    pub fn run(&self, observations: &[Observation]) -> DriftResult<PipelineOutput> {
        let representations = self.build_representations(observations)?;
        let scores = self.score(&representations)?;
        let explanations = self.explain(&representations, &scores)?;
        Ok(PipelineOutput {
            representations,
            scores,
            explanations,
        })
    }

    fn grouped<T: Keyed + Clone + Sync>(&self, rows: &[T]) -> DriftResult<Vec<EntitySeries<T>>> {
        let groups = group_by_entity(rows);
        for g in &groups {
            validate_days(g, self.config.gap_policy)?;
        }
        Ok(groups)
    }

    fn check_width<'a, I>(&self, rows: I) -> DriftResult<()>
    where
        I: IntoIterator<Item = (usize, &'a String, u32)>,
    {
        let expected = self.config.features.len();
        for (width, entity_id, day) in rows {
            if width != expected {
                return Err(DriftError::MalformedInput(format!(
                    "entity '{entity_id}' day {day}: {width} feature values, expected {expected}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureSet;

    fn obs(entity: &str, day: u32, v: f64) -> Observation {
        Observation {
            entity_id: entity.to_string(),
            day,
            values: vec![v],
        }
    }

    fn pipeline() -> DriftPipeline {
        let config = PipelineConfig::new(FeatureSet::new(["x"]).unwrap())
            .with_window_size(2)
            .with_reference_window(3)
            .with_current_window(2)
            .with_top_k(1);
        DriftPipeline::new(config).unwrap()
    }

    #[test]
    fn test_group_preserves_first_appearance() {
        let rows = vec![obs("b", 0, 1.0), obs("a", 0, 1.0), obs("b", 1, 1.0)];
        let groups = group_by_entity(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].entity_id, "b");
        assert_eq!(groups[0].rows.len(), 2);
        assert_eq!(groups[1].entity_id, "a");
    }

    #[test]
    fn test_rejects_out_of_order_days() {
        let rows = vec![obs("a", 1, 1.0), obs("a", 0, 1.0)];
        let err = pipeline().build_representations(&rows).unwrap_err();
        assert!(matches!(err, DriftError::MalformedInput(_)));
    }

    #[test]
    fn test_rejects_duplicate_days() {
        let rows = vec![obs("a", 3, 1.0), obs("a", 3, 2.0)];
        assert!(pipeline().build_representations(&rows).is_err());
    }

    #[test]
    fn test_gap_policy() {
        let rows = vec![obs("a", 0, 1.0), obs("a", 2, 1.0), obs("a", 3, 1.0)];
        assert!(pipeline().build_representations(&rows).is_ok());

        let strict = PipelineConfig::new(FeatureSet::new(["x"]).unwrap())
            .with_gap_policy(GapPolicy::Reject);
        let err = DriftPipeline::new(strict).unwrap().build_representations(&rows);
        assert!(matches!(err, Err(DriftError::MalformedInput(_))));
    }

    #[test]
    fn test_rejects_wrong_width() {
        let mut row = obs("a", 0, 1.0);
        row.values.push(2.0);
        assert!(pipeline().build_representations(&[row]).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::new(FeatureSet::new(["x"]).unwrap()).with_window_size(0);
        assert!(matches!(
            DriftPipeline::new(config),
            Err(DriftError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_short_entity_contributes_nothing() {
        let mut rows: Vec<_> = (0..10).map(|d| obs("long", d, d as f64 + 1.0)).collect();
        rows.push(obs("short", 0, 1.0));
        let out = pipeline().run(&rows).unwrap();
        assert!(out.representations.iter().all(|r| r.entity_id == "long"));
        assert_eq!(out.representations.len(), 9);
        assert_eq!(out.scores.len(), 9 - 5 + 1);
        assert_eq!(out.explanations.len(), out.scores.len());
    }

    #[test]
    fn test_output_follows_input_entity_order() {
        let mut rows = Vec::new();
        for d in 0..8 {
            rows.push(obs("z", d, 1.0));
            rows.push(obs("a", d, 2.0));
        }
        let out = pipeline().run(&rows).unwrap();
        let first_a = out.scores.iter().position(|s| s.entity_id == "a").unwrap();
        assert!(out.scores[..first_a].iter().all(|s| s.entity_id == "z"));
        assert!(out.scores[first_a..].iter().all(|s| s.entity_id == "a"));
    }
}
