//! Batch pipeline commands: run, represent, score, explain, validate.

use std::path::Path;

use serde::{Deserialize, Serialize};

use behavior_drift::pipeline::group_by_entity;
use behavior_drift::table::{EXPLANATIONS_FILE, REPRESENTATIONS_FILE, SCORES_FILE};
use behavior_drift::{
    DriftPipeline, FeatureSet, Observation, PipelineConfig, Representation, TableReader,
    TableWriter,
};

use crate::config::PipelineOverrides;
use crate::types::ServiceResult;

/// Row counts written by a pipeline command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub entities: usize,
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanations: Option<usize>,
}

fn load_observations(
    observations: &Path,
    overrides: &PipelineOverrides,
) -> ServiceResult<(PipelineConfig, Vec<Observation>)> {
    let draft = overrides.load()?;
    let known = draft.known_features()?;
    let (features, rows) = TableReader::read_observations_file(observations, known.as_ref())?;
    let config = draft.resolve(features)?;
    Ok((config, rows))
}

fn load_representations(
    data_dir: &Path,
    overrides: &PipelineOverrides,
) -> ServiceResult<(DriftPipeline, Vec<Representation>)> {
    let draft = overrides.load()?;
    let known = draft.known_features()?;
    let window_size = draft.window_size();
    let (features, reps) = TableReader::read_representations_file(
        &data_dir.join(REPRESENTATIONS_FILE),
        known.as_ref(),
        window_size,
    )?;
    let pipeline = DriftPipeline::new(draft.resolve(features)?)?;
    Ok((pipeline, reps))
}

fn feature_names(features: &FeatureSet) -> Vec<String> {
    features.names().to_vec()
}

/// All three stages from an observations file into `data_dir`.
pub fn run(
    observations: &Path,
    data_dir: &Path,
    overrides: &PipelineOverrides,
) -> ServiceResult<StageReport> {
    let (config, rows) = load_observations(observations, overrides)?;
    let pipeline = DriftPipeline::new(config)?;
    let output = pipeline.run(&rows)?;
    let config = pipeline.config();

    TableWriter::write_representations_file(
        &data_dir.join(REPRESENTATIONS_FILE),
        &config.features,
        config.window_size,
        &output.representations,
    )?;
    TableWriter::write_scores_file(&data_dir.join(SCORES_FILE), &output.scores)?;
    TableWriter::write_explanations_file(&data_dir.join(EXPLANATIONS_FILE), &output.explanations)?;

    Ok(StageReport {
        entities: group_by_entity(&rows).len(),
        features: feature_names(&config.features),
        observations: Some(rows.len()),
        representations: Some(output.representations.len()),
        scores: Some(output.scores.len()),
        explanations: Some(output.explanations.len()),
    })
}

/// Stage 1 only.
pub fn represent(
    observations: &Path,
    data_dir: &Path,
    overrides: &PipelineOverrides,
) -> ServiceResult<StageReport> {
    let (config, rows) = load_observations(observations, overrides)?;
    let pipeline = DriftPipeline::new(config)?;
    let reps = pipeline.build_representations(&rows)?;
    let config = pipeline.config();

    TableWriter::write_representations_file(
        &data_dir.join(REPRESENTATIONS_FILE),
        &config.features,
        config.window_size,
        &reps,
    )?;

    Ok(StageReport {
        entities: group_by_entity(&rows).len(),
        features: feature_names(&config.features),
        observations: Some(rows.len()),
        representations: Some(reps.len()),
        ..Default::default()
    })
}

/// Stage 2 from the representations table in `data_dir`.
pub fn score(data_dir: &Path, overrides: &PipelineOverrides) -> ServiceResult<StageReport> {
    let (pipeline, reps) = load_representations(data_dir, overrides)?;
    let scores = pipeline.score(&reps)?;
    TableWriter::write_scores_file(&data_dir.join(SCORES_FILE), &scores)?;

    Ok(StageReport {
        entities: group_by_entity(&reps).len(),
        features: feature_names(&pipeline.config().features),
        representations: Some(reps.len()),
        scores: Some(scores.len()),
        ..Default::default()
    })
}

/// Stage 3 from the representations and scores tables in `data_dir`.
pub fn explain(data_dir: &Path, overrides: &PipelineOverrides) -> ServiceResult<StageReport> {
    let (pipeline, reps) = load_representations(data_dir, overrides)?;
    let scores = TableReader::read_scores_file(&data_dir.join(SCORES_FILE))?;
    let explanations = pipeline.explain(&reps, &scores)?;
    TableWriter::write_explanations_file(&data_dir.join(EXPLANATIONS_FILE), &explanations)?;

    Ok(StageReport {
        entities: group_by_entity(&reps).len(),
        features: feature_names(&pipeline.config().features),
        observations: None,
        representations: Some(reps.len()),
        scores: Some(scores.len()),
        explanations: Some(explanations.len()),
    })
}

/// Load and check an observations file without writing anything.
pub fn validate(observations: &Path, overrides: &PipelineOverrides) -> ServiceResult<StageReport> {
    let (config, rows) = load_observations(observations, overrides)?;
    let pipeline = DriftPipeline::new(config)?;
    // Stage 1 performs the width and day-order checks.
    let reps = pipeline.build_representations(&rows)?;

    Ok(StageReport {
        entities: group_by_entity(&rows).len(),
        features: feature_names(&pipeline.config().features),
        observations: Some(rows.len()),
        representations: Some(reps.len()),
        ..Default::default()
    })
}
