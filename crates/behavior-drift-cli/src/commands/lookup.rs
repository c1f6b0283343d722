//! Read-time lookups: timeline, latest, explanation, onset, summary.

use behavior_drift::OnsetRule;

use crate::session::DriftStore;
use crate::types::{
    DriftExplanationResponse, DriftTimeline, HealthResponse, LatestDrift, OnsetResponse,
    ServiceError, ServiceResult, SummaryResponse,
};

pub fn health(store: &DriftStore) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        entities: store.index().entity_count(),
    }
}

pub fn timeline(store: &DriftStore, entity_id: &str) -> ServiceResult<DriftTimeline> {
    let scores = store.index().timeline(entity_id)?;
    Ok(DriftTimeline::new(entity_id, scores))
}

pub fn latest(store: &DriftStore, entity_id: &str) -> ServiceResult<LatestDrift> {
    Ok(LatestDrift::from(store.index().latest(entity_id)?))
}

/// Explanation rows of the strongest drift day.
pub fn explanation(store: &DriftStore, entity_id: &str) -> ServiceResult<DriftExplanationResponse> {
    store.require_explanations()?;
    let strongest = store.index().strongest_explanation(entity_id)?;
    Ok(DriftExplanationResponse::from(&strongest))
}

/// Build an onset rule from optional parameters, falling back to defaults.
pub fn onset_rule(threshold: Option<f64>, run_length: Option<usize>) -> ServiceResult<OnsetRule> {
    let defaults = OnsetRule::default();
    let threshold = threshold.unwrap_or(defaults.threshold);
    let run_length = run_length.unwrap_or(defaults.run_length);

    if !threshold.is_finite() {
        return Err(ServiceError::InvalidParams(format!(
            "threshold must be finite, got {threshold}"
        )));
    }
    if run_length == 0 {
        return Err(ServiceError::InvalidParams(
            "run_length must be at least 1".to_string(),
        ));
    }

    Ok(OnsetRule {
        threshold,
        run_length,
    })
}

pub fn onset(store: &DriftStore, entity_id: &str, rule: OnsetRule) -> ServiceResult<OnsetResponse> {
    let onset_day = store.index().onset(entity_id, rule)?;
    Ok(OnsetResponse {
        user_id: entity_id.to_string(),
        onset_day,
        threshold: rule.threshold,
        run_length: rule.run_length,
    })
}

pub fn summary(store: &DriftStore, entity_id: &str, rule: OnsetRule) -> ServiceResult<SummaryResponse> {
    let summary = store.index().summary(entity_id, rule)?;
    Ok(SummaryResponse::from(&summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use behavior_drift::{Direction, DriftIndex, DriftScore, Explanation};

    fn store() -> DriftStore {
        let scores = (0..5u32)
            .map(|i| DriftScore {
                entity_id: "user_1".to_string(),
                day: 43 + i,
                drift_score: [0.0, 0.2, 0.3, 0.4, 0.1][i as usize],
            })
            .collect();
        let explanations = vec![
            Explanation {
                entity_id: "user_1".to_string(),
                day: 45,
                feature: "session_count".to_string(),
                contribution: 0.6,
                direction: Direction::Increase,
            },
            Explanation {
                entity_id: "user_1".to_string(),
                day: 46,
                feature: "session_count".to_string(),
                contribution: -0.2,
                direction: Direction::Decrease,
            },
        ];
        DriftStore::from_index(DriftIndex::new(scores, explanations))
    }

    #[test]
    fn test_latest_and_timeline() {
        let store = store();
        assert_eq!(timeline(&store, "user_1").unwrap().timeline.len(), 5);
        let latest = latest(&store, "user_1").unwrap();
        assert_eq!(latest.day, 47);
        assert_eq!(latest.drift_score, 0.1);
    }

    #[test]
    fn test_explanation_picks_strongest_day() {
        let resp = explanation(&store(), "user_1").unwrap();
        assert_eq!(resp.day, 45);
        assert_eq!(resp.explanations[0].feature, "session_count");
    }

    #[test]
    fn test_onset_with_custom_rule() {
        let store = store();
        let resp = onset(&store, "user_1", onset_rule(None, None).unwrap()).unwrap();
        assert_eq!(resp.onset_day, Some(44));
        let strict = onset_rule(Some(0.35), Some(1)).unwrap();
        assert_eq!(onset(&store, "user_1", strict).unwrap().onset_day, Some(46));
    }

    #[test]
    fn test_bad_onset_params() {
        assert!(matches!(
            onset_rule(Some(f64::NAN), None),
            Err(ServiceError::InvalidParams(_))
        ));
        assert!(matches!(
            onset_rule(None, Some(0)),
            Err(ServiceError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_unknown_entity_not_found() {
        assert!(matches!(
            latest(&store(), "user_404"),
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(health(&store()).entities, 1);
    }
}
