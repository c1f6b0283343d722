//! Behavior drift: unsupervised detection and explanation of per-entity behavioral change.
//!
//! Three batch stages run in a fixed order: rolling representations,
//! reference-vs-current drift scores, and per-feature explanations.

pub mod config;
pub mod drift;
pub mod explain;
pub mod incremental;
pub mod pipeline;
pub mod query;
pub mod representation;
pub mod table;
pub mod types;
pub mod window;

pub use config::{FeatureSet, GapPolicy, PipelineConfig};
pub use drift::{drift_score, DriftScorer};
pub use explain::{contributions, rank_top_k, DriftExplainer};
pub use incremental::{EntityTracker, TrackerStep};
pub use pipeline::DriftPipeline;
pub use query::{DriftIndex, EntitySummary, OnsetRule, StrongestDay};
pub use representation::RepresentationBuilder;
pub use table::{TableReader, TableWriter};
pub use types::*;
pub use window::WindowSpec;
