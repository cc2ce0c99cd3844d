//! ROI annotation engine
//!
//! Resolves detections against labeled ROI polygons, reclassifies them and
//! regroups the result by final classification.

pub mod engine;
pub mod grouper;
pub mod index;
pub mod rules;
pub mod types;

pub use engine::{AnnotationEngine, EngineConfig, TieBreak, pair_records};
pub use grouper::{ColorTable, Feature, Geometry, GroupedOutput, OutputGrouper};
pub use index::RoiIndex;
pub use rules::{ANY_LABEL, RoiRule, RuleTable, Transition};
pub use types::{
    AnnotateError, AnnotatedNucleus, Contour, DetectionFeature, DetectionRecord, Point,
    RoiPolygon, SegmentationFeature,
};
