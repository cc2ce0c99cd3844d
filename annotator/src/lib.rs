//! Nuclei annotator library
//!
//! Assigns cell detections to labeled ROI polygons, reclassifies them according to
//! the ROI labels and writes the regrouped detections, segmentations and a flat
//! table for every slide.

pub mod annotate;
pub mod config;
pub mod dispatch;
pub mod geojson;

// Re-export commonly used types
pub use annotate::{AnnotateError, AnnotatedNucleus, AnnotationEngine, OutputGrouper, RuleTable};
pub use config::{ClassConfig, Config, ConfigError};
pub use dispatch::{BatchReport, Dispatcher, Job, JobProcessor, JobStatus, discover_jobs};
