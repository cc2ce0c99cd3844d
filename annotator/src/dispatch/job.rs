//! Processing of a single slide

use serde::Serialize;
use tracing::info;

use crate::annotate::engine::{AnnotationEngine, pair_records};
use crate::annotate::grouper::OutputGrouper;
use crate::annotate::types::AnnotateError;
use crate::config::Config;
use crate::geojson::parser::InputParser;
use crate::geojson::writer::write_outputs;

use super::discovery::Job;

/// Statistics of a successful job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    /// Detection points read
    pub input_points: usize,
    /// Points that fell inside an ROI
    pub annotated: usize,
    /// (final label, count) in partition order
    pub labels: Vec<(String, usize)>,
}

impl JobSummary {
    /// Points outside every ROI
    pub fn dropped(&self) -> usize {
        self.input_points - self.annotated
    }
}

/// Runs one job to completion; implementations must be safe to share across workers
pub trait JobRunner: Send + Sync {
    fn run(&self, job: &Job) -> Result<JobSummary, AnnotateError>;
}

/// The file-to-file annotation pipeline
pub struct JobProcessor {
    parser: InputParser,
    engine: AnnotationEngine,
    grouper: OutputGrouper,
}

impl JobProcessor {
    pub fn new(parser: InputParser, engine: AnnotationEngine, grouper: OutputGrouper) -> Self {
        Self {
            parser,
            engine,
            grouper,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            InputParser::with_limit(config.max_input_size),
            AnnotationEngine::new(config.classes.transitions.clone(), config.engine.clone()),
            OutputGrouper::new(config.classes.colors.clone()),
        )
    }
}

impl JobRunner for JobProcessor {
    fn run(&self, job: &Job) -> Result<JobSummary, AnnotateError> {
        info!("Processing files for ID: {}", job.id);

        let detections = self.parser.parse_detections(&job.detection)?;
        let segmentations = self.parser.parse_segmentations(&job.segmentation)?;
        let records = pair_records(detections, segmentations)?;
        let input_points: usize = records.iter().map(|r| r.len()).sum();

        let rois = self.parser.parse_rois(&job.annotation)?;

        info!(
            "Matching {} detections of '{}' against {} ROIs",
            input_points,
            job.id,
            rois.len()
        );
        let nuclei = self.engine.run(&records, rois)?;

        let grouped = self.grouper.group(&nuclei)?;
        let labels = grouped
            .detections
            .iter()
            .map(|f| (f.label().to_string(), f.member_count()))
            .collect();

        write_outputs(&job.output_dir, &job.id, &grouped)?;

        let summary = JobSummary {
            input_points,
            annotated: nuclei.len(),
            labels,
        };
        info!(
            "Finished '{}': {} of {} nuclei annotated, classifications: {:?}",
            job.id, summary.annotated, summary.input_points, summary.labels
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_run_job_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job {
            id: "s1".into(),
            detection: write(
                dir.path(),
                "s1_cell_detection.geojson",
                r#"[{"geometry": {"coordinates": [[1, 1], [50, 50], [2, 2]]},
                     "properties": {"classification": {"name": "Neoplastic"}}}]"#,
            ),
            segmentation: write(
                dir.path(),
                "s1_cells.geojson",
                r#"[{"geometry": {"coordinates": [
                        [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                        [[[49, 49], [50, 49], [50, 50], [49, 49]]],
                        [[[2, 2], [3, 2], [3, 3], [2, 2]]]
                    ]}}]"#,
            ),
            annotation: write(
                dir.path(),
                "s1.geojson",
                r#"{"features": [{
                    "geometry": {"coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]]},
                    "properties": {"classification": {"name": "tum_to_str"}}
                }]}"#,
            ),
            output_dir: dir.path().to_path_buf(),
        };

        let processor = JobProcessor::from_config(&Config::default());
        let summary = processor.run(&job).unwrap();

        assert_eq!(summary.input_points, 3);
        assert_eq!(summary.annotated, 2);
        assert_eq!(summary.dropped(), 1);
        assert_eq!(summary.labels, vec![("Connective".to_string(), 2)]);
        assert!(dir.path().join("s1_annotated_nuclei.csv").exists());
        assert!(dir.path().join("s1_cell_detection.geojson").exists());
        assert!(dir.path().join("s1_cells.geojson").exists());
    }

    #[test]
    fn test_pairing_checked_before_rois_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let job = Job {
            id: "s2".into(),
            detection: write(
                dir.path(),
                "s2_cell_detection.geojson",
                r#"[{"geometry": {"coordinates": [[1, 1], [2, 2]]},
                     "properties": {"classification": {"name": "Dead"}}}]"#,
            ),
            segmentation: write(
                dir.path(),
                "s2_cells.geojson",
                r#"[{"geometry": {"coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]]]}}]"#,
            ),
            annotation: dir.path().join("missing.geojson"),
            output_dir: dir.path().to_path_buf(),
        };

        let err = JobProcessor::from_config(&Config::default())
            .run(&job)
            .unwrap_err();
        assert!(matches!(err, AnnotateError::PairingMismatch { .. }));
        assert!(!dir.path().join("s2_annotated_nuclei.csv").exists());
    }
}
