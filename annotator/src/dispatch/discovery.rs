//! Job discovery
//!
//! Matches input files across the three input directories by slide identifier:
//! - `<detection_dir>/<id>_cell_detection.geojson`
//! - `<segmentation_dir>/<id>_cells.geojson`
//! - `<annotation_dir>/<id>*` (first match in name order)

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Suffix identifying detection files
pub const DETECTION_SUFFIX: &str = "_cell_detection.geojson";

/// Suffix identifying segmentation files
pub const SEGMENTATION_SUFFIX: &str = "_cells.geojson";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One slide's matched inputs and output location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub detection: PathBuf,
    pub segmentation: PathBuf,
    pub annotation: PathBuf,
    pub output_dir: PathBuf,
}

/// Detection file with no matching segmentation or annotation file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unmatched {
    pub id: String,
    pub missing: &'static str,
}

/// Result of job discovery
#[derive(Debug, Default)]
pub struct Discovery {
    pub jobs: Vec<Job>,
    pub unmatched: Vec<Unmatched>,
}

/// Sorted file names of a directory
fn file_names(dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// Whether `name` belongs to slide `id`.
///
/// The identifier must be followed by a non-alphanumeric character, so `slide_1`
/// does not claim `slide_10.geojson`.
fn belongs_to(name: &str, id: &str) -> bool {
    match name.strip_prefix(id) {
        Some(rest) => rest.chars().next().is_none_or(|c| !c.is_ascii_alphanumeric()),
        None => false,
    }
}

/// Find all slides with a complete set of input files
pub fn discover_jobs(
    detection_dir: &Path,
    segmentation_dir: &Path,
    annotation_dir: &Path,
    output_dir: &Path,
) -> Result<Discovery, DiscoveryError> {
    let detection_files = file_names(detection_dir)?;
    let segmentation_files = file_names(segmentation_dir)?;
    let annotation_files = file_names(annotation_dir)?;

    let mut discovery = Discovery::default();

    for det_file in &detection_files {
        let Some(id) = det_file.strip_suffix(DETECTION_SUFFIX) else {
            continue;
        };
        if id.is_empty() {
            continue;
        }

        let seg_file = format!("{}{}", id, SEGMENTATION_SUFFIX);
        if segmentation_files.binary_search(&seg_file).is_err() {
            warn!("No segmentation file for slide '{}', skipping", id);
            discovery.unmatched.push(Unmatched {
                id: id.to_string(),
                missing: "segmentation",
            });
            continue;
        }

        let Some(ann_file) = annotation_files.iter().find(|name| belongs_to(name, id)) else {
            warn!("No annotation file for slide '{}', skipping", id);
            discovery.unmatched.push(Unmatched {
                id: id.to_string(),
                missing: "annotation",
            });
            continue;
        };

        debug!("Matched slide '{}' with annotation {}", id, ann_file);

        discovery.jobs.push(Job {
            id: id.to_string(),
            detection: detection_dir.join(det_file),
            segmentation: segmentation_dir.join(&seg_file),
            annotation: annotation_dir.join(ann_file),
            output_dir: output_dir.to_path_buf(),
        });
    }

    debug!(
        "Discovered {} jobs ({} unmatched) in {:?}",
        discovery.jobs.len(),
        discovery.unmatched.len(),
        detection_dir
    );
    Ok(discovery)
}
