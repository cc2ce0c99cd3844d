//! Writers for the per-slide output files

use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::annotate::grouper::{Feature, GroupedOutput};
use crate::annotate::types::AnnotateError;

/// Paths of the files written for one slide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub table: PathBuf,
    pub detections: PathBuf,
    pub segmentations: PathBuf,
}

impl OutputPaths {
    pub fn for_slide(output_dir: &Path, slide_id: &str) -> Self {
        Self {
            table: output_dir.join(format!("{}_annotated_nuclei.csv", slide_id)),
            detections: output_dir.join(format!("{}_cell_detection.geojson", slide_id)),
            segmentations: output_dir.join(format!("{}_cells.geojson", slide_id)),
        }
    }
}

#[derive(Serialize)]
struct TableRow<'a> {
    detection_x: f64,
    detection_y: f64,
    contour: String,
    classification: &'a str,
}

/// Write the flat table and both feature collections for one slide.
///
/// All three files are staged next to their destinations and only moved into
/// place once every one of them has been written. If a move fails, the files
/// already moved are removed again.
pub fn write_outputs(
    output_dir: &Path,
    slide_id: &str,
    output: &GroupedOutput<'_>,
) -> Result<OutputPaths, AnnotateError> {
    let paths = OutputPaths::for_slide(output_dir, slide_id);

    let table = stage(output_dir, &paths.table, |w| write_table(w, output))?;
    let detections = stage(output_dir, &paths.detections, |w| {
        write_features(w, &output.detections)
    })?;
    let segmentations = stage(output_dir, &paths.segmentations, |w| {
        write_features(w, &output.segmentations)
    })?;

    let staged = [
        (table, &paths.table),
        (detections, &paths.detections),
        (segmentations, &paths.segmentations),
    ];
    let mut persisted: Vec<&Path> = Vec::with_capacity(staged.len());
    for (tmp, path) in staged {
        if let Err(e) = tmp.persist(path) {
            for done in &persisted {
                if let Err(remove_err) = fs::remove_file(done) {
                    warn!("Failed to roll back {}: {}", done.display(), remove_err);
                }
            }
            return Err(AnnotateError::Output(format!(
                "Could not move output into place at {}: {}",
                path.display(),
                e.error
            )));
        }
        persisted.push(path);
    }

    info!("Annotated nuclei saved to: {}", paths.table.display());
    info!(
        "Detection file saved to: {}, segmentation file saved to: {}",
        paths.detections.display(),
        paths.segmentations.display()
    );

    Ok(paths)
}

fn stage<F>(output_dir: &Path, path: &Path, write: F) -> Result<NamedTempFile, AnnotateError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), AnnotateError>,
{
    let mut tmp = NamedTempFile::new_in(output_dir).map_err(|e| {
        AnnotateError::Output(format!(
            "Could not create temporary file in {}: {}",
            output_dir.display(),
            e
        ))
    })?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        write(&mut writer)?;
        writer.flush()?;
    }
    debug!("Staged {} at {}", path.display(), tmp.path().display());
    Ok(tmp)
}

fn write_table(out: &mut dyn Write, output: &GroupedOutput<'_>) -> Result<(), AnnotateError> {
    let mut writer = csv::Writer::from_writer(out);

    for nucleus in output.table {
        let contour = serde_json::to_string(&nucleus.contour)
            .map_err(|e| AnnotateError::Output(e.to_string()))?;
        writer
            .serialize(TableRow {
                detection_x: nucleus.x,
                detection_y: nucleus.y,
                contour,
                classification: &nucleus.final_label,
            })
            .map_err(|e| AnnotateError::Output(e.to_string()))?;
    }

    writer.flush()?;
    Ok(())
}

fn write_features(out: &mut dyn Write, features: &[Feature]) -> Result<(), AnnotateError> {
    serde_json::to_writer_pretty(out, features).map_err(|e| AnnotateError::Output(e.to_string()))
}
