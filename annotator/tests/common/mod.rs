//! Common Test Utilities for Integration Tests
//!
//! Fixture writers for slide input directories.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

/// Input and output directories of a test batch
pub struct Workspace {
    _root: tempfile::TempDir,
    pub detection_dir: PathBuf,
    pub segmentation_dir: PathBuf,
    pub annotation_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let detection_dir = root.path().join("detections");
        let segmentation_dir = root.path().join("segmentations");
        let annotation_dir = root.path().join("annotations");
        let output_dir = root.path().join("output");
        for dir in [&detection_dir, &segmentation_dir, &annotation_dir, &output_dir] {
            fs::create_dir_all(dir).expect("Failed to create fixture dir");
        }
        Self {
            _root: root,
            detection_dir,
            segmentation_dir,
            annotation_dir,
            output_dir,
        }
    }

    /// Write a complete, valid input triple for `id`
    pub fn add_slide(
        &self,
        id: &str,
        detections: &[(&str, Vec<[f64; 2]>)],
        rois: &[(&str, [f64; 4])],
    ) {
        self.write_detections(id, detections);
        self.write_segmentations(id, detections);
        self.write_annotations(id, rois);
    }

    pub fn write_detections(&self, id: &str, detections: &[(&str, Vec<[f64; 2]>)]) {
        let features: Vec<Value> = detections
            .iter()
            .map(|(label, points)| {
                json!({
                    "type": "Feature",
                    "geometry": {"type": "MultiPoint", "coordinates": points},
                    "properties": {
                        "objectType": "annotation",
                        "classification": {"name": label, "color": [0, 0, 0]}
                    }
                })
            })
            .collect();
        write_json(
            &self.detection_dir.join(format!("{}_cell_detection.geojson", id)),
            &Value::Array(features),
        );
    }

    /// Segmentations with one small triangle contour per detection point
    pub fn write_segmentations(&self, id: &str, detections: &[(&str, Vec<[f64; 2]>)]) {
        let contours: Vec<Vec<Vec<Vec<Vec<f64>>>>> = detections
            .iter()
            .map(|(_, points)| points.iter().map(|p| contour_for(*p)).collect())
            .collect();
        self.write_contours(id, &contours);
    }

    /// Segmentations with explicit contours, one list per detection feature
    pub fn write_contours(&self, id: &str, contours: &[Vec<Vec<Vec<Vec<f64>>>>]) {
        let features: Vec<Value> = contours
            .iter()
            .map(|polygons| {
                json!({
                    "type": "Feature",
                    "geometry": {"type": "MultiPolygon", "coordinates": polygons},
                    "properties": {"objectType": "annotation"}
                })
            })
            .collect();
        write_json(
            &self.segmentation_dir.join(format!("{}_cells.geojson", id)),
            &Value::Array(features),
        );
    }

    /// Rectangular ROIs given as [min_x, min_y, max_x, max_y]
    pub fn write_annotations(&self, id: &str, rois: &[(&str, [f64; 4])]) {
        let features: Vec<Value> = rois
            .iter()
            .map(|(label, [x0, y0, x1, y1])| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
                    },
                    "properties": {"classification": {"name": label}}
                })
            })
            .collect();
        write_json(
            &self.annotation_dir.join(format!("{}_annotations.geojson", id)),
            &json!({"type": "FeatureCollection", "features": features}),
        );
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

/// The contour fixture paired with a detection point
pub fn contour_for(p: [f64; 2]) -> Vec<Vec<Vec<f64>>> {
    let [x, y] = p;
    vec![vec![
        vec![x - 1.0, y - 1.0],
        vec![x + 1.0, y - 1.0],
        vec![x, y + 1.0],
        vec![x - 1.0, y - 1.0],
    ]]
}

pub fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).expect("Failed to write fixture");
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).expect("Missing output")).expect("Invalid JSON output")
}
