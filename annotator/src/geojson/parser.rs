//! Parsers for the three per-slide input files
//!
//! - detections: JSON array of MultiPoint features with a classification
//! - segmentations: JSON array of MultiPolygon features, positionally aligned
//!   with the detections
//! - annotations: FeatureCollection (or bare array) of labeled ROI polygons

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use crate::annotate::types::{
    AnnotateError, Contour, DetectionFeature, Point, RoiPolygon, SegmentationFeature,
};

/// Default maximum input file size (8 GiB)
pub const DEFAULT_MAX_INPUT_SIZE: u64 = 8 * 1024 * 1024 * 1024;

#[derive(Deserialize)]
struct RawFeature<C> {
    geometry: RawGeometry<C>,
    properties: RawProperties,
}

#[derive(Deserialize)]
struct RawGeometry<C> {
    coordinates: C,
}

#[derive(Deserialize)]
struct RawProperties {
    classification: RawClassification,
}

#[derive(Deserialize)]
struct RawClassification {
    name: String,
}

#[derive(Deserialize)]
struct RawContourFeature {
    geometry: RawGeometry<Vec<Contour>>,
}

type RawRoiFeature = RawFeature<Vec<Vec<Vec<f64>>>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnnotationDocument {
    Collection { features: Vec<RawRoiFeature> },
    Bare(Vec<RawRoiFeature>),
}

/// Parser for detection, segmentation and annotation files
pub struct InputParser {
    /// Maximum file size in bytes
    max_file_size: u64,
}

impl Default for InputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InputParser {
    /// Create a parser with the default size limit
    pub fn new() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_INPUT_SIZE,
        }
    }

    /// Create a parser with a custom size limit
    pub fn with_limit(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn parse_detections(&self, path: &Path) -> Result<Vec<DetectionFeature>, AnnotateError> {
        let raw: Vec<RawFeature<Vec<Vec<f64>>>> = self.read_json(path)?;
        let features = detections_from_raw(raw)?;
        info!(
            "Parsed {} detection features from {}",
            features.len(),
            path.display()
        );
        Ok(features)
    }

    pub fn parse_segmentations(
        &self,
        path: &Path,
    ) -> Result<Vec<SegmentationFeature>, AnnotateError> {
        let raw: Vec<RawContourFeature> = self.read_json(path)?;
        let features = segmentations_from_raw(raw)?;
        info!(
            "Parsed {} segmentation features from {}",
            features.len(),
            path.display()
        );
        Ok(features)
    }

    pub fn parse_rois(&self, path: &Path) -> Result<Vec<RoiPolygon>, AnnotateError> {
        let raw: RawAnnotationDocument = self.read_json(path)?;
        let rois = rois_from_raw(raw)?;
        info!("Parsed {} ROIs from {}", rois.len(), path.display());
        Ok(rois)
    }

    /// Parse detection features from raw bytes
    pub fn detections_from_slice(
        &self,
        data: &[u8],
    ) -> Result<Vec<DetectionFeature>, AnnotateError> {
        detections_from_raw(from_slice(data)?)
    }

    /// Parse segmentation features from raw bytes
    pub fn segmentations_from_slice(
        &self,
        data: &[u8],
    ) -> Result<Vec<SegmentationFeature>, AnnotateError> {
        segmentations_from_raw(from_slice(data)?)
    }

    /// Parse ROI polygons from raw bytes
    pub fn rois_from_slice(&self, data: &[u8]) -> Result<Vec<RoiPolygon>, AnnotateError> {
        rois_from_raw(from_slice(data)?)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, AnnotateError> {
        let file_size = std::fs::metadata(path)?.len();
        if file_size > self.max_file_size {
            return Err(AnnotateError::MalformedInput(format!(
                "{} is {} bytes, limit is {}",
                path.display(),
                file_size,
                self.max_file_size
            )));
        }

        debug!("Reading {} ({} bytes)", path.display(), file_size);

        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|e| {
            AnnotateError::MalformedInput(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, AnnotateError> {
    serde_json::from_slice(data)
        .map_err(|e| AnnotateError::MalformedInput(format!("Failed to parse JSON: {}", e)))
}

fn position(coords: &[f64]) -> Result<[f64; 2], AnnotateError> {
    match coords {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok([*x, *y]),
        _ => Err(AnnotateError::MalformedInput(format!(
            "invalid position {:?}",
            coords
        ))),
    }
}

fn detections_from_raw(
    raw: Vec<RawFeature<Vec<Vec<f64>>>>,
) -> Result<Vec<DetectionFeature>, AnnotateError> {
    raw.into_iter()
        .map(|feature| {
            let points = feature
                .geometry
                .coordinates
                .iter()
                .map(|c| position(c).map(|[x, y]| Point::new(x, y)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DetectionFeature {
                label: feature.properties.classification.name,
                points,
            })
        })
        .collect()
}

fn segmentations_from_raw(
    raw: Vec<RawContourFeature>,
) -> Result<Vec<SegmentationFeature>, AnnotateError> {
    raw.into_iter()
        .map(|feature| {
            let contours = feature.geometry.coordinates;
            for polygon in &contours {
                check_contour(polygon)?;
            }
            Ok(SegmentationFeature { contours })
        })
        .collect()
}

/// Contours are re-emitted as read, so they are only checked here
fn check_contour(polygon: &Contour) -> Result<(), AnnotateError> {
    if polygon.is_empty() {
        return Err(AnnotateError::MalformedInput("contour has no rings".into()));
    }
    for ring in polygon {
        for coords in ring {
            position(coords)?;
        }
    }
    Ok(())
}

fn rois_from_raw(raw: RawAnnotationDocument) -> Result<Vec<RoiPolygon>, AnnotateError> {
    let features = match raw {
        RawAnnotationDocument::Collection { features } => features,
        RawAnnotationDocument::Bare(features) => features,
    };

    features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let label = feature.properties.classification.name;
            // Exterior ring only; holes are ignored
            let exterior = feature.geometry.coordinates.first().ok_or_else(|| {
                AnnotateError::MalformedInput(format!("ROI {} ('{}') has no rings", i, label))
            })?;
            let ring = exterior
                .iter()
                .map(|c| position(c))
                .collect::<Result<Vec<_>, _>>()?;
            RoiPolygon::new(ring, label)
        })
        .collect()
}
