//! Annotation domain types and error definitions

use geo::{Area, BoundingRect, Contains, Coord, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a single annotation job
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("No classification rule for ROI label '{roi_label}' (current label '{current_label}')")]
    UnknownTransition {
        current_label: String,
        roi_label: String,
    },

    #[error("No color configured for label '{0}'")]
    UnknownLabel(String),

    #[error("Pairing mismatch at {location}: {detections} detections vs {contours} contours")]
    PairingMismatch {
        location: String,
        detections: usize,
        contours: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write output: {0}")]
    Output(String),
}

/// 2D coordinate of a detected nucleus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Segmented outline of a nucleus, in GeoJSON polygon layout (rings of positions).
///
/// Positions are kept as read, including any coordinates beyond `x, y`.
pub type Contour = Vec<Vec<Vec<f64>>>;

/// Labeled region-of-interest polygon (exterior ring only)
#[derive(Debug, Clone, PartialEq)]
pub struct RoiPolygon {
    polygon: Polygon<f64>,
    bounds: Rect<f64>,
    label: String,
}

impl RoiPolygon {
    /// Build a polygon from an exterior ring.
    ///
    /// The ring may or may not repeat its first vertex at the end. It must have at
    /// least three vertices besides the closing one, all finite.
    pub fn new(mut ring: Vec<[f64; 2]>, label: impl Into<String>) -> Result<Self, AnnotateError> {
        let label = label.into();

        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(AnnotateError::MalformedInput(format!(
                "ROI '{}' ring has {} vertices, need at least 3",
                label,
                ring.len()
            )));
        }
        if ring.iter().any(|[x, y]| !x.is_finite() || !y.is_finite()) {
            return Err(AnnotateError::MalformedInput(format!(
                "ROI '{}' ring has non-finite coordinates",
                label
            )));
        }

        let polygon = Polygon::new(LineString::from(ring), vec![]);
        let bounds = polygon.bounding_rect().ok_or_else(|| {
            AnnotateError::MalformedInput(format!("ROI '{}' has an empty ring", label))
        })?;

        Ok(Self {
            polygon,
            bounds,
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Axis-aligned bounding box as (min, max) corners
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        ([min.x, min.y], [max.x, max.y])
    }

    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// Strict containment: points on the boundary are not contained.
    pub fn contains(&self, point: Point) -> bool {
        self.polygon.contains(&Coord {
            x: point.x,
            y: point.y,
        })
    }
}

/// One detection feature with its positionally paired contours.
///
/// Only constructed by [`crate::annotate::engine::pair_records`], which guarantees
/// `points.len() == contours.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub(crate) original_label: String,
    pub(crate) points: Vec<Point>,
    pub(crate) contours: Vec<Contour>,
}

impl DetectionRecord {
    pub fn original_label(&self) -> &str {
        &self.original_label
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// (point, contour) pairs in positional order
    pub fn pairs(&self) -> impl Iterator<Item = (Point, &Contour)> {
        self.points.iter().copied().zip(self.contours.iter())
    }
}

/// Detection feature as read from the detection file
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFeature {
    pub label: String,
    pub points: Vec<Point>,
}

/// Segmentation feature as read from the segmentation file
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationFeature {
    pub contours: Vec<Contour>,
}

/// A nucleus assigned to an ROI, with its final classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedNucleus {
    pub x: f64,
    pub y: f64,
    pub contour: Contour,
    pub final_label: String,
}
