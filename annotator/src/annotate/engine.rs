//! Spatial join of detections against ROI polygons
//!
//! Pairs detection points with their contours, resolves each point to at most one
//! containing ROI and applies the classification rules.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::index::RoiIndex;
use super::rules::RuleTable;
use super::types::{
    AnnotateError, AnnotatedNucleus, DetectionFeature, DetectionRecord, Point, RoiPolygon,
    SegmentationFeature,
};

/// How to pick among several ROIs that all contain a point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The ROI listed first in the annotation file wins
    #[default]
    FirstInFileOrder,
    /// The ROI with the smallest area wins, then file order
    SmallestArea,
}

impl std::str::FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" | "first_in_file_order" => Ok(Self::FirstInFileOrder),
            "smallest" | "smallest_area" => Ok(Self::SmallestArea),
            other => Err(format!("unknown tie-break policy: {}", other)),
        }
    }
}

/// Zip detection features with segmentation features by position.
///
/// Feature counts and per-feature point/contour counts must agree exactly.
pub fn pair_records(
    detections: Vec<DetectionFeature>,
    segmentations: Vec<SegmentationFeature>,
) -> Result<Vec<DetectionRecord>, AnnotateError> {
    if detections.len() != segmentations.len() {
        return Err(AnnotateError::PairingMismatch {
            location: "file level".to_string(),
            detections: detections.len(),
            contours: segmentations.len(),
        });
    }

    detections
        .into_iter()
        .zip(segmentations)
        .enumerate()
        .map(|(i, (detection, segmentation))| {
            if detection.points.len() != segmentation.contours.len() {
                return Err(AnnotateError::PairingMismatch {
                    location: format!("feature {}", i),
                    detections: detection.points.len(),
                    contours: segmentation.contours.len(),
                });
            }
            Ok(DetectionRecord {
                original_label: detection.label,
                points: detection.points,
                contours: segmentation.contours,
            })
        })
        .collect()
}

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub tie_break: TieBreak,
    /// Resolve points on the rayon pool
    pub parallel_points: bool,
}

/// Assigns detections to ROIs and reclassifies them
pub struct AnnotationEngine {
    rules: RuleTable,
    config: EngineConfig,
}

impl AnnotationEngine {
    pub fn new(rules: RuleTable, config: EngineConfig) -> Self {
        Self { rules, config }
    }

    /// Annotate every detection point lying inside an ROI.
    ///
    /// Points outside all ROIs are dropped. Output order is the input
    /// (feature, point) order whether or not points are resolved in parallel.
    pub fn run(
        &self,
        records: &[DetectionRecord],
        rois: Vec<RoiPolygon>,
    ) -> Result<Vec<AnnotatedNucleus>, AnnotateError> {
        let index = RoiIndex::build(rois);
        debug!("Built ROI index over {} polygons, labels {:?}", index.len(), index.labels());

        let per_record: Vec<Vec<AnnotatedNucleus>> = if self.config.parallel_points {
            records
                .par_iter()
                .map(|record| self.annotate_record(&index, record))
                .collect::<Result<_, _>>()?
        } else {
            records
                .iter()
                .map(|record| self.annotate_record(&index, record))
                .collect::<Result<_, _>>()?
        };

        Ok(per_record.into_iter().flatten().collect())
    }

    fn annotate_record(
        &self,
        index: &RoiIndex,
        record: &DetectionRecord,
    ) -> Result<Vec<AnnotatedNucleus>, AnnotateError> {
        let mut annotated = Vec::new();

        for (point, contour) in record.pairs() {
            let Some(roi) = self.resolve(index, point) else {
                continue;
            };
            let final_label = self.rules.apply(record.original_label(), roi.label())?;
            annotated.push(AnnotatedNucleus {
                x: point.x,
                y: point.y,
                contour: contour.clone(),
                final_label,
            });
        }

        Ok(annotated)
    }

    /// The ROI a point belongs to, if any
    pub fn resolve<'i>(&self, index: &'i RoiIndex, point: Point) -> Option<&'i RoiPolygon> {
        let mut containing = index
            .query(point)
            .into_iter()
            .filter_map(|i| index.get(i))
            .filter(|roi| roi.contains(point));

        match self.config.tie_break {
            TieBreak::FirstInFileOrder => containing.next(),
            // min_by keeps the first of equal elements, so file order breaks area ties
            TieBreak::SmallestArea => containing.min_by(|a, b| a.area().total_cmp(&b.area())),
        }
    }
}
