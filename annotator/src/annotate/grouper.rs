//! Regrouping of annotated nuclei into per-classification GeoJSON features

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{AnnotateError, AnnotatedNucleus, Contour};

/// Display color per classification label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorTable {
    colors: IndexMap<String, [u8; 3]>,
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::from_iter([
            ("Neoplastic", [255, 0, 0]),
            ("Inflammatory", [34, 221, 77]),
            ("Connective", [35, 92, 236]),
            ("Dead", [254, 255, 0]),
            ("Epithelial", [255, 159, 68]),
        ])
    }
}

impl<S: Into<String>> FromIterator<(S, [u8; 3])> for ColorTable {
    fn from_iter<I: IntoIterator<Item = (S, [u8; 3])>>(iter: I) -> Self {
        Self {
            colors: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl ColorTable {
    pub fn get(&self, label: &str) -> Option<[u8; 3]> {
        self.colors.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// GeoJSON feature as written to the output files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    MultiPoint(Vec<[f64; 2]>),
    MultiPolygon(Vec<Contour>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub object_type: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,
    pub color: [u8; 3],
}

impl Feature {
    fn annotation(geometry: Geometry, name: &str, color: [u8; 3]) -> Self {
        Self {
            kind: "Feature".to_string(),
            geometry,
            properties: FeatureProperties {
                object_type: "annotation".to_string(),
                classification: Classification {
                    name: name.to_string(),
                    color,
                },
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.properties.classification.name
    }

    /// Number of points or polygons in the geometry
    pub fn member_count(&self) -> usize {
        match &self.geometry {
            Geometry::MultiPoint(points) => points.len(),
            Geometry::MultiPolygon(polygons) => polygons.len(),
        }
    }
}

/// Grouped outputs of one job
#[derive(Debug)]
pub struct GroupedOutput<'a> {
    /// One MultiPoint feature per final label
    pub detections: Vec<Feature>,
    /// One MultiPolygon feature per final label, aligned with `detections`
    pub segmentations: Vec<Feature>,
    /// Flat table in emission order
    pub table: &'a [AnnotatedNucleus],
}

impl GroupedOutput<'_> {
    /// Labels present, in partition order
    pub fn labels(&self) -> Vec<&str> {
        self.detections.iter().map(Feature::label).collect()
    }
}

/// Partitions annotated nuclei by final label
pub struct OutputGrouper {
    colors: ColorTable,
}

impl OutputGrouper {
    pub fn new(colors: ColorTable) -> Self {
        Self { colors }
    }

    /// Group nuclei by final label.
    ///
    /// Partitions are emitted in sorted label order; members keep their relative
    /// input order so point `i` and contour `i` of a partition stay paired.
    pub fn group<'a>(
        &self,
        nuclei: &'a [AnnotatedNucleus],
    ) -> Result<GroupedOutput<'a>, AnnotateError> {
        let mut partitions: IndexMap<&str, Vec<&AnnotatedNucleus>> = IndexMap::new();
        for nucleus in nuclei {
            partitions
                .entry(nucleus.final_label.as_str())
                .or_default()
                .push(nucleus);
        }
        partitions.sort_keys();

        let mut detections = Vec::with_capacity(partitions.len());
        let mut segmentations = Vec::with_capacity(partitions.len());

        for (label, members) in &partitions {
            let color = self
                .colors
                .get(label)
                .ok_or_else(|| AnnotateError::UnknownLabel(label.to_string()))?;

            let points = members.iter().map(|n| [n.x, n.y]).collect();
            let contours = members.iter().map(|n| n.contour.clone()).collect();

            detections.push(Feature::annotation(Geometry::MultiPoint(points), label, color));
            segmentations.push(Feature::annotation(
                Geometry::MultiPolygon(contours),
                label,
                color,
            ));

            debug!("Grouped {} nuclei as '{}'", members.len(), label);
        }

        Ok(GroupedOutput {
            detections,
            segmentations,
            table: nuclei,
        })
    }
}
