//! Spatial indexing of ROI polygons using R-tree

use rstar::{AABB, RTree, RTreeObject};

use super::types::{Point, RoiPolygon};

/// Entry in the spatial index: ROI bounding box and index into the ROI vector
#[derive(Debug, Clone)]
pub struct RoiEntry {
    /// Index into the ROI vector (annotation file order)
    pub index: usize,
    /// Bounding box corners
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl RTreeObject for RoiEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// Read-only spatial index over the ROI polygons of one slide
pub struct RoiIndex {
    tree: RTree<RoiEntry>,
    rois: Vec<RoiPolygon>,
}

impl RoiIndex {
    /// Bulk-load an index from ROI polygons, keeping their order as the ROI index
    pub fn build(rois: Vec<RoiPolygon>) -> Self {
        let entries: Vec<RoiEntry> = rois
            .iter()
            .enumerate()
            .map(|(index, roi)| {
                let (min, max) = roi.bounds();
                RoiEntry { index, min, max }
            })
            .collect();

        let tree = RTree::bulk_load(entries);

        Self { tree, rois }
    }

    /// Indices of ROIs whose bounding box covers the point, in ascending ROI order.
    ///
    /// The R-tree traversal order depends on its internal node layout, so the
    /// candidates are sorted to make the result depend only on construction order.
    pub fn query(&self, point: Point) -> Vec<usize> {
        let envelope = AABB::from_point([point.x, point.y]);

        let mut candidates: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.index)
            .collect();
        candidates.sort_unstable();
        candidates
    }

    pub fn get(&self, index: usize) -> Option<&RoiPolygon> {
        self.rois.get(index)
    }

    /// Number of ROIs in the index
    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// Distinct ROI labels, sorted
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.rois.iter().map(|r| r.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn square(x: f64, y: f64, size: f64, label: &str) -> RoiPolygon {
        RoiPolygon::new(
            vec![[x, y], [x + size, y], [x + size, y + size], [x, y + size]],
            label,
        )
        .unwrap()
    }

    #[test]
    fn test_query_returns_covering_boxes() {
        let index = RoiIndex::build(vec![
            square(0.0, 0.0, 10.0, "a"),
            square(20.0, 20.0, 10.0, "b"),
            square(5.0, 5.0, 10.0, "c"),
        ]);

        assert_eq!(index.len(), 3);
        assert_eq!(index.query(Point::new(7.0, 7.0)), vec![0, 2]);
        assert_eq!(index.query(Point::new(25.0, 25.0)), vec![1]);
        assert!(index.query(Point::new(100.0, 100.0)).is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = RoiIndex::build(vec![]);
        assert!(index.is_empty());
        assert!(index.query(Point::new(0.0, 0.0)).is_empty());
    }

    #[test]
    fn test_labels_are_deduplicated() {
        let index = RoiIndex::build(vec![
            square(0.0, 0.0, 1.0, "good"),
            square(2.0, 0.0, 1.0, "tum_to_str"),
            square(4.0, 0.0, 1.0, "good"),
        ]);
        assert_eq!(index.labels(), vec!["good", "tum_to_str"]);
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let rois: Vec<RoiPolygon> = (0..200)
            .map(|i| {
                let x = rng.random::<f64>() * 10_000.0;
                let y = rng.random::<f64>() * 10_000.0;
                let size = 50.0 + rng.random::<f64>() * 500.0;
                square(x, y, size, &format!("roi_{}", i))
            })
            .collect();
        let index = RoiIndex::build(rois.clone());

        for _ in 0..2_000 {
            let p = Point::new(rng.random::<f64>() * 10_500.0, rng.random::<f64>() * 10_500.0);
            let expected: Vec<usize> = rois
                .iter()
                .enumerate()
                .filter(|(_, roi)| {
                    let (min, max) = roi.bounds();
                    p.x >= min[0] && p.x <= max[0] && p.y >= min[1] && p.y <= max[1]
                })
                .map(|(i, _)| i)
                .collect();
            assert_eq!(index.query(p), expected);
        }
    }
}
