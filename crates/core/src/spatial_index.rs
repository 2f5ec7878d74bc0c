//! Balanced k-d tree over a point cloud snapshot.
//!
//! The tree is stored implicitly: `order` is a permutation of point indices
//! where the median of every `[lo, hi)` range is that subtree's splitting
//! node. Ties on distance always resolve to the lowest point index, so query
//! results do not depend on build order or traversal order.

use glam::Vec3;

use crate::error::{ResampleError, ResampleResult};
use crate::point_cloud::PointCloud;

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    positions: Vec<Vec3>,
    values: Vec<f32>,
    order: Vec<u32>,
    axes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    pub index: usize,
    pub distance: f32,
    pub value: f32,
}

#[derive(Clone, Copy)]
struct Best {
    index: usize,
    dist_sq: f32,
}

impl Best {
    fn offer(&mut self, index: usize, dist_sq: f32) {
        if dist_sq < self.dist_sq || (dist_sq == self.dist_sq && index < self.index) {
            self.index = index;
            self.dist_sq = dist_sq;
        }
    }
}

impl SpatialIndex {
    pub fn build(cloud: &PointCloud) -> ResampleResult<Self> {
        if cloud.is_empty() {
            return Err(ResampleError::EmptyInput);
        }
        if cloud.len() > u32::MAX as usize {
            return Err(ResampleError::invalid_config(
                "point cloud exceeds u32 index range",
            ));
        }
        let positions: Vec<Vec3> = cloud.positions().collect();
        let values: Vec<f32> = cloud.values().collect();
        let mut order: Vec<u32> = (0..positions.len() as u32).collect();
        let mut axes = vec![0u8; positions.len()];
        build_range(&positions, &mut order, &mut axes, 0, positions.len());
        tracing::debug!("built spatial index over {} points", positions.len());
        Ok(Self {
            positions,
            values,
            order,
            axes,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, index: usize) -> Option<Vec3> {
        self.positions.get(index).copied()
    }

    pub fn value(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    /// Closest point by Euclidean distance, lowest index on ties.
    pub fn nearest(&self, position: Vec3) -> NearestHit {
        let best = self.search(position, f32::INFINITY, None);
        self.hit(best)
    }

    /// Like [`SpatialIndex::nearest`] but `None` when nothing lies within
    /// `radius` (inclusive).
    pub fn nearest_within(&self, position: Vec3, radius: f32) -> Option<NearestHit> {
        if !(radius >= 0.0) {
            return None;
        }
        let limit = radius * radius;
        let best = self.search(position, limit, None);
        (best.index != usize::MAX).then(|| self.hit(best))
    }

    /// Nearest neighbour of an indexed point, excluding the point itself.
    pub fn nearest_other(&self, index: usize) -> Option<(usize, f32)> {
        let position = self.position(index)?;
        if self.len() < 2 {
            return None;
        }
        let best = self.search(position, f32::INFINITY, Some(index));
        Some((best.index, best.dist_sq.sqrt()))
    }

    fn hit(&self, best: Best) -> NearestHit {
        if best.index == usize::MAX {
            // Only reachable for non-finite queries; inputs are validated upstream.
            return NearestHit {
                index: 0,
                distance: f32::NAN,
                value: f32::NAN,
            };
        }
        NearestHit {
            index: best.index,
            distance: best.dist_sq.sqrt(),
            value: self.values[best.index],
        }
    }

    fn search(&self, query: Vec3, limit_sq: f32, skip: Option<usize>) -> Best {
        let mut best = Best {
            index: usize::MAX,
            dist_sq: if limit_sq.is_finite() {
                limit_sq
            } else {
                f32::INFINITY
            },
        };
        self.search_range(query, skip, 0, self.order.len(), &mut best);
        best
    }

    fn search_range(&self, query: Vec3, skip: Option<usize>, lo: usize, hi: usize, best: &mut Best) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let index = self.order[mid] as usize;
        let point = self.positions[index];
        if skip != Some(index) {
            best.offer(index, query.distance_squared(point));
        }

        let axis = self.axes[mid] as usize;
        let delta = query[axis] - point[axis];
        let (near, far) = if delta < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.search_range(query, skip, near.0, near.1, best);
        // `<=` keeps equal-distance candidates with lower indices reachable.
        if delta * delta <= best.dist_sq {
            self.search_range(query, skip, far.0, far.1, best);
        }
    }
}

fn build_range(positions: &[Vec3], order: &mut [u32], axes: &mut [u8], lo: usize, hi: usize) {
    if hi - lo <= 1 {
        return;
    }
    let axis = widest_axis(positions, &order[lo..hi]);
    let mid = lo + (hi - lo) / 2;
    order[lo..hi].select_nth_unstable_by(mid - lo, |a, b| {
        let pa = positions[*a as usize][axis];
        let pb = positions[*b as usize][axis];
        pa.total_cmp(&pb).then(a.cmp(b))
    });
    axes[mid] = axis as u8;
    build_range(positions, order, axes, lo, mid);
    build_range(positions, order, axes, mid + 1, hi);
}

fn widest_axis(positions: &[Vec3], order: &[u32]) -> usize {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for &idx in order {
        let p = positions[idx as usize];
        min = min.min(p);
        max = max.max(p);
    }
    let extent = max - min;
    if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_cloud::ScalarPoint;

    fn brute_force(cloud: &PointCloud, query: Vec3) -> (usize, f32) {
        let mut best = (usize::MAX, f32::INFINITY);
        for (idx, point) in cloud.points().iter().enumerate() {
            let dist = query.distance_squared(point.position);
            if dist < best.1 {
                best = (idx, dist);
            }
        }
        (best.0, best.1.sqrt())
    }

    fn grid_cloud() -> PointCloud {
        let mut points = Vec::new();
        for x in 0..6 {
            for y in 0..5 {
                for z in 0..4 {
                    let value = (x * 100 + y * 10 + z) as f32;
                    points.push(ScalarPoint::new([x as f32, y as f32 * 0.7, z as f32 * 1.3], value));
                }
            }
        }
        PointCloud::new(points).expect("cloud")
    }

    #[test]
    fn empty_cloud_is_rejected() {
        let err = SpatialIndex::build(&PointCloud::default()).expect_err("empty");
        assert!(matches!(err, ResampleError::EmptyInput));
    }

    #[test]
    fn matches_brute_force_on_grid() {
        let cloud = grid_cloud();
        let index = SpatialIndex::build(&cloud).expect("index");
        let queries = [
            Vec3::new(0.1, 0.2, 0.3),
            Vec3::new(2.6, 1.9, 4.1),
            Vec3::new(-3.0, 10.0, 2.0),
            Vec3::new(5.2, 0.0, 3.8),
        ];
        for query in queries {
            let hit = index.nearest(query);
            let (expected, dist) = brute_force(&cloud, query);
            assert_eq!(hit.index, expected);
            assert!((hit.distance - dist).abs() < 1.0e-5);
            assert_eq!(hit.value, cloud.points()[expected].value);
        }
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let cloud = PointCloud::from_rows(&[
            [1.0, 0.0, 0.0, 10.0],
            [-1.0, 0.0, 0.0, 20.0],
            [0.0, 1.0, 0.0, 30.0],
            [0.0, -1.0, 0.0, 40.0],
        ])
        .expect("cloud");
        let index = SpatialIndex::build(&cloud).expect("index");
        let hit = index.nearest(Vec3::ZERO);
        assert_eq!(hit.index, 0);
        assert_eq!(hit.value, 10.0);
    }

    #[test]
    fn duplicate_positions_pick_lowest_index() {
        let rows: Vec<[f32; 4]> = (0..50).map(|i| [2.0, 2.0, 2.0, i as f32]).collect();
        let cloud = PointCloud::from_rows(&rows).expect("cloud");
        let index = SpatialIndex::build(&cloud).expect("index");
        assert_eq!(index.nearest(Vec3::new(2.0, 2.5, 2.0)).index, 0);
    }

    #[test]
    fn radius_limits_results() {
        let cloud = PointCloud::from_rows(&[[0.0, 0.0, 0.0, 1.0]]).expect("cloud");
        let index = SpatialIndex::build(&cloud).expect("index");
        assert!(index.nearest_within(Vec3::new(2.0, 0.0, 0.0), 1.0).is_none());
        let hit = index
            .nearest_within(Vec3::new(1.0, 0.0, 0.0), 1.0)
            .expect("inclusive radius");
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn nearest_other_skips_self() {
        let cloud = PointCloud::from_rows(&[
            [0.0, 0.0, 0.0, 1.0],
            [3.0, 0.0, 0.0, 2.0],
            [0.0, 2.0, 0.0, 3.0],
        ])
        .expect("cloud");
        let index = SpatialIndex::build(&cloud).expect("index");
        let (other, dist) = index.nearest_other(0).expect("neighbour");
        assert_eq!(other, 2);
        assert!((dist - 2.0).abs() < 1.0e-6);
        let single = PointCloud::from_rows(&[[0.0, 0.0, 0.0, 1.0]]).expect("cloud");
        let single = SpatialIndex::build(&single).expect("index");
        assert!(single.nearest_other(0).is_none());
    }
}
