use glam::Vec3;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::error::{ResampleError, ResampleResult};
use crate::mesh::Aabb;
use crate::spatial_index::SpatialIndex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarPoint {
    pub position: Vec3,
    pub value: f32,
}

impl ScalarPoint {
    pub fn new(position: impl Into<Vec3>, value: f32) -> Self {
        Self {
            position: position.into(),
            value,
        }
    }
}

/// Scalar samples at scattered positions. A point's identity is its index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<ScalarPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudStatistics {
    pub min_value: f32,
    pub max_value: f32,
    pub bounds: Aabb,
    /// Smallest distance between any point and its nearest other point.
    /// `None` for clouds with fewer than two distinct points.
    pub densest_spacing: Option<f32>,
}

impl CloudStatistics {
    /// Default display radius for point sprites: a tenth of the densest spacing.
    pub fn suggested_point_radius(&self) -> Option<f32> {
        self.densest_spacing.map(|spacing| spacing * 0.1)
    }
}

impl PointCloud {
    pub fn new(points: Vec<ScalarPoint>) -> ResampleResult<Self> {
        if let Some(index) = points
            .iter()
            .position(|point| !point.position.is_finite())
        {
            return Err(ResampleError::invalid_config(format!(
                "point {index} has a non-finite position"
            )));
        }
        Ok(Self { points })
    }

    /// Builds a cloud from `[x, y, z, value]` rows, the layout loaders hand over.
    pub fn from_rows(rows: &[[f32; 4]]) -> ResampleResult<Self> {
        Self::new(
            rows.iter()
                .map(|row| ScalarPoint::new([row[0], row[1], row[2]], row[3]))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ScalarPoint] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&ScalarPoint> {
        self.points.get(index)
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.points.iter().map(|point| point.position)
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.points.iter().map(|point| point.value)
    }

    /// Keeps the points at `indices`, in the order given.
    pub fn filter_by_indices(&self, indices: &[usize]) -> Self {
        Self {
            points: indices
                .iter()
                .filter_map(|&idx| self.points.get(idx).copied())
                .collect(),
        }
    }

    /// Drops points whose value is exactly zero. Solvers often write zero for
    /// cells they never touched, and those would otherwise win nearest lookups.
    pub fn without_zero_values(&self) -> Self {
        let points: Vec<ScalarPoint> = self
            .points
            .iter()
            .copied()
            .filter(|point| point.value != 0.0)
            .collect();
        tracing::info!(
            "skipped {} zero-valued points, kept {}",
            self.points.len() - points.len(),
            points.len()
        );
        Self { points }
    }

    /// Keeps `floor(len * rate)` points drawn uniformly without replacement,
    /// preserving their relative order. `seed = None` draws fresh randomness.
    pub fn downsample(&self, rate: f32, seed: Option<u64>) -> ResampleResult<Self> {
        if !rate.is_finite() || rate <= 0.0 || rate > 1.0 {
            return Err(ResampleError::invalid_config(format!(
                "sample rate must lie in (0, 1], got {rate}"
            )));
        }
        if rate >= 1.0 {
            return Ok(self.clone());
        }
        let keep = (self.points.len() as f64 * rate as f64).floor() as usize;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut kept = index::sample(&mut rng, self.points.len(), keep).into_vec();
        kept.sort_unstable();
        tracing::info!(
            "downsampled points from {} to {}",
            self.points.len(),
            kept.len()
        );
        Ok(self.filter_by_indices(&kept))
    }

    pub fn value_range(&self) -> Option<(f32, f32)> {
        let mut iter = self.points.iter().map(|point| point.value);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), value| {
            (min.min(value), max.max(value))
        }))
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions())
    }

    /// Summary used to initialise display ranges and point sizes. `index`
    /// must have been built from this cloud.
    pub fn statistics(&self, index: &SpatialIndex) -> ResampleResult<CloudStatistics> {
        let (Some((min_value, max_value)), Some(bounds)) = (self.value_range(), self.bounds())
        else {
            return Err(ResampleError::EmptyInput);
        };
        let densest_spacing = (0..self.points.len())
            .filter_map(|idx| index.nearest_other(idx))
            .map(|(_, distance)| distance)
            .filter(|distance| *distance > 0.0)
            .reduce(f32::min);
        Ok(CloudStatistics {
            min_value,
            max_value,
            bounds,
            densest_spacing,
        })
    }
}
