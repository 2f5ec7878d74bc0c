//! Inside/outside classification and area-uniform surface sampling.

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bvh::TriangleBvh;
use crate::error::{ResampleError, ResampleResult};
use crate::mesh::{Aabb, Mesh};

/// Fixed, deliberately non-axis-aligned ray directions tried in order.
const RAY_DIRECTIONS: [[f32; 3]; 3] = [
    [0.267_261_24, 0.534_522_5, 0.801_783_7],
    [-0.613_139_6, 0.371_587_6, 0.697_001_8],
    [0.439_152_6, -0.806_108_4, 0.396_641_3],
];
pub const MAX_RAY_ATTEMPTS: usize = RAY_DIRECTIONS.len();

const BARY_EPSILON: f32 = 1.0e-5;
const PARALLEL_EPSILON: f32 = 1.0e-7;
const DISTANCE_EPSILON: f32 = 1.0e-6;
const MAX_SURFACE_SAMPLES: f64 = 1.0e9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub uv: Vec2,
    pub triangle: usize,
}

enum Crossing {
    Miss,
    Hit(i32),
    Degenerate,
}

/// Query structure derived from a [`Mesh`]. Owns its own copy of the
/// triangles, so it stays valid after the mesh is dropped and must be
/// rebuilt if the mesh changes.
#[derive(Debug, Clone)]
pub struct MeshQuery {
    triangles: Vec<[Vec3; 3]>,
    triangle_uvs: Option<Vec<[Vec2; 3]>>,
    cumulative_area: Vec<f64>,
    bounds: Option<Aabb>,
    length_epsilon: f32,
    bvh: TriangleBvh,
}

impl MeshQuery {
    pub fn new(mesh: &Mesh) -> ResampleResult<Self> {
        mesh.validate()?;
        let triangles: Vec<[Vec3; 3]> = (0..mesh.triangle_count())
            .filter_map(|tri| mesh.triangle(tri))
            .collect();
        let triangle_uvs = mesh.uvs.as_ref().map(|_| {
            (0..mesh.triangle_count())
                .filter_map(|tri| mesh.triangle_uvs(tri))
                .collect()
        });

        let cumulative_area = cumulative_areas(&triangles);

        let bounds = mesh.bounds();
        let length_epsilon = bounds
            .map(|bounds| bounds.diagonal().max(1.0) * DISTANCE_EPSILON)
            .unwrap_or(DISTANCE_EPSILON);
        let bvh = TriangleBvh::build(&triangles);
        tracing::debug!("mesh query over {} triangles", triangles.len());

        Ok(Self {
            triangles,
            triangle_uvs,
            cumulative_area,
            bounds,
            length_epsilon,
            bvh,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn surface_area(&self) -> f32 {
        self.total_area() as f32
    }

    fn total_area(&self) -> f64 {
        self.cumulative_area.last().copied().unwrap_or(0.0)
    }

    /// Ray-parity inside test. Each attempt casts a ray in one of the fixed
    /// directions and sums signed crossings; a non-zero sum means inside.
    /// Attempts that graze an edge or vertex are discarded and the next
    /// direction is tried; if every attempt is degenerate the query fails with
    /// [`ResampleError::AmbiguousGeometry`] naming the last offending triangle.
    pub fn is_inside(&self, position: Vec3) -> ResampleResult<bool> {
        let Some(bounds) = self.bounds else {
            return Ok(false);
        };
        let pad = Vec3::splat(self.length_epsilon);
        if !Aabb::contains(
            &Aabb {
                min: bounds.min - pad,
                max: bounds.max + pad,
            },
            position,
        ) {
            return Ok(false);
        }

        let mut last_degenerate = 0usize;
        for dir in RAY_DIRECTIONS {
            match self.winding_along(position, Vec3::from(dir)) {
                Ok(winding) => return Ok(winding != 0),
                Err(triangle) => last_degenerate = triangle,
            }
        }
        Err(ResampleError::AmbiguousGeometry {
            point: None,
            triangle: last_degenerate,
            attempts: MAX_RAY_ATTEMPTS,
        })
    }

    /// Signed crossing count along one ray, or the index of a triangle the
    /// ray grazed.
    fn winding_along(&self, origin: Vec3, dir: Vec3) -> Result<i32, usize> {
        let mut winding = 0i32;
        let mut degenerate = None;
        self.bvh.visit_ray(origin, dir, |tri| {
            match self.crossing(origin, dir, tri) {
                Crossing::Miss => {}
                Crossing::Hit(sign) => winding += sign,
                Crossing::Degenerate => {
                    degenerate = Some(tri);
                    return false;
                }
            }
            true
        });
        match degenerate {
            Some(tri) => Err(tri),
            None => Ok(winding),
        }
    }

    fn crossing(&self, origin: Vec3, dir: Vec3, tri: usize) -> Crossing {
        let [a, b, c] = self.triangles[tri];
        let edge1 = b - a;
        let edge2 = c - a;
        let normal = edge1.cross(edge2);
        let scale = normal.length();
        if scale <= f32::EPSILON * edge1.length_squared().max(edge2.length_squared()) {
            return Crossing::Miss;
        }

        let h = dir.cross(edge2);
        let det = edge1.dot(h);
        let s = origin - a;
        if det.abs() <= PARALLEL_EPSILON * scale {
            let plane_distance = normal.dot(s) / scale;
            return if plane_distance.abs() <= self.length_epsilon {
                Crossing::Degenerate
            } else {
                Crossing::Miss
            };
        }

        let inv_det = 1.0 / det;
        let u = s.dot(h) * inv_det;
        let q = s.cross(edge1);
        let v = dir.dot(q) * inv_det;
        if u < -BARY_EPSILON || v < -BARY_EPSILON || u + v > 1.0 + BARY_EPSILON {
            return Crossing::Miss;
        }
        let t = edge2.dot(q) * inv_det;
        if t < -self.length_epsilon {
            return Crossing::Miss;
        }
        if t <= self.length_epsilon {
            // The query point sits on the surface.
            return Crossing::Degenerate;
        }
        if u < BARY_EPSILON || v < BARY_EPSILON || u + v > 1.0 - BARY_EPSILON {
            return Crossing::Degenerate;
        }
        // det = -dir . normal, so exiting an outward-facing triangle counts +1.
        Crossing::Hit(if det < 0.0 { 1 } else { -1 })
    }

    /// Draws `ceil(area * points_per_unit_area)` surface points, each on a
    /// triangle chosen with probability proportional to its area. The same
    /// seed over the same mesh reproduces the sequence; `None` draws fresh
    /// randomness.
    pub fn sample_surface(
        &self,
        points_per_unit_area: f32,
        seed: Option<u64>,
    ) -> ResampleResult<SurfaceSamples<'_>> {
        if !points_per_unit_area.is_finite() || points_per_unit_area <= 0.0 {
            return Err(ResampleError::invalid_config(format!(
                "points per unit area must be positive, got {points_per_unit_area}"
            )));
        }
        let Some(triangle_uvs) = self.triangle_uvs.as_deref() else {
            return Err(ResampleError::MissingUvs);
        };
        let expected = (self.total_area() * points_per_unit_area as f64).ceil();
        if expected > MAX_SURFACE_SAMPLES {
            return Err(ResampleError::invalid_config(format!(
                "sampling density requests {expected} surface points"
            )));
        }
        let total = if self.total_area() > 0.0 {
            expected as usize
        } else {
            0
        };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        tracing::debug!(
            "sampling {} surface points over area {:.4}",
            total,
            self.surface_area()
        );
        Ok(SurfaceSamples {
            query: self,
            triangle_uvs,
            rng,
            remaining: total,
        })
    }
}

/// Lazy, finite stream of surface samples. Consuming it advances its own
/// random state; sampling again means calling
/// [`MeshQuery::sample_surface`] again.
pub struct SurfaceSamples<'a> {
    query: &'a MeshQuery,
    triangle_uvs: &'a [[Vec2; 3]],
    rng: StdRng,
    remaining: usize,
}

impl Iterator for SurfaceSamples<'_> {
    type Item = SurfacePoint;

    fn next(&mut self) -> Option<SurfacePoint> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let pick = self.rng.gen::<f64>() * self.query.total_area();
        let triangle = find_area_index(&self.query.cumulative_area, pick);
        let [p0, p1, p2] = self.query.triangles[triangle];
        let [t0, t1, t2] = self.triangle_uvs[triangle];

        let mut u = self.rng.gen::<f32>();
        let mut v = self.rng.gen::<f32>();
        if u + v > 1.0 {
            u = 1.0 - u;
            v = 1.0 - v;
        }
        let w = 1.0 - u - v;
        Some(SurfacePoint {
            position: p0 * w + p1 * u + p2 * v,
            uv: t0 * w + t1 * u + t2 * v,
            triangle,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SurfaceSamples<'_> {}

/// Running triangle area sums. Kept in f64 so small triangles late in a large
/// mesh still add a nonzero share.
fn cumulative_areas(triangles: &[[Vec3; 3]]) -> Vec<f64> {
    let mut total = 0.0f64;
    triangles
        .iter()
        .map(|[p0, p1, p2]| {
            total += 0.5 * (*p1 - *p0).cross(*p2 - *p0).length() as f64;
            total
        })
        .collect()
}

/// First index whose cumulative area exceeds `sample`; zero-area triangles
/// are never selected.
fn find_area_index(cumulative: &[f64], sample: f64) -> usize {
    let mut lo = 0usize;
    let mut hi = cumulative.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if sample < cumulative[mid] {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo.min(cumulative.len().saturating_sub(1))
}
