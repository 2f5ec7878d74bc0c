use glam::{Mat4, Vec2, Vec3};

use crate::error::{ResampleError, ResampleResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn diagonal(&self) -> f32 {
        (self.max - self.min).length()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Triangle mesh with optional per-vertex UVs.
///
/// Inside/outside queries assume the surface is closed and consistently
/// oriented; that is a precondition, not something checked here. UV seams
/// are expressed by splitting vertices, so a watertight surface may still
/// have duplicated positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<[f32; 2]>>,
}

impl Mesh {
    pub fn new(
        positions: Vec<[f32; 3]>,
        indices: Vec<u32>,
        uvs: Option<Vec<[f32; 2]>>,
    ) -> ResampleResult<Self> {
        let mesh = Self {
            positions,
            indices,
            uvs,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn with_positions_indices(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            uvs: None,
        }
    }

    pub fn validate(&self) -> ResampleResult<()> {
        if self.indices.len() % 3 != 0 {
            return Err(ResampleError::invalid_config(format!(
                "mesh index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        if let Some(bad) = self
            .indices
            .iter()
            .position(|&idx| idx as usize >= self.positions.len())
        {
            return Err(ResampleError::invalid_config(format!(
                "triangle {} references missing vertex {}",
                bad / 3,
                self.indices[bad]
            )));
        }
        if let Some(bad) = self
            .positions
            .iter()
            .position(|p| !Vec3::from(*p).is_finite())
        {
            return Err(ResampleError::invalid_config(format!(
                "mesh vertex {bad} has a non-finite position"
            )));
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != self.positions.len() {
                return Err(ResampleError::invalid_config(format!(
                    "mesh has {} uvs for {} vertices",
                    uvs.len(),
                    self.positions.len()
                )));
            }
        }
        Ok(())
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangle_indices(&self, triangle: usize) -> Option<[usize; 3]> {
        let tri = self.indices.get(triangle * 3..triangle * 3 + 3)?;
        Some([tri[0] as usize, tri[1] as usize, tri[2] as usize])
    }

    pub fn triangle(&self, triangle: usize) -> Option<[Vec3; 3]> {
        let [i0, i1, i2] = self.triangle_indices(triangle)?;
        Some([
            Vec3::from(*self.positions.get(i0)?),
            Vec3::from(*self.positions.get(i1)?),
            Vec3::from(*self.positions.get(i2)?),
        ])
    }

    pub fn triangle_uvs(&self, triangle: usize) -> Option<[Vec2; 3]> {
        let uvs = self.uvs.as_ref()?;
        let [i0, i1, i2] = self.triangle_indices(triangle)?;
        Some([
            Vec2::from(*uvs.get(i0)?),
            Vec2::from(*uvs.get(i1)?),
            Vec2::from(*uvs.get(i2)?),
        ])
    }

    pub fn triangle_area(&self, triangle: usize) -> f32 {
        self.triangle(triangle)
            .map(|[p0, p1, p2]| 0.5 * (p1 - p0).cross(p2 - p0).length())
            .unwrap_or(0.0)
    }

    pub fn surface_area(&self) -> f32 {
        (0..self.triangle_count())
            .map(|tri| self.triangle_area(tri))
            .sum()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.positions.iter().map(|p| Vec3::from(*p)))
    }

    pub fn transform(&mut self, matrix: Mat4) {
        for position in &mut self.positions {
            *position = matrix.transform_point3(Vec3::from(*position)).to_array();
        }
        if matrix.determinant() < 0.0 {
            for tri in self.indices.chunks_exact_mut(3) {
                tri.swap(1, 2);
            }
        }
    }
}

/// Axis-aligned box centred on the origin, outward-facing, with each face
/// unwrapped to its own island of a 3x2 UV atlas.
pub fn make_box(size: [f32; 3]) -> Mesh {
    let hx = size[0] * 0.5;
    let hy = size[1] * 0.5;
    let hz = size[2] * 0.5;

    // Corners listed counter-clockwise as seen from outside.
    let faces: [[[f32; 3]; 4]; 6] = [
        [[hx, -hy, -hz], [hx, hy, -hz], [hx, hy, hz], [hx, -hy, hz]], // +X
        [[-hx, -hy, -hz], [-hx, -hy, hz], [-hx, hy, hz], [-hx, hy, -hz]], // -X
        [[-hx, hy, -hz], [-hx, hy, hz], [hx, hy, hz], [hx, hy, -hz]], // +Y
        [[-hx, -hy, -hz], [hx, -hy, -hz], [hx, -hy, hz], [-hx, -hy, hz]], // -Y
        [[-hx, -hy, hz], [hx, -hy, hz], [hx, hy, hz], [-hx, hy, hz]], // +Z
        [[-hx, -hy, -hz], [-hx, hy, -hz], [hx, hy, -hz], [hx, -hy, -hz]], // -Z
    ];
    let local = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    let pad = 0.02;
    let cell = [1.0 / 3.0, 0.5];

    let mut positions = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face_index, corners) in faces.iter().enumerate() {
        let base = positions.len() as u32;
        let col = (face_index % 3) as f32;
        let row = (face_index / 3) as f32;
        for (corner, uv) in corners.iter().zip(local) {
            positions.push(*corner);
            uvs.push([
                (col + pad + uv[0] * (1.0 - 2.0 * pad)) * cell[0],
                (row + pad + uv[1] * (1.0 - 2.0 * pad)) * cell[1],
            ]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh {
        positions,
        indices,
        uvs: Some(uvs),
    }
}

/// Latitude/longitude sphere with an equirectangular UV layout. The seam
/// column and pole rows duplicate positions.
pub fn make_uv_sphere(radius: f32, rows: u32, cols: u32) -> Mesh {
    let rows = rows.max(3);
    let cols = cols.max(3);
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();

    for r in 0..=rows {
        let v = r as f32 / rows as f32;
        let theta = v * std::f32::consts::PI;
        let sin_theta = theta.sin();
        let cos_theta = theta.cos();

        for c in 0..=cols {
            let u = c as f32 / cols as f32;
            let phi = u * std::f32::consts::TAU;
            let x = sin_theta * phi.cos();
            let y = cos_theta;
            let z = sin_theta * phi.sin();
            positions.push([x * radius, y * radius, z * radius]);
            uvs.push([u, v]);
        }
    }

    let stride = cols + 1;
    for r in 0..rows {
        for c in 0..cols {
            let i0 = r * stride + c;
            let i1 = i0 + 1;
            let i2 = i0 + stride;
            let i3 = i2 + 1;
            indices.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
        }
    }

    Mesh {
        positions,
        indices,
        uvs: Some(uvs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_for_simple_points() {
        let mesh =
            Mesh::with_positions_indices(vec![[1.0, -2.0, 0.5], [-3.0, 4.0, 2.0]], vec![]);
        let bounds = mesh.bounds().expect("bounds");
        assert_eq!(bounds.min, Vec3::new(-3.0, -2.0, 0.5));
        assert_eq!(bounds.max, Vec3::new(1.0, 4.0, 2.0));
        assert!(bounds.contains(Vec3::new(0.0, 0.0, 1.0)));
        assert!(!bounds.contains(Vec3::new(0.0, 5.0, 1.0)));
    }

    #[test]
    fn new_rejects_dangling_indices() {
        let err = Mesh::new(vec![[0.0; 3]; 3], vec![0, 1, 3], None).expect_err("dangling");
        assert!(err.to_string().contains("triangle 0"));
    }

    #[test]
    fn new_rejects_uv_count_mismatch() {
        assert!(Mesh::new(vec![[0.0; 3]; 3], vec![0, 1, 2], Some(vec![[0.0; 2]; 2])).is_err());
    }

    #[test]
    fn box_has_expected_counts_and_area() {
        let mesh = make_box([2.0, 2.0, 2.0]);
        assert_eq!(mesh.positions.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        assert!(mesh.validate().is_ok());
        assert!((mesh.surface_area() - 24.0).abs() < 1.0e-4);
    }

    #[test]
    fn box_faces_point_outward() {
        let mesh = make_box([1.0, 2.0, 3.0]);
        for tri in 0..mesh.triangle_count() {
            let [a, b, c] = mesh.triangle(tri).expect("triangle");
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "triangle {tri} faces inward");
        }
    }

    #[test]
    fn box_uv_islands_stay_in_unit_square() {
        let mesh = make_box([1.0, 1.0, 1.0]);
        for uv in mesh.uvs.as_ref().expect("uvs") {
            assert!(uv[0] > 0.0 && uv[0] < 1.0);
            assert!(uv[1] > 0.0 && uv[1] < 1.0);
        }
    }

    #[test]
    fn mirror_transform_keeps_orientation() {
        let mut mesh = make_box([1.0, 1.0, 1.0]);
        mesh.transform(Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)));
        let [a, b, c] = mesh.triangle(0).expect("triangle");
        let normal = (b - a).cross(c - a);
        assert!(normal.dot((a + b + c) / 3.0) > 0.0);
    }

    #[test]
    fn sphere_has_expected_counts() {
        let mesh = make_uv_sphere(1.0, 4, 8);
        assert_eq!(mesh.positions.len(), (4 + 1) * (8 + 1));
        assert_eq!(mesh.indices.len(), 4 * 8 * 6);
        assert_eq!(mesh.uvs.as_ref().map(Vec::len), Some(45));
    }
}
