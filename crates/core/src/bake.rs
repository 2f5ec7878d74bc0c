use glam::Vec2;

use crate::error::{ResampleError, ResampleResult};
use crate::mesh::Mesh;
use crate::mesh_query::SurfacePoint;
use crate::parallel;
use crate::spatial_index::SpatialIndex;

/// How far outside `[0, 1]` a UV coordinate may drift before it is treated
/// as an authoring defect instead of float noise.
pub const UV_TOLERANCE: f32 = 1.0e-4;

/// Row-major texture-space raster, `index = y * width + x`. Invalid texels
/// store `NaN` and read back as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct UvRaster {
    width: usize,
    height: usize,
    values: Vec<f32>,
    counts: Vec<u32>,
    valid: Vec<bool>,
}

impl UvRaster {
    /// A raster with every texel invalid.
    pub fn new(width: usize, height: usize) -> ResampleResult<Self> {
        validate_size(width, height)?;
        let len = width * height;
        Ok(Self {
            width,
            height,
            values: vec![f32::NAN; len],
            counts: vec![0; len],
            valid: vec![false; len],
        })
    }

    /// Builds a raster from per-texel cells, `None` meaning invalid.
    pub fn from_cells(
        width: usize,
        height: usize,
        cells: Vec<Option<f32>>,
    ) -> ResampleResult<Self> {
        validate_size(width, height)?;
        if cells.len() != width * height {
            return Err(ResampleError::invalid_config(format!(
                "raster {width}x{height} needs {} cells, got {}",
                width * height,
                cells.len()
            )));
        }
        let counts = cells.iter().map(|cell| u32::from(cell.is_some())).collect();
        Ok(Self::from_parts(width, height, cells, counts))
    }

    pub(crate) fn from_parts(
        width: usize,
        height: usize,
        cells: Vec<Option<f32>>,
        counts: Vec<u32>,
    ) -> Self {
        let valid = cells.iter().map(Option::is_some).collect();
        let values = cells
            .into_iter()
            .map(|cell| cell.unwrap_or(f32::NAN))
            .collect();
        Self {
            width,
            height,
            values,
            counts,
            valid,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn texel_index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then_some(y * self.width + x)
    }

    pub fn value(&self, x: usize, y: usize) -> Option<f32> {
        self.texel_index(x, y).and_then(|idx| self.cell(idx))
    }

    pub fn cell(&self, idx: usize) -> Option<f32> {
        self.valid
            .get(idx)
            .copied()
            .unwrap_or(false)
            .then(|| self.values[idx])
    }

    /// Number of samples that landed on the texel. Texels filled by
    /// denoising keep a count of zero.
    pub fn count(&self, x: usize, y: usize) -> u32 {
        self.texel_index(x, y)
            .map(|idx| self.counts[idx])
            .unwrap_or(0)
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.texel_index(x, y)
            .map(|idx| self.valid[idx])
            .unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|valid| **valid).count()
    }

    /// Raw texel values with `NaN` for invalid texels, ready for upload.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn cells(&self) -> impl Iterator<Item = Option<f32>> + '_ {
        (0..self.len()).map(|idx| self.cell(idx))
    }

    /// Copy with every texel outside `mask` invalidated.
    pub fn masked(&self, mask: &UvMask) -> ResampleResult<Self> {
        if mask.width != self.width || mask.height != self.height {
            return Err(ResampleError::invalid_config(format!(
                "mask {}x{} does not match raster {}x{}",
                mask.width, mask.height, self.width, self.height
            )));
        }
        let cells = self
            .cells()
            .zip(&mask.covered)
            .map(|(cell, covered)| if *covered { cell } else { None })
            .collect();
        let counts = self
            .counts
            .iter()
            .zip(&mask.covered)
            .map(|(count, covered)| if *covered { *count } else { 0 })
            .collect();
        Ok(Self::from_parts(self.width, self.height, cells, counts))
    }
}

/// Texels of a UV atlas that some mesh triangle covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UvMask {
    width: usize,
    height: usize,
    covered: Vec<bool>,
}

impl UvMask {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_covered(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.covered[y * self.width + x]
    }

    pub fn covered_count(&self) -> usize {
        self.covered.iter().filter(|covered| **covered).count()
    }
}

/// Nearest-neighbour bake of surface samples into a fresh raster.
///
/// Each sample takes the value of its nearest data point and lands on texel
/// `(floor(u * width), floor(v * height))`, clamped to the raster. Texels hit
/// by several samples average them; texels hit by none stay invalid. The
/// integer texel mapping is deliberately lossy: nearby samples collide and
/// seams can split a texel between islands.
pub fn bake(
    samples: impl IntoIterator<Item = SurfacePoint>,
    index: &SpatialIndex,
    size: (usize, usize),
) -> ResampleResult<UvRaster> {
    let (width, height) = size;
    validate_size(width, height)?;
    let samples: Vec<SurfacePoint> = samples.into_iter().collect();

    let resolved = parallel::try_map_indexed(&samples, |idx, sample| {
        let texel = texel_for_uv(sample.uv, width, height).ok_or(ResampleError::OutOfRange {
            sample: idx,
            uv: sample.uv.to_array(),
        })?;
        Ok::<_, ResampleError>((texel, index.nearest(sample.position).value))
    })?;

    let mut sums = vec![0.0f64; width * height];
    let mut counts = vec![0u32; width * height];
    for (texel, value) in resolved {
        sums[texel] += value as f64;
        counts[texel] += 1;
    }
    let cells = sums
        .iter()
        .zip(&counts)
        .map(|(sum, count)| (*count > 0).then(|| (*sum / *count as f64) as f32))
        .collect();
    let raster = UvRaster::from_parts(width, height, cells, counts);
    tracing::info!(
        "baked {} samples into {} of {} texels",
        samples.len(),
        raster.valid_count(),
        raster.len()
    );
    Ok(raster)
}

/// Bakes `fill_value` onto every texel a sample lands on, showing how densely
/// the current sampling covers the atlas.
pub fn bake_preview(
    samples: impl IntoIterator<Item = SurfacePoint>,
    size: (usize, usize),
    fill_value: f32,
) -> ResampleResult<UvRaster> {
    let (width, height) = size;
    validate_size(width, height)?;
    let mut counts = vec![0u32; width * height];
    for (idx, sample) in samples.into_iter().enumerate() {
        let texel = texel_for_uv(sample.uv, width, height).ok_or(ResampleError::OutOfRange {
            sample: idx,
            uv: sample.uv.to_array(),
        })?;
        counts[texel] += 1;
    }
    let cells = counts
        .iter()
        .map(|count| (*count > 0).then_some(fill_value))
        .collect();
    Ok(UvRaster::from_parts(width, height, cells, counts))
}

/// Marks texels whose centre falls inside a UV triangle, plus the texel
/// holding each UV vertex so slivers thinner than a texel still register.
pub fn uv_coverage_mask(mesh: &Mesh, width: usize, height: usize) -> ResampleResult<UvMask> {
    validate_size(width, height)?;
    if mesh.uvs.is_none() {
        return Err(ResampleError::MissingUvs);
    }
    let scale = Vec2::new(width as f32, height as f32);
    let mut covered = vec![false; width * height];

    for tri in 0..mesh.triangle_count() {
        let Some(uvs) = mesh.triangle_uvs(tri) else {
            continue;
        };
        let corners = uvs.map(|uv| uv * scale);
        for corner in corners {
            if corner.is_finite() {
                let x = (corner.x.floor().max(0.0) as usize).min(width - 1);
                let y = (corner.y.floor().max(0.0) as usize).min(height - 1);
                covered[y * width + x] = true;
            }
        }

        let lo = corners[0].min(corners[1]).min(corners[2]);
        let hi = corners[0].max(corners[1]).max(corners[2]);
        if !lo.is_finite() || !hi.is_finite() {
            continue;
        }
        let x0 = (lo.x - 0.5).ceil().max(0.0) as usize;
        let y0 = (lo.y - 0.5).ceil().max(0.0) as usize;
        let x1 = ((hi.x - 0.5).floor().max(-1.0) as isize).min(width as isize - 1);
        let y1 = ((hi.y - 0.5).floor().max(-1.0) as isize).min(height as isize - 1);
        for y in y0 as isize..=y1 {
            for x in x0 as isize..=x1 {
                let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                if point_in_triangle(center, corners) {
                    covered[y as usize * width + x as usize] = true;
                }
            }
        }
    }

    let mask = UvMask {
        width,
        height,
        covered,
    };
    tracing::debug!(
        "uv coverage {} of {} texels",
        mask.covered_count(),
        width * height
    );
    Ok(mask)
}

fn validate_size(width: usize, height: usize) -> ResampleResult<()> {
    if width == 0 || height == 0 {
        return Err(ResampleError::invalid_config(format!(
            "raster size must be positive, got {width}x{height}"
        )));
    }
    Ok(())
}

fn texel_for_uv(uv: Vec2, width: usize, height: usize) -> Option<usize> {
    let in_range = |c: f32| c.is_finite() && (-UV_TOLERANCE..=1.0 + UV_TOLERANCE).contains(&c);
    if !in_range(uv.x) || !in_range(uv.y) {
        return None;
    }
    let uv = uv.clamp(Vec2::ZERO, Vec2::ONE);
    let x = ((uv.x * width as f32).floor() as usize).min(width - 1);
    let y = ((uv.y * height as f32).floor() as usize).min(height - 1);
    Some(y * width + x)
}

fn point_in_triangle(p: Vec2, [a, b, c]: [Vec2; 3]) -> bool {
    let edge = |from: Vec2, to: Vec2| (to - from).perp_dot(p - from);
    let d0 = edge(a, b);
    let d1 = edge(b, c);
    let d2 = edge(c, a);
    let has_neg = d0 < 0.0 || d1 < 0.0 || d2 < 0.0;
    let has_pos = d0 > 0.0 || d1 > 0.0 || d2 > 0.0;
    !(has_neg && has_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::make_box;
    use crate::point_cloud::PointCloud;
    use glam::Vec3;

    fn sample_at(position: [f32; 3], uv: [f32; 2]) -> SurfacePoint {
        SurfacePoint {
            position: Vec3::from(position),
            uv: Vec2::from(uv),
            triangle: 0,
        }
    }

    fn index() -> SpatialIndex {
        let cloud = PointCloud::from_rows(&[[0.0, 0.0, 0.0, 2.0], [10.0, 0.0, 0.0, 4.0]])
            .expect("cloud");
        SpatialIndex::build(&cloud).expect("index")
    }

    #[test]
    fn colliding_samples_average() {
        let samples = [
            sample_at([0.1, 0.0, 0.0], [0.3, 0.3]),
            sample_at([9.9, 0.0, 0.0], [0.45, 0.4]),
        ];
        let raster = bake(samples, &index(), (4, 4)).expect("bake");
        assert_eq!(raster.value(1, 1), Some(3.0));
        assert_eq!(raster.count(1, 1), 2);
        assert_eq!(raster.valid_count(), 1);
        assert_eq!(raster.value(0, 0), None);
        assert!(raster.values()[0].is_nan());
    }

    #[test]
    fn empty_bake_is_all_invalid() {
        let raster = bake(Vec::<SurfacePoint>::new(), &index(), (8, 2)).expect("bake");
        assert_eq!(raster.len(), 16);
        assert_eq!(raster.valid_count(), 0);
    }

    #[test]
    fn uv_one_lands_on_last_texel() {
        let raster = bake([sample_at([0.0; 3], [1.0, 1.0])], &index(), (4, 4)).expect("bake");
        assert_eq!(raster.value(3, 3), Some(2.0));
    }

    #[test]
    fn uv_within_tolerance_is_clamped() {
        let raster =
            bake([sample_at([0.0; 3], [-5.0e-5, 1.00005])], &index(), (4, 4)).expect("bake");
        assert!(raster.is_valid(0, 3));
    }

    #[test]
    fn uv_far_outside_reports_sample() {
        let samples = [
            sample_at([0.0; 3], [0.5, 0.5]),
            sample_at([0.0; 3], [1.5, 0.5]),
        ];
        let err = bake(samples, &index(), (4, 4)).expect_err("out of range");
        assert!(matches!(err, ResampleError::OutOfRange { sample: 1, .. }));
    }

    #[test]
    fn new_raster_starts_invalid() {
        let raster = UvRaster::new(3, 2).expect("raster");
        assert_eq!(raster.len(), 6);
        assert_eq!(raster.valid_count(), 0);
        assert_eq!(raster.value(2, 1), None);
        assert_eq!(raster.value(3, 0), None);
    }

    #[test]
    fn zero_size_is_invalid() {
        let err = bake(Vec::<SurfacePoint>::new(), &index(), (0, 4)).expect_err("size");
        assert!(matches!(err, ResampleError::InvalidConfig(_)));
    }

    #[test]
    fn preview_fills_touched_texels() {
        let samples = [
            sample_at([0.0; 3], [0.1, 0.1]),
            sample_at([0.0; 3], [0.9, 0.1]),
            sample_at([0.0; 3], [0.95, 0.05]),
        ];
        let raster = bake_preview(samples, (2, 2), 0.5).expect("preview");
        assert_eq!(raster.value(0, 0), Some(0.5));
        assert_eq!(raster.count(1, 0), 2);
        assert_eq!(raster.value(1, 1), None);
    }

    #[test]
    fn box_mask_covers_islands_but_not_gutters() {
        let mask = uv_coverage_mask(&make_box([1.0, 1.0, 1.0]), 300, 200).expect("mask");
        assert!(mask.is_covered(50, 50));
        assert!(mask.is_covered(250, 150));
        // Island borders sit on the 1/3 and 1/2 lines; the padding leaves them empty.
        assert!(!mask.is_covered(100, 50));
        assert!(!mask.is_covered(50, 100));
        assert!(mask.covered_count() < 300 * 200);
    }

    #[test]
    fn masked_invalidates_uncovered_texels() {
        let raster = UvRaster::from_cells(2, 1, vec![Some(1.0), Some(2.0)]).expect("raster");
        let mask = UvMask {
            width: 2,
            height: 1,
            covered: vec![true, false],
        };
        let masked = raster.masked(&mask).expect("masked");
        assert_eq!(masked.value(0, 0), Some(1.0));
        assert_eq!(masked.value(1, 0), None);
        assert_eq!(masked.count(1, 0), 0);
    }

    #[test]
    fn mask_requires_uvs() {
        let mesh = Mesh::with_positions_indices(vec![[0.0; 3]; 3], vec![0, 1, 2]);
        assert!(matches!(
            uv_coverage_mask(&mesh, 4, 4),
            Err(ResampleError::MissingUvs)
        ));
    }
}
