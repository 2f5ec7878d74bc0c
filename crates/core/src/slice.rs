use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{ResampleError, ResampleResult};
use crate::mesh::Mesh;
use crate::parallel;
use crate::spatial_index::SpatialIndex;

const AXIS_TOLERANCE: f32 = 1.0e-3;

/// Oriented rectangle sampled on a regular grid. Row `i` advances along
/// `row_axis` across `height`; column `j` advances along `col_axis` across
/// `width`. `origin` is the `(0, 0)` corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceFrame {
    pub origin: Vec3,
    pub row_axis: Vec3,
    pub col_axis: Vec3,
    pub width: f32,
    pub height: f32,
    pub rows: usize,
    pub cols: usize,
}

impl SliceFrame {
    /// Frame whose grid is centred on `center` and lies in the plane with the
    /// given normal. A `+Z` normal yields columns along `+X` and rows along
    /// `+Y`.
    pub fn centered(
        center: Vec3,
        normal: Vec3,
        width: f32,
        height: f32,
        rows: usize,
        cols: usize,
    ) -> ResampleResult<Self> {
        let normal = normal.try_normalize().ok_or_else(|| {
            ResampleError::invalid_config("slice normal must be a non-zero finite vector")
        })?;
        let up = if normal.y.abs() < 0.99 { Vec3::Y } else { Vec3::X };
        let col_axis = up.cross(normal).normalize();
        let row_axis = normal.cross(col_axis).normalize();
        let frame = Self {
            origin: center - row_axis * (height * 0.5) - col_axis * (width * 0.5),
            row_axis,
            col_axis,
            width,
            height,
            rows,
            cols,
        };
        frame.validate()?;
        Ok(frame)
    }

    pub fn validate(&self) -> ResampleResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ResampleError::invalid_config(format!(
                "slice resolution must be positive, got {}x{}",
                self.rows, self.cols
            )));
        }
        if !(self.width.is_finite() && self.width >= 0.0)
            || !(self.height.is_finite() && self.height >= 0.0)
        {
            return Err(ResampleError::invalid_config(format!(
                "slice extent must be finite and non-negative, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.origin.is_finite() {
            return Err(ResampleError::invalid_config("slice origin is not finite"));
        }
        let unit = |axis: Vec3| axis.is_finite() && (axis.length() - 1.0).abs() <= AXIS_TOLERANCE;
        if !unit(self.row_axis)
            || !unit(self.col_axis)
            || self.row_axis.dot(self.col_axis).abs() > AXIS_TOLERANCE
        {
            return Err(ResampleError::invalid_config(
                "slice axes must be orthonormal",
            ));
        }
        Ok(())
    }

    pub fn normal(&self) -> Vec3 {
        self.col_axis.cross(self.row_axis)
    }

    pub fn row_step(&self) -> f32 {
        self.height / self.rows.saturating_sub(1).max(1) as f32
    }

    pub fn col_step(&self) -> f32 {
        self.width / self.cols.saturating_sub(1).max(1) as f32
    }

    pub fn position(&self, row: usize, col: usize) -> Vec3 {
        self.origin
            + self.row_axis * (row as f32 * self.row_step())
            + self.col_axis * (col as f32 * self.col_step())
    }

    /// The slice plane as a display mesh: grid positions as vertices, two
    /// triangles per grid quad, UVs spanning the unit square.
    pub fn triangulate(&self) -> ResampleResult<Mesh> {
        self.validate()?;
        let mut positions = Vec::with_capacity(self.rows * self.cols);
        let mut uvs = Vec::with_capacity(self.rows * self.cols);
        let u_den = self.cols.saturating_sub(1).max(1) as f32;
        let v_den = self.rows.saturating_sub(1).max(1) as f32;
        for row in 0..self.rows {
            for col in 0..self.cols {
                positions.push(self.position(row, col).to_array());
                uvs.push([col as f32 / u_den, row as f32 / v_den]);
            }
        }

        let mut indices = Vec::new();
        let stride = self.cols as u32;
        for row in 0..self.rows.saturating_sub(1) as u32 {
            for col in 0..self.cols.saturating_sub(1) as u32 {
                let i0 = row * stride + col;
                let i1 = i0 + 1;
                let i2 = i0 + stride;
                let i3 = i2 + 1;
                indices.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
            }
        }
        Mesh::new(positions, indices, Some(uvs))
    }
}

/// Row-major grid of sample positions with reconstructed values.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    pub rows: usize,
    pub cols: usize,
    pub positions: Vec<Vec3>,
    /// `None` where no data point lies within the query radius.
    pub values: Vec<Option<f32>>,
}

impl SampleGrid {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, row: usize, col: usize) -> Option<Vec3> {
        self.cell_index(row, col).map(|idx| self.positions[idx])
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        self.cell_index(row, col).and_then(|idx| self.values[idx])
    }

    fn cell_index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then_some(row * self.cols + col)
    }
}

/// Nearest-neighbour reconstruction of the field on every grid position.
/// Identical frames over the same index produce identical grids.
pub fn sample(frame: &SliceFrame, index: &SpatialIndex) -> ResampleResult<SampleGrid> {
    sample_with(frame, index, None)
}

/// Like [`sample`], but cells farther than `radius` from every data point
/// are left empty.
pub fn sample_within(
    frame: &SliceFrame,
    index: &SpatialIndex,
    radius: f32,
) -> ResampleResult<SampleGrid> {
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ResampleError::invalid_config(format!(
            "slice query radius must be positive, got {radius}"
        )));
    }
    sample_with(frame, index, Some(radius))
}

fn sample_with(
    frame: &SliceFrame,
    index: &SpatialIndex,
    radius: Option<f32>,
) -> ResampleResult<SampleGrid> {
    frame.validate()?;
    let mut positions = vec![Vec3::ZERO; frame.rows * frame.cols];
    parallel::for_each_indexed_mut(&mut positions, |idx, position| {
        *position = frame.position(idx / frame.cols, idx % frame.cols);
    });

    let mut values = vec![None; positions.len()];
    parallel::for_each_indexed_mut(&mut values, |idx, value| {
        let position = positions[idx];
        *value = match radius {
            Some(radius) => index.nearest_within(position, radius).map(|hit| hit.value),
            None => Some(index.nearest(position).value),
        };
    });

    tracing::debug!("sampled {}x{} slice", frame.rows, frame.cols);
    Ok(SampleGrid {
        rows: frame.rows,
        cols: frame.cols,
        positions,
        values,
    })
}
