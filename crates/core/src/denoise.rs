use serde::{Deserialize, Serialize};

use crate::bake::UvRaster;
use crate::error::{ResampleError, ResampleResult};
use crate::parallel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiseMode {
    Nearest,
    Gaussian,
    #[default]
    NearestAndGaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    pub mode: DenoiseMode,
    /// Search radius in texels, shared by both passes.
    pub max_distance: f32,
    /// Gaussian standard deviation in texels.
    pub sigma: f32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            mode: DenoiseMode::NearestAndGaussian,
            max_distance: 4.0,
            sigma: 1.0,
        }
    }
}

impl DenoiseConfig {
    pub fn nearest(max_distance: f32) -> Self {
        Self {
            mode: DenoiseMode::Nearest,
            max_distance,
            ..Self::default()
        }
    }

    pub fn gaussian(max_distance: f32, sigma: f32) -> Self {
        Self {
            mode: DenoiseMode::Gaussian,
            max_distance,
            sigma,
        }
    }

    pub fn validate(&self) -> ResampleResult<()> {
        if !self.max_distance.is_finite() || self.max_distance <= 0.0 {
            return Err(ResampleError::invalid_config(format!(
                "denoise max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        let uses_gaussian = matches!(
            self.mode,
            DenoiseMode::Gaussian | DenoiseMode::NearestAndGaussian
        );
        if uses_gaussian && (!self.sigma.is_finite() || self.sigma <= 0.0) {
            return Err(ResampleError::invalid_config(format!(
                "denoise sigma must be positive, got {}",
                self.sigma
            )));
        }
        Ok(())
    }
}

/// Produces a cleaned copy of `raster`; the input is never touched.
///
/// The nearest pass fills invalid texels from the closest valid texel within
/// `max_distance` (Chebyshev rings), so separate UV islands only bleed into
/// each other across gaps narrower than that. The Gaussian pass is a
/// normalized convolution over valid texels; it never turns an invalid texel
/// valid.
pub fn denoise(raster: &UvRaster, config: &DenoiseConfig) -> ResampleResult<UvRaster> {
    config.validate()?;
    let result = match config.mode {
        DenoiseMode::Nearest => nearest_fill(raster, config.max_distance),
        DenoiseMode::Gaussian => gaussian_blur(raster, config.max_distance, config.sigma),
        DenoiseMode::NearestAndGaussian => {
            let filled = nearest_fill(raster, config.max_distance);
            gaussian_blur(&filled, config.max_distance, config.sigma)
        }
    };
    tracing::debug!(
        "denoise {:?}: {} -> {} valid texels",
        config.mode,
        raster.valid_count(),
        result.valid_count()
    );
    Ok(result)
}

fn nearest_fill(raster: &UvRaster, max_distance: f32) -> UvRaster {
    let (width, height) = (raster.width(), raster.height());
    let reach = (max_distance.floor() as usize).min(width.max(height));
    let mut cells: Vec<Option<f32>> = raster.cells().collect();
    parallel::for_each_indexed_mut(&mut cells, |idx, cell| {
        if cell.is_none() {
            *cell = nearest_valid(raster, idx % width, idx / width, reach);
        }
    });
    UvRaster::from_parts(width, height, cells, raster.counts().to_vec())
}

/// Value of the valid texel on the innermost non-empty Chebyshev ring. Ties on
/// a ring go to the smallest Euclidean offset, then the lowest texel index.
fn nearest_valid(raster: &UvRaster, x: usize, y: usize, reach: usize) -> Option<f32> {
    let (x, y) = (x as isize, y as isize);
    for ring in 1..=reach as isize {
        let mut best: Option<(isize, usize, f32)> = None;
        for dy in -ring..=ring {
            // Inner rows of the ring only touch its left and right edges.
            let step = if dy.abs() == ring { 1 } else { 2 * ring as usize };
            for dx in (-ring..=ring).step_by(step) {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 {
                    continue;
                }
                let Some(idx) = raster.texel_index(nx as usize, ny as usize) else {
                    continue;
                };
                let Some(value) = raster.cell(idx) else {
                    continue;
                };
                let key = (dx * dx + dy * dy, idx);
                if best.map_or(true, |(d, i, _)| key < (d, i)) {
                    best = Some((key.0, key.1, value));
                }
            }
        }
        if let Some((_, _, value)) = best {
            return Some(value);
        }
    }
    None
}

fn gaussian_blur(raster: &UvRaster, max_distance: f32, sigma: f32) -> UvRaster {
    let (width, height) = (raster.width(), raster.height());
    let kernel = gaussian_kernel(max_distance.min(width.max(height) as f32), sigma);
    let mut cells: Vec<Option<f32>> = raster.cells().collect();
    parallel::for_each_indexed_mut(&mut cells, |idx, cell| {
        if cell.is_none() {
            return;
        }
        let (x, y) = ((idx % width) as isize, (idx / width) as isize);
        let mut sum = 0.0f64;
        let mut weight_sum = 0.0f64;
        for &(dx, dy, weight) in &kernel {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 {
                continue;
            }
            if let Some(value) = raster.value(nx as usize, ny as usize) {
                sum += weight * value as f64;
                weight_sum += weight;
            }
        }
        if weight_sum > 0.0 {
            *cell = Some((sum / weight_sum) as f32);
        }
    });
    UvRaster::from_parts(width, height, cells, raster.counts().to_vec())
}

/// Offsets inside the disc of radius `max_distance`, with unnormalized
/// weights `exp(-d² / 2σ²)`.
fn gaussian_kernel(max_distance: f32, sigma: f32) -> Vec<(isize, isize, f64)> {
    let reach = max_distance.floor() as isize;
    let radius_sq = (max_distance as f64).powi(2);
    let denom = 2.0 * (sigma as f64).powi(2);
    let mut kernel = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let dist_sq = (dx * dx + dy * dy) as f64;
            if dist_sq <= radius_sq {
                kernel.push((dx, dy, (-dist_sq / denom).exp()));
            }
        }
    }
    kernel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_valid(width: usize, height: usize, x: usize, y: usize, value: f32) -> UvRaster {
        let mut cells = vec![None; width * height];
        cells[y * width + x] = Some(value);
        UvRaster::from_cells(width, height, cells).expect("raster")
    }

    #[test]
    fn nearest_fills_chebyshev_ring() {
        let raster = single_valid(4, 4, 0, 0, 7.0);
        let filled = denoise(&raster, &DenoiseConfig::nearest(1.0)).expect("denoise");
        assert_eq!(filled.value(1, 0), Some(7.0));
        assert_eq!(filled.value(0, 1), Some(7.0));
        assert_eq!(filled.value(1, 1), Some(7.0));
        assert_eq!(filled.value(2, 0), None);
        assert_eq!(filled.value(2, 2), None);
        assert_eq!(filled.valid_count(), 4);
        assert_eq!(raster.valid_count(), 1);
    }

    #[test]
    fn nearest_prefers_closer_texel() {
        let cells = vec![Some(1.0), None, None, None, Some(9.0)];
        let raster = UvRaster::from_cells(5, 1, cells).expect("raster");
        let filled = denoise(&raster, &DenoiseConfig::nearest(3.0)).expect("denoise");
        assert_eq!(filled.value(1, 0), Some(1.0));
        assert_eq!(filled.value(3, 0), Some(9.0));
        // Equidistant: lowest index wins.
        assert_eq!(filled.value(2, 0), Some(1.0));
    }

    #[test]
    fn nearest_ring_prefers_edge_neighbour_over_corner() {
        let mut cells = vec![None; 9];
        cells[0] = Some(1.0);
        cells[7] = Some(2.0);
        let raster = UvRaster::from_cells(3, 3, cells).expect("raster");
        let filled = denoise(&raster, &DenoiseConfig::nearest(1.0)).expect("denoise");
        // Centre texel sees (0,0) diagonally and (1,2) directly.
        assert_eq!(filled.value(1, 1), Some(2.0));
    }

    #[test]
    fn gaussian_keeps_constant_field() {
        let raster = UvRaster::from_cells(6, 6, vec![Some(2.5); 36]).expect("raster");
        let blurred = denoise(&raster, &DenoiseConfig::gaussian(2.0, 1.0)).expect("denoise");
        assert!(blurred
            .cells()
            .all(|cell| cell.is_some_and(|v| (v - 2.5).abs() < 1.0e-6)));
    }

    #[test]
    fn gaussian_excludes_invalid_neighbours() {
        let cells = vec![Some(4.0), None, Some(4.0)];
        let raster = UvRaster::from_cells(3, 1, cells).expect("raster");
        let blurred = denoise(&raster, &DenoiseConfig::gaussian(2.0, 1.0)).expect("denoise");
        assert_eq!(blurred.value(0, 0), Some(4.0));
        assert_eq!(blurred.value(1, 0), None);
    }

    #[test]
    fn gaussian_smooths_a_step() {
        let cells = vec![Some(0.0), Some(0.0), Some(1.0), Some(1.0)];
        let raster = UvRaster::from_cells(4, 1, cells).expect("raster");
        let blurred = denoise(&raster, &DenoiseConfig::gaussian(1.0, 1.0)).expect("denoise");
        let left = blurred.value(1, 0).expect("left");
        let right = blurred.value(2, 0).expect("right");
        assert!(left > 0.0 && left < 0.5);
        assert!(right > 0.5 && right < 1.0);
        assert!((left + right - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn combined_fills_before_blurring() {
        let raster = single_valid(5, 5, 2, 2, 3.0);
        let result = denoise(&raster, &DenoiseConfig::default()).expect("denoise");
        assert_eq!(result.valid_count(), 25);
        assert!(result.cells().all(|cell| cell == Some(3.0)));
    }

    #[test]
    fn invalid_parameters_fail_fast() {
        let raster = single_valid(2, 2, 0, 0, 1.0);
        for config in [
            DenoiseConfig::nearest(0.0),
            DenoiseConfig::gaussian(2.0, 0.0),
            DenoiseConfig::gaussian(-1.0, 1.0),
        ] {
            let err = denoise(&raster, &config).expect_err("invalid");
            assert!(matches!(err, ResampleError::InvalidConfig(_)));
        }
        // Sigma is irrelevant without a Gaussian pass.
        let nearest = DenoiseConfig {
            sigma: 0.0,
            ..DenoiseConfig::nearest(1.0)
        };
        assert!(denoise(&raster, &nearest).is_ok());
    }
}
