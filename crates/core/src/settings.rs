use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::denoise::DenoiseConfig;
use crate::error::{ResampleError, ResampleResult};
use crate::point_cloud::PointCloud;
use crate::prune::AmbiguousPolicy;
use crate::range::ValueTransform;

pub const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub version: u32,
    pub load: LoadSettings,
    pub sampling: SamplingSettings,
    pub texture: TextureSettings,
    pub denoise: DenoiseConfig,
    pub prune: PruneSettings,
    pub display: DisplaySettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            load: LoadSettings::default(),
            sampling: SamplingSettings::default(),
            texture: TextureSettings::default(),
            denoise: DenoiseConfig::default(),
            prune: PruneSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl SessionSettings {
    pub fn from_json_str(text: &str) -> ResampleResult<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> ResampleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ResampleResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ResampleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&text)?;
        tracing::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ResampleResult<()> {
        let path = path.as_ref();
        let text = self.to_json_string()?;
        std::fs::write(path, text).map_err(|source| ResampleError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every numeric field, reporting the first bad one.
    pub fn validate(&self) -> ResampleResult<()> {
        if self.version > SETTINGS_VERSION {
            return Err(ResampleError::invalid_config(format!(
                "settings version {} is newer than supported version {SETTINGS_VERSION}",
                self.version
            )));
        }
        self.load.validate()?;
        self.sampling.validate()?;
        self.texture.validate()?;
        self.denoise.validate()?;
        self.display.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    /// Fraction of points kept, in `(0, 1]`.
    pub sample_rate: f32,
    pub skip_zeros: bool,
    pub seed: Option<u64>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            skip_zeros: false,
            seed: None,
        }
    }
}

impl LoadSettings {
    fn validate(&self) -> ResampleResult<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 || self.sample_rate > 1.0 {
            return Err(ResampleError::invalid_config(format!(
                "load.sample_rate must lie in (0, 1], got {}",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Applies zero skipping, then downsampling.
    pub fn apply(&self, cloud: &PointCloud) -> ResampleResult<PointCloud> {
        self.validate()?;
        let cloud = if self.skip_zeros {
            cloud.without_zero_values()
        } else {
            cloud.clone()
        };
        cloud.downsample(self.sample_rate, self.seed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    pub points_per_unit_area: f32,
    /// Fixed seed for reproducible bakes; `None` draws fresh samples each time.
    pub seed: Option<u64>,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            points_per_unit_area: 1000.0,
            seed: None,
        }
    }
}

impl SamplingSettings {
    fn validate(&self) -> ResampleResult<()> {
        if !self.points_per_unit_area.is_finite() || self.points_per_unit_area <= 0.0 {
            return Err(ResampleError::invalid_config(format!(
                "sampling.points_per_unit_area must be positive, got {}",
                self.points_per_unit_area
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    pub width: usize,
    pub height: usize,
    /// Invalidate texels no UV triangle covers once denoising is done.
    pub mask_uncovered: bool,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            mask_uncovered: true,
        }
    }
}

impl TextureSettings {
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn validate(&self) -> ResampleResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ResampleError::invalid_config(format!(
                "texture size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneSettings {
    pub ambiguous: AmbiguousPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub transform: ValueTransform,
    pub min_override: Option<f32>,
    pub max_override: Option<f32>,
    /// Points at or below this value are hidden.
    pub threshold: Option<f32>,
}

impl DisplaySettings {
    fn validate(&self) -> ResampleResult<()> {
        for (name, value) in [
            ("display.min_override", self.min_override),
            ("display.max_override", self.max_override),
            ("display.threshold", self.threshold),
        ] {
            if value.is_some_and(|value| !value.is_finite()) {
                return Err(ResampleError::invalid_config(format!(
                    "{name} must be finite"
                )));
            }
        }
        Ok(())
    }
}
