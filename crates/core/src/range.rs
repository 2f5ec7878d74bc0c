use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTransform {
    #[default]
    Linear,
    /// Natural log. Inputs `<= 0` are replaced by `f32::MIN_POSITIVE` first.
    Log,
}

impl ValueTransform {
    pub fn apply(self, value: f32) -> f32 {
        match self {
            ValueTransform::Linear => value,
            ValueTransform::Log => {
                let value = if value > 0.0 { value } else { f32::MIN_POSITIVE };
                value.ln()
            }
        }
    }
}

/// Maps `value` to `[0, 1]` relative to `[min, max]` after applying
/// `transform` to all three. A collapsed range maps values at or below `min`
/// to 0 and everything above to 1.
pub fn normalize(value: f32, min: f32, max: f32, transform: ValueTransform) -> f32 {
    let t = transform.apply(value);
    let t_min = transform.apply(min);
    let t_max = transform.apply(max);
    if t.is_nan() {
        return 0.0;
    }
    let step = if t <= t_min { 0.0 } else { 1.0 };
    if t_max <= t_min {
        return step;
    }
    // f32 bounds far apart overflow the span.
    let ratio = (t as f64 - t_min as f64) / (t_max as f64 - t_min as f64);
    if !ratio.is_finite() {
        return step;
    }
    ratio.clamp(0.0, 1.0) as f32
}

/// Display gate for point-cloud values; independent of normalization.
pub fn visible(value: f32, threshold: f32) -> bool {
    value > threshold
}

/// Colour-map range the front-end edits interactively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeMapper {
    min: f32,
    max: f32,
    pub transform: ValueTransform,
}

impl RangeMapper {
    pub fn from_range(min: f32, max: f32, transform: ValueTransform) -> Self {
        Self {
            min,
            max: max.max(min),
            transform,
        }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Lowering `min` below the current `max` is always accepted; raising it
    /// past `max` drags `max` along.
    pub fn set_min(&mut self, min: f32) {
        self.min = min;
        if self.max < min {
            self.max = min;
        }
    }

    pub fn set_max(&mut self, max: f32) {
        self.max = max.max(self.min);
    }

    pub fn reset(&mut self, data_min: f32, data_max: f32) {
        self.min = data_min;
        self.max = data_max.max(data_min);
    }

    pub fn normalize_value(&self, value: f32) -> f32 {
        normalize(value, self.min, self.max, self.transform)
    }
}
