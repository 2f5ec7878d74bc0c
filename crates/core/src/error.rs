use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("spatial index requires a non-empty point cloud")]
    EmptyInput,

    /// The inside/outside ray casts kept grazing an edge or vertex, or the
    /// point lies on the surface itself.
    #[error(
        "inside/outside test is ambiguous for point {} near triangle {triangle} after {attempts} ray casts",
        point.map_or_else(|| "<query>".to_string(), |point| point.to_string())
    )]
    AmbiguousGeometry {
        point: Option<usize>,
        triangle: usize,
        attempts: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("uv coordinate ({}, {}) of sample {sample} is outside [0, 1]", uv[0], uv[1])]
    OutOfRange { sample: usize, uv: [f32; 2] },

    #[error("operation requires a mesh but none is loaded")]
    MissingMesh,

    #[error("mesh has no uv coordinates")]
    MissingUvs,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResampleError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Attaches the offending point index to an ambiguity raised by a bare query.
    pub(crate) fn with_point(self, index: usize) -> Self {
        match self {
            Self::AmbiguousGeometry {
                triangle, attempts, ..
            } => Self::AmbiguousGeometry {
                point: Some(index),
                triangle,
                attempts,
            },
            other => other,
        }
    }
}

pub type ResampleResult<T> = std::result::Result<T, ResampleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguity_reports_point_and_triangle() {
        let err = ResampleError::AmbiguousGeometry {
            point: None,
            triangle: 7,
            attempts: 3,
        }
        .with_point(42);
        let text = err.to_string();
        assert!(text.contains("point 42"));
        assert!(text.contains("triangle 7"));
    }

    #[test]
    fn out_of_range_mentions_sample() {
        let err = ResampleError::OutOfRange {
            sample: 3,
            uv: [1.5, 0.25],
        };
        let text = format!("{err}");
        assert!(text.contains("sample 3"));
        assert!(text.contains("1.5"));
    }
}
