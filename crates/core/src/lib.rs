mod bake;
mod bvh;
mod denoise;
mod error;
mod mesh;
mod mesh_query;
mod parallel;
mod point_cloud;
mod prune;
mod range;
mod session;
mod settings;
mod slice;
mod spatial_index;

pub use bake::{bake, bake_preview, uv_coverage_mask, UvMask, UvRaster, UV_TOLERANCE};
pub use denoise::{denoise, DenoiseConfig, DenoiseMode};
pub use error::{ResampleError, ResampleResult};
pub use mesh::{make_box, make_uv_sphere, Aabb, Mesh};
pub use mesh_query::{MeshQuery, SurfacePoint, SurfaceSamples, MAX_RAY_ATTEMPTS};
pub use point_cloud::{CloudStatistics, PointCloud, ScalarPoint};
pub use prune::{prune, prune_with_query, AmbiguousPolicy, PruneReport};
pub use range::{normalize, visible, RangeMapper, ValueTransform};
pub use session::{Session, SurfaceBake};
pub use settings::{
    DisplaySettings, LoadSettings, PruneSettings, SamplingSettings, SessionSettings,
    TextureSettings, SETTINGS_VERSION,
};
pub use slice::{
    sample as sample_slice, sample_within as sample_slice_within, SampleGrid, SliceFrame,
};
pub use spatial_index::{NearestHit, SpatialIndex};
