//! Explicit owner of the data a resampling front-end works on. Every derived
//! structure is rebuilt here when its source changes; nothing is cached
//! anywhere else.

use std::collections::BTreeMap;

use crate::bake::{self, UvRaster};
use crate::denoise;
use crate::error::{ResampleError, ResampleResult};
use crate::mesh::Mesh;
use crate::mesh_query::MeshQuery;
use crate::point_cloud::{CloudStatistics, PointCloud};
use crate::prune::{self, PruneReport};
use crate::range::{self, RangeMapper};
use crate::settings::SessionSettings;
use crate::slice::{self, SampleGrid, SliceFrame};
use crate::spatial_index::SpatialIndex;

#[derive(Debug, Clone)]
struct SliceEntry {
    frame: SliceFrame,
    live: bool,
    stale: bool,
    grid: Option<SampleGrid>,
}

/// Surface bake before and after denoising.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceBake {
    pub raw: UvRaster,
    pub denoised: UvRaster,
}

#[derive(Debug, Clone)]
pub struct Session {
    settings: SessionSettings,
    cloud: PointCloud,
    index: SpatialIndex,
    mesh: Option<Mesh>,
    query: Option<MeshQuery>,
    slices: BTreeMap<String, SliceEntry>,
}

impl Session {
    /// Applies the load settings to `cloud` and builds its index.
    pub fn new(cloud: &PointCloud, settings: SessionSettings) -> ResampleResult<Self> {
        settings.validate()?;
        let cloud = settings.load.apply(cloud)?;
        let index = SpatialIndex::build(&cloud)?;
        tracing::info!("session opened with {} points", cloud.len());
        Ok(Self {
            settings,
            cloud,
            index,
            mesh: None,
            query: None,
            slices: BTreeMap::new(),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Takes effect on the next operation. Load settings only apply to clouds
    /// passed in afterwards.
    pub fn set_settings(&mut self, settings: SessionSettings) -> ResampleResult<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    /// Swaps in a new dataset through the load settings and rebuilds the
    /// index. On error the session keeps its previous cloud.
    pub fn replace_cloud(&mut self, cloud: &PointCloud) -> ResampleResult<()> {
        let cloud = self.settings.load.apply(cloud)?;
        self.install_cloud(cloud)
    }

    fn install_cloud(&mut self, cloud: PointCloud) -> ResampleResult<()> {
        let index = SpatialIndex::build(&cloud)?;
        self.cloud = cloud;
        self.index = index;
        self.invalidate_slices()
    }

    pub fn replace_mesh(&mut self, mesh: Mesh) -> ResampleResult<()> {
        let query = MeshQuery::new(&mesh)?;
        self.mesh = Some(mesh);
        self.query = Some(query);
        Ok(())
    }

    pub fn clear_mesh(&mut self) {
        self.mesh = None;
        self.query = None;
    }

    fn require_mesh(&self) -> ResampleResult<(&Mesh, &MeshQuery)> {
        match (&self.mesh, &self.query) {
            (Some(mesh), Some(query)) => Ok((mesh, query)),
            _ => Err(ResampleError::MissingMesh),
        }
    }

    /// Drops every point inside the mesh and rebuilds the index. Fails
    /// without touching the session if ambiguity aborts or nothing is left.
    pub fn prune(&mut self) -> ResampleResult<PruneReport> {
        let (_, query) = self.require_mesh()?;
        let (pruned, report) =
            prune::prune_with_query(&self.cloud, query, self.settings.prune.ambiguous)?;
        self.install_cloud(pruned)?;
        Ok(report)
    }

    /// Samples the mesh surface, bakes, denoises and, when configured, masks
    /// atlas texels no triangle covers.
    pub fn bake_surface(&self) -> ResampleResult<SurfaceBake> {
        let (mesh, query) = self.require_mesh()?;
        let texture = &self.settings.texture;
        self.settings.denoise.validate()?;

        let samples = query.sample_surface(
            self.settings.sampling.points_per_unit_area,
            self.settings.sampling.seed,
        )?;
        let raw = bake::bake(samples, &self.index, texture.size())?;
        let mut denoised = denoise::denoise(&raw, &self.settings.denoise)?;
        if texture.mask_uncovered {
            let mask = bake::uv_coverage_mask(mesh, texture.width, texture.height)?;
            denoised = denoised.masked(&mask)?;
        }
        Ok(SurfaceBake { raw, denoised })
    }

    /// Constant-value bake showing where the current sampling density lands.
    pub fn preview_surface(&self, fill_value: f32) -> ResampleResult<UvRaster> {
        let (_, query) = self.require_mesh()?;
        let samples = query.sample_surface(
            self.settings.sampling.points_per_unit_area,
            self.settings.sampling.seed,
        )?;
        bake::bake_preview(samples, self.settings.texture.size(), fill_value)
    }

    pub fn statistics(&self) -> ResampleResult<CloudStatistics> {
        self.cloud.statistics(&self.index)
    }

    /// Data range with the display overrides applied on top.
    pub fn range_mapper(&self) -> RangeMapper {
        let display = &self.settings.display;
        let (data_min, data_max) = self.cloud.value_range().unwrap_or((0.0, 1.0));
        RangeMapper::from_range(
            display.min_override.unwrap_or(data_min),
            display.max_override.unwrap_or(data_max),
            display.transform,
        )
    }

    /// Indices of points that pass the display threshold.
    pub fn visible_points(&self) -> Vec<usize> {
        let threshold = self.settings.display.threshold;
        self.cloud
            .values()
            .enumerate()
            .filter(|(_, value)| threshold.map_or(true, |t| range::visible(*value, t)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Registers a named slice. Live slices are sampled right away; on-demand
    /// slices start stale.
    pub fn add_slice(
        &mut self,
        name: impl Into<String>,
        frame: SliceFrame,
        live: bool,
    ) -> ResampleResult<()> {
        let name = name.into();
        if self.slices.contains_key(&name) {
            return Err(ResampleError::invalid_config(format!(
                "slice {name:?} already exists"
            )));
        }
        frame.validate()?;
        let grid = if live {
            Some(slice::sample(&frame, &self.index)?)
        } else {
            None
        };
        self.slices.insert(
            name,
            SliceEntry {
                frame,
                live,
                stale: !live,
                grid,
            },
        );
        Ok(())
    }

    pub fn remove_slice(&mut self, name: &str) -> bool {
        self.slices.remove(name).is_some()
    }

    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn slice_frame(&self, name: &str) -> Option<&SliceFrame> {
        self.slices.get(name).map(|entry| &entry.frame)
    }

    pub fn set_slice_frame(&mut self, name: &str, frame: SliceFrame) -> ResampleResult<()> {
        frame.validate()?;
        let index = &self.index;
        let entry = slice_entry(&mut self.slices, name)?;
        if entry.live {
            entry.grid = Some(slice::sample(&frame, index)?);
            entry.stale = false;
        } else {
            entry.stale = true;
        }
        entry.frame = frame;
        Ok(())
    }

    /// Switching a stale slice to live samples it immediately.
    pub fn set_slice_live(&mut self, name: &str, live: bool) -> ResampleResult<()> {
        let index = &self.index;
        let entry = slice_entry(&mut self.slices, name)?;
        if live && entry.stale {
            entry.grid = Some(slice::sample(&entry.frame, index)?);
            entry.stale = false;
        }
        entry.live = live;
        Ok(())
    }

    pub fn refresh_slice(&mut self, name: &str) -> ResampleResult<&SampleGrid> {
        let index = &self.index;
        let entry = slice_entry(&mut self.slices, name)?;
        let grid = slice::sample(&entry.frame, index)?;
        entry.stale = false;
        Ok(entry.grid.insert(grid))
    }

    /// Last grid computed for the slice, which may be stale.
    pub fn slice_grid(&self, name: &str) -> Option<&SampleGrid> {
        self.slices.get(name).and_then(|entry| entry.grid.as_ref())
    }

    pub fn is_slice_stale(&self, name: &str) -> Option<bool> {
        self.slices.get(name).map(|entry| entry.stale)
    }

    fn invalidate_slices(&mut self) -> ResampleResult<()> {
        for entry in self.slices.values_mut() {
            if entry.live {
                entry.grid = Some(slice::sample(&entry.frame, &self.index)?);
                entry.stale = false;
            } else {
                entry.stale = true;
            }
        }
        Ok(())
    }
}

fn slice_entry<'a>(
    slices: &'a mut BTreeMap<String, SliceEntry>,
    name: &str,
) -> ResampleResult<&'a mut SliceEntry> {
    slices
        .get_mut(name)
        .ok_or_else(|| ResampleError::invalid_config(format!("no slice named {name:?}")))
}
