use serde::{Deserialize, Serialize};

use crate::error::{ResampleError, ResampleResult};
use crate::mesh::Mesh;
use crate::mesh_query::MeshQuery;
use crate::parallel;
use crate::point_cloud::PointCloud;

/// What to do with a point whose inside/outside test stays ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousPolicy {
    #[default]
    Abort,
    TreatAsInside,
    TreatAsOutside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneReport {
    pub kept: usize,
    pub removed: usize,
    pub ambiguous: usize,
}

/// Removes every point classified inside `mesh`, keeping order. Any ambiguous
/// classification aborts with the offending point index.
pub fn prune(cloud: &PointCloud, mesh: &Mesh) -> ResampleResult<PointCloud> {
    let query = MeshQuery::new(mesh)?;
    prune_with_query(cloud, &query, AmbiguousPolicy::Abort).map(|(cloud, _)| cloud)
}

pub fn prune_with_query(
    cloud: &PointCloud,
    query: &MeshQuery,
    policy: AmbiguousPolicy,
) -> ResampleResult<(PointCloud, PruneReport)> {
    let classified = parallel::try_map_indexed(cloud.points(), |idx, point| {
        match query.is_inside(point.position) {
            Ok(inside) => Ok((!inside, false)),
            Err(err @ ResampleError::AmbiguousGeometry { .. }) => match policy {
                AmbiguousPolicy::Abort => Err(err.with_point(idx)),
                AmbiguousPolicy::TreatAsInside => Ok((false, true)),
                AmbiguousPolicy::TreatAsOutside => Ok((true, true)),
            },
            Err(err) => Err(err),
        }
    })?;

    let kept: Vec<usize> = classified
        .iter()
        .enumerate()
        .filter_map(|(idx, (keep, _))| keep.then_some(idx))
        .collect();
    let report = PruneReport {
        kept: kept.len(),
        removed: cloud.len() - kept.len(),
        ambiguous: classified.iter().filter(|(_, ambiguous)| *ambiguous).count(),
    };
    if report.ambiguous > 0 {
        tracing::warn!(
            "{} points had ambiguous inside/outside classification, resolved as {:?}",
            report.ambiguous,
            policy
        );
    }
    tracing::info!(
        "pruned {} of {} points inside the mesh",
        report.removed,
        cloud.len()
    );
    Ok((cloud.filter_by_indices(&kept), report))
}
