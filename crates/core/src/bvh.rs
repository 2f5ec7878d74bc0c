//! Bounding volume hierarchy over triangles, used to cull ray casts.

use glam::Vec3;

use crate::mesh::Aabb;

const LEAF_SIZE: usize = 4;

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf { start: usize, count: usize },
    Internal { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    kind: NodeKind,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TriangleBvh {
    nodes: Vec<Node>,
    order: Vec<usize>,
}

impl TriangleBvh {
    pub(crate) fn build(triangles: &[[Vec3; 3]]) -> Self {
        let mut bvh = Self {
            nodes: Vec::new(),
            order: (0..triangles.len()).collect(),
        };
        if triangles.is_empty() {
            return bvh;
        }
        let bounds: Vec<Aabb> = triangles
            .iter()
            .map(|tri| Aabb {
                min: tri[0].min(tri[1]).min(tri[2]),
                max: tri[0].max(tri[1]).max(tri[2]),
            })
            .collect();
        let centroids: Vec<Vec3> = bounds.iter().map(Aabb::center).collect();
        bvh.build_node(&bounds, &centroids, 0, triangles.len());
        bvh
    }

    fn build_node(&mut self, bounds: &[Aabb], centroids: &[Vec3], start: usize, end: usize) -> usize {
        let node_bounds = self.order[start..end]
            .iter()
            .map(|&tri| bounds[tri])
            .reduce(Aabb::union)
            .unwrap_or(Aabb {
                min: Vec3::ZERO,
                max: Vec3::ZERO,
            });
        let node_index = self.nodes.len();
        self.nodes.push(Node {
            bounds: node_bounds,
            kind: NodeKind::Leaf {
                start,
                count: end - start,
            },
        });
        if end - start <= LEAF_SIZE {
            return node_index;
        }

        let Some(centroid_bounds) =
            Aabb::from_points(self.order[start..end].iter().map(|&tri| centroids[tri]))
        else {
            return node_index;
        };
        let extent = centroid_bounds.max - centroid_bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        if extent[axis] <= 0.0 {
            return node_index;
        }

        let mid = start + (end - start) / 2;
        self.order[start..end].select_nth_unstable_by(mid - start, |a, b| {
            centroids[*a][axis].total_cmp(&centroids[*b][axis])
        });
        let left = self.build_node(bounds, centroids, start, mid);
        let right = self.build_node(bounds, centroids, mid, end);
        self.nodes[node_index].kind = NodeKind::Internal { left, right };
        node_index
    }

    /// Calls `visit` with every triangle whose bounds the ray may cross.
    /// Returning `false` from `visit` stops the traversal.
    pub(crate) fn visit_ray(&self, origin: Vec3, dir: Vec3, mut visit: impl FnMut(usize) -> bool) {
        if self.nodes.is_empty() {
            return;
        }
        let inv_dir = dir.recip();
        let mut stack = vec![0usize];
        while let Some(node_index) = stack.pop() {
            let node = &self.nodes[node_index];
            if !ray_hits_aabb(origin, inv_dir, &node.bounds) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for &tri in &self.order[start..start + count] {
                        if !visit(tri) {
                            return;
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
    }
}

fn ray_hits_aabb(origin: Vec3, inv_dir: Vec3, bounds: &Aabb) -> bool {
    let t0 = (bounds.min - origin) * inv_dir;
    let t1 = (bounds.max - origin) * inv_dir;
    let t_near = t0.min(t1).max_element();
    let t_far = t0.max(t1).min_element();
    // Small slack so triangles lying exactly on a slab are not culled.
    t_far >= t_near.max(0.0) - 1.0e-6 * (1.0 + t_far.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_only_triangles_along_the_ray() {
        let triangles: Vec<[Vec3; 3]> = (0..32)
            .map(|i| {
                let x = i as f32 * 2.0;
                [
                    Vec3::new(x, -1.0, -1.0),
                    Vec3::new(x, 1.0, -1.0),
                    Vec3::new(x, 0.0, 1.0),
                ]
            })
            .collect();
        let bvh = TriangleBvh::build(&triangles);

        let mut hits = Vec::new();
        bvh.visit_ray(Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0).normalize() + Vec3::new(1.0e-3, 0.0, 1.0e-3), |tri| {
            hits.push(tri);
            true
        });
        assert!(hits.len() < triangles.len());

        let mut all = Vec::new();
        bvh.visit_ray(Vec3::new(-5.0, 0.0, 0.0), Vec3::new(1.0, 1.0e-4, 1.0e-4), |tri| {
            all.push(tri);
            true
        });
        all.sort_unstable();
        assert_eq!(all, (0..32).collect::<Vec<_>>());
    }
}
