//! Property-based tests for the resampling pipeline.
//!
//! Run with: cargo test -p yumo_core --test properties

use glam::{Mat4, Quat, Vec3};
use proptest::prelude::*;
use yumo_core::{
    denoise, make_box, prune, DenoiseConfig, MeshQuery, PointCloud, ScalarPoint, SpatialIndex,
    UvRaster,
};

// =============================================================================
// Strategies
// =============================================================================

fn arb_rotation() -> impl Strategy<Value = Quat> {
    (prop::array::uniform3(-1.0..1.0f32), 0.0..std::f32::consts::TAU).prop_map(|(axis, angle)| {
        let axis = Vec3::from(axis).try_normalize().unwrap_or(Vec3::X);
        Quat::from_axis_angle(axis, angle)
    })
}

fn arb_cloud(max_points: usize) -> impl Strategy<Value = PointCloud> {
    prop::collection::vec(
        (prop::array::uniform3(-2.0..2.0f32), -10.0..10.0f32),
        0..max_points,
    )
    .prop_map(|points| {
        PointCloud::new(
            points
                .into_iter()
                .map(|(position, value)| ScalarPoint::new(position, value))
                .collect(),
        )
        .expect("cloud")
    })
}

/// Raster with random validity; roughly a third of texels carry data.
fn arb_raster() -> impl Strategy<Value = UvRaster> {
    (1usize..12, 1usize..12).prop_flat_map(|(width, height)| {
        prop::collection::vec(
            prop::option::weighted(0.3, -50.0..50.0f32),
            width * height,
        )
        .prop_map(move |cells| UvRaster::from_cells(width, height, cells).expect("raster"))
    })
}

// =============================================================================
// Mesh queries
// =============================================================================

proptest! {
    #[test]
    fn proptest_inside_outside_survives_rotation(
        rotation in arb_rotation(),
        inner in prop::array::uniform3(-0.9..0.9f32),
        outer in 1.1..3.0f32,
        escape_axis in 0usize..3,
        escape_negative in prop::bool::ANY,
    ) {
        let mut mesh = make_box([2.0, 2.0, 2.0]);
        mesh.transform(Mat4::from_quat(rotation));
        let query = MeshQuery::new(&mesh).expect("query");

        let inside = rotation * Vec3::from(inner);
        prop_assert_eq!(query.is_inside(inside).ok(), Some(true));

        let mut outside = Vec3::from(inner);
        outside[escape_axis] = if escape_negative { -outer } else { outer };
        prop_assert_eq!(query.is_inside(rotation * outside).ok(), Some(false));
    }

    #[test]
    fn proptest_prune_is_idempotent(cloud in arb_cloud(60)) {
        let mesh = make_box([2.0, 2.0, 2.0]);
        let once = prune(&cloud, &mesh);
        prop_assume!(once.is_ok());
        let once = once.expect("once");
        let twice = prune(&once, &mesh).expect("twice");
        prop_assert_eq!(&once, &twice);
        for point in once.points() {
            prop_assert!(point.position.abs().max_element() >= 1.0);
        }
    }
}

// =============================================================================
// Spatial index
// =============================================================================

proptest! {
    #[test]
    fn proptest_kd_tree_matches_brute_force(
        coords in prop::collection::vec(prop::array::uniform3(-3i8..=3), 1..80),
        queries in prop::collection::vec(prop::array::uniform3(-4.0..4.0f32), 1..20),
    ) {
        let cloud = PointCloud::new(
            coords
                .iter()
                .enumerate()
                .map(|(idx, c)| {
                    ScalarPoint::new([c[0] as f32, c[1] as f32, c[2] as f32], idx as f32)
                })
                .collect(),
        )
        .expect("cloud");
        let index = SpatialIndex::build(&cloud).expect("index");

        let mut probes: Vec<Vec3> = queries.into_iter().map(Vec3::from).collect();
        // Lattice queries land exactly between points and exercise tie-breaking.
        probes.extend(cloud.positions().map(|p| p + Vec3::new(0.5, 0.0, 0.0)));

        for probe in probes {
            let mut expected = 0usize;
            let mut expected_dist = f32::INFINITY;
            for (idx, point) in cloud.positions().enumerate() {
                let dist = probe.distance_squared(point);
                if dist < expected_dist {
                    expected = idx;
                    expected_dist = dist;
                }
            }
            let hit = index.nearest(probe);
            prop_assert_eq!(hit.index, expected);
            prop_assert_eq!(hit.value, expected as f32);
        }
    }
}

// =============================================================================
// Denoising
// =============================================================================

proptest! {
    #[test]
    fn proptest_nearest_fill_respects_max_distance(
        raster in arb_raster(),
        max_distance in 0.5..4.5f32,
    ) {
        let filled = denoise(&raster, &DenoiseConfig::nearest(max_distance)).expect("denoise");
        let reach = max_distance.floor() as usize;
        let (width, height) = (raster.width(), raster.height());

        for y in 0..height {
            for x in 0..width {
                if raster.is_valid(x, y) {
                    prop_assert_eq!(filled.value(x, y), raster.value(x, y));
                    continue;
                }
                let sources: Vec<f32> = (0..height)
                    .flat_map(|sy| (0..width).map(move |sx| (sx, sy)))
                    .filter(|&(sx, sy)| sx.abs_diff(x).max(sy.abs_diff(y)) <= reach)
                    .filter_map(|(sx, sy)| raster.value(sx, sy))
                    .collect();
                match filled.value(x, y) {
                    Some(value) => prop_assert!(sources.contains(&value)),
                    None => prop_assert!(sources.is_empty()),
                }
            }
        }
    }

    #[test]
    fn proptest_gaussian_keeps_constant_field(
        width in 1usize..10,
        height in 1usize..10,
        constant in -100.0..100.0f32,
        max_distance in 0.5..4.0f32,
        sigma in 0.2..3.0f32,
    ) {
        let raster = UvRaster::from_cells(width, height, vec![Some(constant); width * height])
            .expect("raster");
        let blurred = denoise(&raster, &DenoiseConfig::gaussian(max_distance, sigma))
            .expect("denoise");
        let tolerance = 1.0e-5 * constant.abs().max(1.0);
        for cell in blurred.cells() {
            let value = cell.expect("valid");
            prop_assert!((value - constant).abs() <= tolerance);
        }
    }
}
