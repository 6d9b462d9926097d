use std::collections::HashMap;

use approx::assert_relative_eq;
use dicom_mesh::{
    CalibrationParams, Execution, Mesh, ReconstructionConfig, SortBy, VertexWelding, Volume,
    VolumeLoaderError, reconstruct, reconstruct_volume,
};
use nalgebra::Vector3;

/// Filled ball of intensity 200 on a background of 0
fn ball(n: usize, center: f32, radius: f32) -> Volume {
    Volume::from_fn((n, n, n), |x, y, z| {
        let d = Vector3::new(x as f32, y as f32, z as f32) - Vector3::repeat(center);
        if d.norm() <= radius { 200 } else { 0 }
    })
}

fn config(isovalue: u8, noise_threshold: u8) -> ReconstructionConfig {
    ReconstructionConfig {
        isovalue,
        noise_threshold,
        ..Default::default()
    }
}

fn assert_shape(mesh: &Mesh) {
    let n = mesh.vertices.len();
    assert_eq!(mesh.normals.len(), n);
    assert_eq!(mesh.uvs.len(), n);
    assert_eq!(mesh.colors.len(), n);
    assert_eq!(mesh.indices.len() % 3, 0);
    assert!(mesh.indices.iter().all(|&i| (i as usize) < n));
    assert_eq!(mesh.validate(), Ok(()));
}

fn edge_use(mesh: &Mesh) -> HashMap<(u32, u32), usize> {
    let mut uses = HashMap::new();
    for [a, b, c] in mesh.triangles() {
        for (p, q) in [(a, b), (b, c), (c, a)] {
            *uses.entry((p.min(q), p.max(q))).or_default() += 1;
        }
    }
    uses
}

#[test]
fn small_ball_is_watertight() {
    let result = reconstruct_volume(ball(4, 1.5, 1.5), CalibrationParams::NONE, &config(100, 50));
    let mesh = &result.mesh;
    assert_shape(mesh);
    assert!(!mesh.indices.is_empty());
    assert_eq!(mesh.indices.len() % 3, 0);
    assert!(edge_use(mesh).values().all(|&n| n == 2));
}

#[test]
fn ball_winding_encloses_positive_volume() {
    let result = reconstruct_volume(ball(10, 4.5, 3.4), CalibrationParams::NONE, &config(100, 50));
    let mesh = &result.mesh;
    let volume: f32 = mesh
        .triangles()
        .map(|[a, b, c]| {
            let p = |i: u32| Vector3::from(mesh.vertices[i as usize]);
            p(a).dot(&p(b).cross(&p(c))) / 6.0
        })
        .sum();
    assert!(volume > 0.0);
    // A sphere of radius 3.4 holds about 165 voxels
    assert!(volume > 100.0 && volume < 230.0, "{volume}");
}

#[test]
fn ball_normals_are_unit_and_outward() {
    let result = reconstruct_volume(ball(10, 4.5, 3.4), CalibrationParams::NONE, &config(100, 50));
    let mesh = &result.mesh;
    assert_shape(mesh);
    let center = Vector3::repeat(4.5f32);
    for (v, n) in mesh.vertices.iter().zip(&mesh.normals) {
        let n = Vector3::from(*n);
        assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-5);
        assert!(n.dot(&(Vector3::from(*v) - center)) > 0.0);
    }
}

#[test]
fn uniform_volumes_give_empty_meshes() {
    for fill in [30u8, 250] {
        let v = Volume::from_fn((5, 5, 5), |_, _, _| fill);
        let result = reconstruct_volume(v, CalibrationParams::NONE, &config(128, 0));
        assert!(result.mesh.vertices.is_empty());
        assert!(result.mesh.indices.is_empty());
        assert_shape(&result.mesh);
    }
}

#[test]
fn isovalue_outside_intensity_range_is_empty() {
    let v = Volume::from_fn((6, 6, 6), |x, y, z| (40 + x * 10 + y * 5 + z) as u8);
    let (lo, hi) = v.intensity_range();
    for iso in [lo - 1, hi + 1] {
        let result = reconstruct_volume(v.clone(), CalibrationParams::NONE, &config(iso, 0));
        assert!(result.mesh.vertices.is_empty(), "isovalue {iso}");
    }
    let inside = reconstruct_volume(v, CalibrationParams::NONE, &config(lo + 20, 0));
    assert!(!inside.mesh.is_empty());
}

#[test]
fn noise_threshold_removes_faint_shells() {
    // A faint outer shell around a bright core
    let v = Volume::from_fn((12, 12, 12), |x, y, z| {
        let d = (Vector3::new(x as f32, y as f32, z as f32) - Vector3::repeat(5.5)).norm();
        match d {
            d if d <= 2.5 => 220,
            d if d <= 4.5 => 90,
            _ => 0,
        }
    });
    let with_shell = reconstruct_volume(v.clone(), CalibrationParams::NONE, &config(50, 0));
    let core_only = reconstruct_volume(v, CalibrationParams::NONE, &config(50, 100));
    assert!(core_only.mesh.triangle_count() < with_shell.mesh.triangle_count());
    assert!(core_only.mesh.colors.iter().all(|&c| c == 220));
}

#[test]
fn raising_threshold_never_adds_voxels() {
    let v = Volume::from_fn((7, 7, 7), |x, y, z| ((x * 91 + y * 17 + z * 43) % 256) as u8);
    let counts: Vec<usize> = (0..=255u8)
        .step_by(5)
        .map(|t| {
            let mut v = v.clone();
            v.suppress_noise(t);
            v.count_nonzero()
        })
        .collect();
    assert!(counts.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn calibration_is_linear_on_uniform_volume() {
    let cal = CalibrationParams::new(-1024, 3);
    for raw in [0u8, 77, 255] {
        let v = Volume::from_fn((3, 3, 3), |_, _, _| raw);
        assert!(v.data().iter().all(|&s| cal.calibrate(s) == raw as i32 * 3 - 1024));
    }
}

#[test]
fn uvs_follow_calibrated_window() {
    let cal = CalibrationParams::new(-1024, 1);
    let v = Volume::from_fn((8, 8, 8), |x, _, _| (x * 36).min(255) as u8);
    let result = reconstruct_volume(v, cal, &config(120, 30));
    let mesh = &result.mesh;
    assert_shape(mesh);
    assert!(!mesh.is_empty());
    for (uv, &color) in mesh.uvs.iter().zip(&mesh.colors) {
        assert!((0.0..=1.0).contains(&uv[0]));
        assert_eq!(uv[1], 0.5);
        // Colors are display values of the bright corner: raw * 1 - 63.75
        assert!(color >= 120 - 64);
    }
    // Brighter samples never map further left
    let mut pairs: Vec<_> = mesh.colors.iter().zip(&mesh.uvs).collect();
    pairs.sort_by_key(|(c, _)| **c);
    assert!(pairs.windows(2).all(|w| w[0].1[0] <= w[1].1[0]));
}

#[test]
fn recentering_reports_pivot() {
    let mut cfg = config(100, 50);
    cfg.recenter = true;
    let result = reconstruct_volume(ball(10, 4.5, 3.4), CalibrationParams::NONE, &cfg);
    let pivot = result.pivot.expect("recentering was requested");
    for c in pivot {
        assert_relative_eq!(c, 4.5, epsilon = 1e-3);
    }
    let n = result.mesh.vertices.len() as f32;
    let mean_x: f32 = result.mesh.vertices.iter().map(|v| v[0]).sum::<f32>() / n;
    assert_relative_eq!(mean_x, 0.0, epsilon = 1e-3);
}

#[test]
fn strategies_agree_on_triangles() {
    let v = ball(9, 4.0, 3.1);
    let reference = reconstruct_volume(v.clone(), CalibrationParams::NONE, &config(100, 0));
    for (welding, execution) in [
        (VertexWelding::Shared, Execution::Serial),
        (VertexWelding::PerCell, Execution::Parallel),
        (VertexWelding::PerCell, Execution::Serial),
    ] {
        let cfg = ReconstructionConfig {
            welding,
            execution,
            ..config(100, 0)
        };
        let result = reconstruct_volume(v.clone(), CalibrationParams::NONE, &cfg);
        assert_shape(&result.mesh);
        assert_eq!(result.mesh.triangle_count(), reference.mesh.triangle_count());
        if welding == VertexWelding::Shared {
            assert_eq!(result.mesh, reference.mesh);
        }
    }
}

#[test]
fn empty_directory_is_an_empty_series() {
    let dir = std::env::temp_dir().join(format!("dicom-mesh-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let cfg = ReconstructionConfig {
        sort_by: SortBy::SliceLocation,
        ..Default::default()
    };
    let err = reconstruct(&dir, &cfg).unwrap_err();
    std::fs::remove_dir_all(&dir).unwrap();
    assert!(matches!(err, VolumeLoaderError::EmptySeries));
}
