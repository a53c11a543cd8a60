// tests/test_geometry.rs — Projection/volume geometry and data handles.

use std::sync::Arc;

use tomo_fbp::geometry::{check_compatible, BeamKind, FanFlatGeometry, ParallelGeometry, ProjectionGeometry, VolumeGeometry};
use tomo_fbp::{DataStore, FbpError, Sinogram, Volume};

// ===== Geometry =====

#[test]
fn parallel_vectors_map_a_point_consistently() {
    // A point at distance 10 along angle theta hits detector coordinate n/2 + 10.
    let g = ParallelGeometry::uniform(64, 16);
    let vectors = g.to_vectors();
    for (angle, v) in g.angles.iter().zip(&vectors.vectors) {
        let p = [10.0 * angle.cos(), 10.0 * angle.sin()];
        let (t, w) = v.project(BeamKind::Parallel, p).unwrap();
        assert!((t - 42.0).abs() < 1e-3, "angle {angle}: t = {t}");
        assert_eq!(w, 1.0);
    }
}

#[test]
fn fan_centre_ray_hits_detector_middle() {
    let g = FanFlatGeometry::uniform(100, 2.0, 12, 300.0, 200.0);
    let vectors = g.to_vectors();
    for v in &vectors.vectors {
        let (t, w) = v.project(BeamKind::Fan, [0.0, 0.0]).unwrap();
        assert!((t - 50.0).abs() < 1e-3, "t = {t}");
        assert!((w - 1.0).abs() < 1e-5);
    }
    assert!((vectors.ramp_scale - 1.0 / (2.0 * 2.0 * 300.0 / 500.0)).abs() < 1e-6);
}

#[test]
fn empty_or_inverted_volume_is_geometry_mismatch() {
    let p = ParallelGeometry::uniform(16, 4).to_vectors();
    assert!(check_compatible(&p, &VolumeGeometry::new(16, 16)).is_ok());
    for bad in [
        VolumeGeometry::new(0, 16),
        VolumeGeometry::with_window(16, 16, 1.0, -1.0, -1.0, 1.0),
        VolumeGeometry::with_window(16, 16, -1.0, 1.0, f32::NAN, 1.0),
    ] {
        assert!(matches!(check_compatible(&p, &bad), Err(FbpError::GeometryMismatch(_))));
    }
}

#[test]
fn zero_detector_width_is_geometry_mismatch() {
    let g = ParallelGeometry::new(16, 0.0, vec![0.0, 1.0]).to_vectors();
    assert!(matches!(check_compatible(&g, &VolumeGeometry::new(8, 8)), Err(FbpError::GeometryMismatch(_))));
}

// ===== Data =====

#[test]
fn sinogram_length_must_match_geometry() {
    let geometry: Arc<dyn ProjectionGeometry> = Arc::new(ParallelGeometry::uniform(8, 3));
    assert!(Sinogram::new(Arc::clone(&geometry), vec![0.0; 24]).is_ok());
    assert!(matches!(Sinogram::new(geometry, vec![0.0; 25]), Err(FbpError::GeometryMismatch(_))));
}

#[test]
fn store_hands_out_typed_handles() {
    let mut store = DataStore::new();
    let s = store.insert_sinogram(Sinogram::zeros(Arc::new(ParallelGeometry::uniform(8, 3))));
    let v = store.insert_volume(Volume::zeros(VolumeGeometry::new(4, 4)));
    assert!(store.sinogram(s).is_some());
    assert!(store.volume(s).is_none());
    assert!(store.volume(v).is_some());
    assert_eq!(store.len(), 2);
    assert!(store.remove(s));
    assert!(!store.remove(s));
    assert!(store.sinogram(s).is_none());
}
