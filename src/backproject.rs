// backproject.rs — CPU reference for the back-projection stage.
//
// For every volume pixel and each of its S×S sub-samples P:
//
//   acc(P) = Σ_angles  w(P, angle) * q_angle(t(P, angle) - 0.5)
//
// where t is the continuous detector coordinate from
// `ProjectionVector::project`, w the pixel weight (1 or 1/U²) and q the
// filtered row, read with linear interpolation and zero outside the
// detector. The pixel value is the mean over its sub-samples times
// `VectorGeometry::output_scale()`.
//
// gpu/backproject.rs runs the same loop with one invocation per pixel.

use crate::geometry::{VectorGeometry, VolumeGeometry};

/// Linearly interpolated sample of `row` at continuous index `x`, where
/// sample i sits at x = i. Zero outside the row.
#[inline]
pub fn sample_linear(row: &[f32], x: f32) -> f32 {
    // Also rejects NaN and coordinates too large for the index cast.
    if !(x > -1.0 && x < row.len() as f32) {
        return 0.0;
    }
    let x0 = x.floor();
    let frac = x - x0;
    let i0 = x0 as isize;
    let at = |i: isize| -> f32 {
        if i >= 0 && (i as usize) < row.len() { row[i as usize] } else { 0.0 }
    };
    (1.0 - frac) * at(i0) + frac * at(i0 + 1)
}

/// Back-project filtered rows (`angle_count × detector_count`, row-major)
/// onto `volume`. Returns the new pixel values, row-major.
pub fn backproject(
    filtered: &[f32],
    geometry: &VectorGeometry,
    volume: &VolumeGeometry,
    supersampling: u32,
) -> Vec<f32> {
    let n = geometry.detector_count;
    assert_eq!(filtered.len(), n * geometry.angle_count(), "filtered rows do not match geometry");
    assert!(supersampling >= 1, "supersampling must be at least 1");

    let scale = geometry.output_scale() / (supersampling as f32).powi(2);
    let mut out = vec![0.0f32; volume.pixel_count()];

    for row in 0..volume.rows {
        for col in 0..volume.cols {
            let mut acc = 0.0f32;
            for sy in 0..supersampling {
                for sx in 0..supersampling {
                    let p = volume.sample_position(col, row, sx, sy, supersampling);
                    for (vec, q) in geometry.vectors.iter().zip(filtered.chunks_exact(n)) {
                        if let Some((t, w)) = vec.project(geometry.beam, p) {
                            acc += w * sample_linear(q, t - 0.5);
                        }
                    }
                }
            }
            out[row * volume.cols + col] = acc * scale;
        }
    }
    out
}
