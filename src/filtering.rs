// filtering.rs — CPU reference for the frequency-domain filtering stage.
//
// Per projection angle:
//
//   1. pre-weight:  p[d] = row[d] * w(angle, d)      (fan cosine, else 1)
//   2. zero-pad p to the kernel's real width N
//   3. forward DFT (rustfft), multiply bin k by H(angle, k)
//   4. inverse DFT, divide by N, keep the real part of the first n samples
//
// This is what gpu/filter.rs computes with its own radix-2 transform. The
// GPU output is validated against this module, so it favours clarity over
// speed: one planner, one scratch buffer, angles processed in order.
//
// With no kernel (filter `none`) only step 1 runs.

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

use crate::geometry::VectorGeometry;
use crate::kernel::FilterKernel;

/// Filter every row of a row-major sinogram (`angle_count × detector_count`).
pub fn filter_sinogram(
    samples: &[f32],
    geometry: &VectorGeometry,
    kernel: Option<&FilterKernel>,
) -> Vec<f32> {
    let n = geometry.detector_count;
    let m = geometry.angle_count();
    assert_eq!(samples.len(), n * m, "sinogram size does not match geometry");

    let mut out: Vec<f32> = samples
        .chunks_exact(n)
        .enumerate()
        .flat_map(|(a, row)| {
            row.iter()
                .enumerate()
                .map(move |(d, &v)| v * geometry.detector_weight(a, d))
        })
        .collect();

    let Some(kernel) = kernel else {
        return out;
    };
    assert_eq!(kernel.angle_count(), m, "kernel built for a different angle count");

    let len = kernel.real_width();
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(len);
    let inverse = planner.plan_fft_inverse(len);
    let mut buf = vec![Complex32::new(0.0, 0.0); len];
    let norm = 1.0 / len as f32;

    for (a, row) in out.chunks_exact_mut(n).enumerate() {
        buf.fill(Complex32::new(0.0, 0.0));
        for (b, &v) in buf.iter_mut().zip(row.iter()) {
            b.re = v;
        }
        forward.process(&mut buf);
        for (k, b) in buf.iter_mut().enumerate() {
            *b *= kernel.full_bin(a, k);
        }
        inverse.process(&mut buf);
        for (dst, b) in row.iter_mut().zip(buf.iter()) {
            *dst = b.re * norm;
        }
    }
    out
}

/// Filter a single row with row 0 of `kernel` (no geometric pre-weighting).
pub fn filter_row(row: &[f32], kernel: &FilterKernel) -> Vec<f32> {
    let len = kernel.real_width();
    assert!(row.len() <= len, "row longer than the kernel's transform length");

    let mut planner = FftPlanner::<f32>::new();
    let mut buf = vec![Complex32::new(0.0, 0.0); len];
    for (b, &v) in buf.iter_mut().zip(row) {
        b.re = v;
    }
    planner.plan_fft_forward(len).process(&mut buf);
    for (k, b) in buf.iter_mut().enumerate() {
        *b *= kernel.full_bin(0, k);
    }
    planner.plan_fft_inverse(len).process(&mut buf);
    buf[..row.len()].iter().map(|c| c.re / len as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CustomFilter, FilterSpec, FilterType};
    use crate::geometry::{FanFlatGeometry, ParallelGeometry, ProjectionGeometry};
    use crate::kernel;

    fn kernel_for(spec: &FilterSpec, n: usize, m: usize) -> FilterKernel {
        let plan = kernel::plan(spec, n, m).unwrap();
        kernel::build(spec, &plan).unwrap().unwrap()
    }

    #[test]
    fn test_zero_row_stays_zero() {
        let k = kernel_for(&FilterSpec::new(FilterType::Hann), 32, 1);
        assert!(filter_row(&[0.0; 32], &k).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_identity_kernel_is_passthrough() {
        let n = 16;
        let ones = CustomFilter::single_row(vec![1.0; kernel::ideal_fourier_width(n)]);
        let k = kernel_for(&FilterSpec::new(FilterType::Projection).with_custom(ones), n, 1);
        let row: Vec<f32> = (0..n).map(|i| (i as f32 * 0.7).sin()).collect();
        let out = filter_row(&row, &k);
        for (a, b) in row.iter().zip(&out) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_spatial_delta_is_passthrough() {
        // A centred unit impulse convolves to the identity.
        let n = 20;
        let delta = CustomFilter::single_row(vec![0.0, 0.0, 1.0, 0.0, 0.0]);
        let k = kernel_for(&FilterSpec::new(FilterType::RProjection).with_custom(delta), n, 1);
        let row: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let out = filter_row(&row, &k);
        for (a, b) in row.iter().zip(&out) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn test_ramlak_constant_row_peaks_at_edges() {
        // The ramp impulse response is positive at 0 and non-positive
        // elsewhere, so a filtered plateau stays positive and overshoots
        // at its edges.
        let n = 32;
        let k = kernel_for(&FilterSpec::default(), n, 1);
        let out = filter_row(&[1.0; 32], &k);
        assert!(out.iter().all(|&v| v > 0.0));
        assert!(out[0] > out[n / 2]);
        assert!(out[n - 1] > out[n / 2]);
    }

    #[test]
    fn test_no_kernel_only_preweights() {
        let g = ParallelGeometry::uniform(4, 2).to_vectors();
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(filter_sinogram(&data, &g, None), data);

        let fan = FanFlatGeometry::uniform(4, 1.0, 2, 100.0, 0.0).to_vectors();
        let out = filter_sinogram(&[1.0; 8], &fan, None);
        assert!(out.iter().all(|&v| v < 1.0 && v > 0.99));
    }
}
