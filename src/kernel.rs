// kernel.rs — Frequency-domain filter kernel generation.
//
// Each projection row of n detector samples is zero-padded to a real
// transform length N (a power of two, at least 2n so that the circular
// convolution performed by the DFT never wraps filtered signal back onto
// itself). A real-to-complex transform of length N has F = N/2 + 1 unique
// bins; the remaining bins are the complex conjugates of bins 1..N/2-1.
//
//   ideal_real_width(n)    = next_pow2(2n)
//   ideal_fourier_width(n) = ideal_real_width(n) / 2 + 1
//
// Bin k has normalised frequency x = 2k/N, so x = 1 is Nyquist. Analytic
// families are the ramp x times a window evaluated at u = x / D:
//
//   H(k) = x * w(u)   for x <= D
//   H(k) = 0          for x >  D
//
// Every window is 1 at u = 0, so D only stretches the window and places
// the hard cutoff. Custom families skip the formula: frequency-domain rows
// are copied, spatial-domain rows are centred, zero-padded and transformed.
//
// The kernel stores complex weights. Analytic families have zero imaginary
// part; transformed spatial kernels generally do not.

use std::f64::consts::PI;

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

use crate::error::{FbpError, Result};
use crate::filter::{CustomDomain, CustomFilter, FilterSpec, FilterType};

// ---------------------------------------------------------------------------
// Ideal widths
// ---------------------------------------------------------------------------

/// Smallest power-of-two transform length that filters `detector_count`
/// samples without wraparound.
///
/// ```
/// use tomo_fbp::kernel::ideal_real_width;
/// assert_eq!(ideal_real_width(128), 256);
/// assert_eq!(ideal_real_width(129), 512);
/// assert_eq!(ideal_real_width(0), 2);
/// ```
pub fn ideal_real_width(detector_count: usize) -> usize {
    (2 * detector_count).max(2).next_power_of_two()
}

/// Number of unique frequency bins for [`ideal_real_width`]:
/// `ideal_real_width(n) == 2 * (ideal_fourier_width(n) - 1)`.
pub fn ideal_fourier_width(detector_count: usize) -> usize {
    fourier_width_for(ideal_real_width(detector_count))
}

/// Unique bins of a real transform of length `real_width`.
pub fn fourier_width_for(real_width: usize) -> usize {
    real_width / 2 + 1
}

// ---------------------------------------------------------------------------
// FilterKernel
// ---------------------------------------------------------------------------

/// Generated (or converted custom) per-bin weights.
///
/// Holds either a single row broadcast to every angle or one row per angle.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterKernel {
    real_width: usize,
    fourier_width: usize,
    angle_count: usize,
    rows: usize,
    weights: Vec<Complex32>,
}

impl FilterKernel {
    fn shared(real_width: usize, angle_count: usize, row: Vec<Complex32>) -> Self {
        let fourier_width = row.len();
        FilterKernel { real_width, fourier_width, angle_count, rows: 1, weights: row }
    }

    /// Padded real transform length N.
    pub fn real_width(&self) -> usize {
        self.real_width
    }

    /// Bins per row, N/2 + 1.
    pub fn fourier_width(&self) -> usize {
        self.fourier_width
    }

    pub fn angle_count(&self) -> usize {
        self.angle_count
    }

    /// Stored rows: 1 when shared by every angle, otherwise `angle_count`.
    pub fn stored_rows(&self) -> usize {
        self.rows
    }

    pub fn is_shared(&self) -> bool {
        self.rows == 1
    }

    /// Weights applied to projection `angle`.
    pub fn row(&self, angle: usize) -> &[Complex32] {
        let r = if self.rows == 1 { 0 } else { angle };
        &self.weights[r * self.fourier_width..(r + 1) * self.fourier_width]
    }

    /// Weight for full-spectrum bin `k` in `0..real_width`, using conjugate
    /// symmetry for the upper half.
    pub fn full_bin(&self, angle: usize, k: usize) -> Complex32 {
        let row = self.row(angle);
        if k < self.fourier_width {
            row[k]
        } else {
            row[self.real_width - k].conj()
        }
    }

    /// One row per angle, `angle_count * fourier_width` entries.
    pub fn to_dense(&self) -> Vec<Complex32> {
        (0..self.angle_count).flat_map(|a| self.row(a).iter().copied()).collect()
    }

    /// Stored rows as `[re, im]` pairs for GPU upload.
    pub fn as_pairs(&self) -> Vec<[f32; 2]> {
        self.weights.iter().map(|c| [c.re, c.im]).collect()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Transform sizes resolved for one sinogram shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelPlan {
    pub detector_count: usize,
    pub angle_count: usize,
    pub real_width: usize,
    pub fourier_width: usize,
}

/// Resolve transform sizes for `spec` and validate its width against the
/// ideal width for `detector_count`.
///
/// Undersized widths are rejected, never resized: a kernel shorter than the
/// ideal would alias.
pub fn plan(spec: &FilterSpec, detector_count: usize, angle_count: usize) -> Result<KernelPlan> {
    let ideal = ideal_real_width(detector_count);

    let real_width = match (spec.family.custom_domain(), spec.custom.as_deref()) {
        (None, _) => analytic_width(spec, ideal)?,
        (Some(_), None) => {
            return Err(FbpError::config(format!(
                "{} filter requires custom filter data",
                spec.family
            )));
        }
        (Some(domain), Some(custom)) => {
            check_custom_rows(spec.family, custom, angle_count)?;
            let width = custom_row_width(spec, custom)?;
            match domain {
                CustomDomain::Frequency => frequency_width(width, ideal)?,
                CustomDomain::Spatial => (detector_count + width - 1).next_power_of_two().max(ideal),
            }
        }
    };

    Ok(KernelPlan {
        detector_count,
        angle_count,
        real_width,
        fourier_width: fourier_width_for(real_width),
    })
}

fn analytic_width(spec: &FilterSpec, ideal: usize) -> Result<usize> {
    match spec.width {
        0 => Ok(ideal),
        w if !w.is_power_of_two() => Err(FbpError::filter(format!(
            "filter width {w} is not a power of two"
        ))),
        w if w < ideal => Err(FbpError::filter(format!(
            "filter width {w} is undersized (ideal width is {ideal})"
        ))),
        w => Ok(w),
    }
}

fn custom_row_width(spec: &FilterSpec, custom: &CustomFilter) -> Result<usize> {
    if custom.width() == 0 {
        return Err(FbpError::filter("custom filter data is empty"));
    }
    match spec.width {
        0 => Ok(custom.width()),
        w if w == custom.width() => Ok(w),
        w => Err(FbpError::filter(format!(
            "filter width {w} does not match custom filter rows of width {}",
            custom.width()
        ))),
    }
}

fn check_custom_rows(family: FilterType, custom: &CustomFilter, angle_count: usize) -> Result<()> {
    let expected = if family.is_per_angle() { angle_count } else { 1 };
    if custom.rows() != expected {
        return Err(FbpError::filter(format!(
            "{family} filter needs {expected} row(s), got {}",
            custom.rows()
        )));
    }
    Ok(())
}

/// A frequency-domain row of `bins` weights implies N = 2 (bins - 1).
fn frequency_width(bins: usize, ideal: usize) -> Result<usize> {
    let ideal_bins = fourier_width_for(ideal);
    if bins < ideal_bins {
        return Err(FbpError::filter(format!(
            "custom filter has {bins} frequency bins, undersized (ideal is {ideal_bins})"
        )));
    }
    let real_width = 2 * (bins - 1);
    if !real_width.is_power_of_two() {
        return Err(FbpError::filter(format!(
            "custom filter with {bins} bins implies transform length {real_width}, \
             which is not a power of two"
        )));
    }
    Ok(real_width)
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Build the kernel for `spec` at the sizes in `plan`.
///
/// Returns `Ok(None)` for [`FilterType::None`]: the pipeline skips
/// filtering entirely in that case.
pub fn build(spec: &FilterSpec, plan: &KernelPlan) -> Result<Option<FilterKernel>> {
    spec.validate()?;
    if spec.family == FilterType::None {
        return Ok(None);
    }
    let kernel = match (spec.family.custom_domain(), spec.custom.as_deref()) {
        (Some(CustomDomain::Frequency), Some(custom)) => frequency_kernel(custom, plan),
        (Some(CustomDomain::Spatial), Some(custom)) => spatial_kernel(custom, plan),
        (Some(_), None) => {
            return Err(FbpError::config(format!(
                "{} filter requires custom filter data",
                spec.family
            )));
        }
        (None, _) => generate(
            spec.family,
            spec.cutoff,
            plan.angle_count,
            plan.real_width,
            plan.fourier_width,
            spec.effective_parameter(),
        )?,
    };
    Ok(Some(kernel))
}

/// Generate an analytic kernel. Side-effect free; usable for inspection
/// without running a reconstruction.
///
/// `FilterType::None` yields an all-ones kernel (the identity filter).
///
/// # Errors
/// - `FilterParameter` for a cutoff outside (0, 1], a parameter outside
///   the family's range (or on a family without one), or inconsistent
///   widths.
/// - `Configuration` for custom families, which need caller data.
pub fn generate(
    family: FilterType,
    cutoff: f32,
    angle_count: usize,
    real_width: usize,
    fourier_width: usize,
    parameter: Option<f32>,
) -> Result<FilterKernel> {
    if family.is_custom() {
        return Err(FbpError::config(format!(
            "{family} filter is built from custom data, not generated"
        )));
    }
    if real_width < 2 || !real_width.is_power_of_two() {
        return Err(FbpError::filter(format!(
            "real width {real_width} must be a power of two >= 2"
        )));
    }
    if fourier_width != fourier_width_for(real_width) {
        return Err(FbpError::filter(format!(
            "fourier width {fourier_width} inconsistent with real width {real_width} \
             (expected {})",
            fourier_width_for(real_width)
        )));
    }

    let mut spec = FilterSpec::new(family).with_cutoff(cutoff);
    if let Some(p) = parameter {
        spec = spec.with_parameter(p);
    }
    spec.validate()?;

    if family == FilterType::None {
        let row = vec![Complex32::new(1.0, 0.0); fourier_width];
        return Ok(FilterKernel::shared(real_width, angle_count, row));
    }

    let shape = spec.effective_parameter().unwrap_or(0.0) as f64;
    let d = cutoff as f64;
    let row = (0..fourier_width)
        .map(|k| {
            let x = 2.0 * k as f64 / real_width as f64;
            let value = if x > d { 0.0 } else { x * window(family, x / d, shape) };
            Complex32::new(value as f32, 0.0)
        })
        .collect();

    Ok(FilterKernel::shared(real_width, angle_count, row))
}

/// Window value at normalised frequency `u` in [0, 1] (u = x / D).
///
/// Every window is 1 at u = 0. `shape` is the family's shape parameter
/// (ignored by families without one).
pub fn window(family: FilterType, u: f64, shape: f64) -> f64 {
    match family {
        FilterType::RamLak | FilterType::None => 1.0,
        FilterType::SheppLogan => sinc(u / 2.0),
        FilterType::Cosine => (PI * u / 2.0).cos(),
        FilterType::Hamming => 0.54 + 0.46 * (PI * u).cos(),
        FilterType::Hann => 0.5 * (1.0 + (PI * u).cos()),
        FilterType::Tukey => {
            let flat = 1.0 - shape;
            if u <= flat {
                1.0
            } else {
                0.5 * (1.0 + (PI * (u - flat) / shape).cos())
            }
        }
        FilterType::Lanczos => sinc(u),
        FilterType::Triangular => 1.0 - u,
        FilterType::Gaussian => (-0.5 * (u / shape).powi(2)).exp(),
        FilterType::BarlettHann => 0.62 - 0.24 * u + 0.38 * (PI * u).cos(),
        FilterType::Blackman => {
            cosine_sum(&[(1.0 - shape) / 2.0, 0.5, shape / 2.0], u)
        }
        FilterType::Nuttall => cosine_sum(&[0.355768, 0.487396, 0.144232, 0.012604], u),
        FilterType::BlackmanHarris => cosine_sum(&[0.35875, 0.48829, 0.14128, 0.01168], u),
        FilterType::BlackmanNuttall => {
            cosine_sum(&[0.3635819, 0.4891775, 0.1365995, 0.0106411], u)
        }
        FilterType::FlatTop => cosine_sum(&[1.0, 1.93, 1.29, 0.388, 0.028], u),
        FilterType::Kaiser => {
            let arg = (1.0 - u * u).max(0.0).sqrt();
            bessel_i0(PI * shape * arg) / bessel_i0(PI * shape)
        }
        FilterType::Parzen => {
            if u <= 0.5 {
                1.0 - 6.0 * u * u * (1.0 - u)
            } else {
                2.0 * (1.0 - u).powi(3)
            }
        }
        FilterType::Projection
        | FilterType::Sinogram
        | FilterType::RProjection
        | FilterType::RSinogram => 1.0,
    }
}

/// Normalised sinc, sin(pi x) / (pi x).
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Generalised cosine window centred at u = 0 and normalised to 1 there.
/// The alternating signs of the textbook form cancel under the shift.
fn cosine_sum(coeffs: &[f64], u: f64) -> f64 {
    let total: f64 = coeffs.iter().sum();
    let value: f64 = coeffs
        .iter()
        .enumerate()
        .map(|(k, a)| a * (k as f64 * PI * u).cos())
        .sum();
    value / total
}

/// Zeroth-order modified Bessel function of the first kind (power series).
fn bessel_i0(x: f64) -> f64 {
    let half_sq = (x / 2.0).powi(2);
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > 1e-14 * sum {
        term *= half_sq / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}

fn frequency_kernel(custom: &CustomFilter, plan: &KernelPlan) -> FilterKernel {
    let weights: Vec<Complex32> = custom
        .as_slice()
        .iter()
        .map(|&w| Complex32::new(w, 0.0))
        .collect();
    FilterKernel {
        real_width: plan.real_width,
        fourier_width: plan.fourier_width,
        angle_count: plan.angle_count,
        rows: custom.rows(),
        weights,
    }
}

/// Centre each spatial row at (width - 1) / 2, wrap it into a zero-padded
/// row of length N and keep the first N/2 + 1 bins of its transform.
fn spatial_kernel(custom: &CustomFilter, plan: &KernelPlan) -> FilterKernel {
    let n = plan.real_width;
    let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
    let centre = (custom.width() as isize - 1) / 2;

    let mut weights = Vec::with_capacity(custom.rows() * plan.fourier_width);
    let mut buf = vec![Complex32::new(0.0, 0.0); n];
    for r in 0..custom.rows() {
        buf.fill(Complex32::new(0.0, 0.0));
        for (j, &v) in custom.row(r).iter().enumerate() {
            let idx = (j as isize - centre).rem_euclid(n as isize) as usize;
            buf[idx].re += v;
        }
        fft.process(&mut buf);
        weights.extend_from_slice(&buf[..plan.fourier_width]);
    }

    FilterKernel {
        real_width: n,
        fourier_width: plan.fourier_width,
        angle_count: plan.angle_count,
        rows: custom.rows(),
        weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ideal_widths_small() {
        assert_eq!(ideal_real_width(1), 2);
        assert_eq!(ideal_real_width(2), 4);
        assert_eq!(ideal_real_width(3), 8);
        assert_eq!(ideal_fourier_width(3), 5);
        assert_eq!(ideal_real_width(0), 2);
        assert_eq!(ideal_fourier_width(0), 2);
        assert_eq!(ideal_real_width(0), 2 * (ideal_fourier_width(0) - 1));
    }

    #[test]
    fn test_windows_are_one_at_dc() {
        for family in FilterType::all() {
            let shape = family.parameter_range().map(|r| r.default).unwrap_or(0.0) as f64;
            let w = window(family, 0.0, shape);
            assert!((w - 1.0).abs() < 1e-9, "{family}: w(0) = {w}");
        }
    }

    #[test]
    fn test_hann_and_hamming_at_nyquist() {
        assert!(window(FilterType::Hann, 1.0, 0.0).abs() < 1e-12);
        assert!((window(FilterType::Hamming, 1.0, 0.0) - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_tukey_zero_alpha_is_flat() {
        for i in 0..=10 {
            assert_eq!(window(FilterType::Tukey, i as f64 / 10.0, 0.0), 1.0);
        }
    }

    #[test]
    fn test_parzen_continuous_at_half() {
        let a = window(FilterType::Parzen, 0.5 - 1e-9, 0.0);
        let b = window(FilterType::Parzen, 0.5 + 1e-9, 0.0);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn test_bessel_i0_known_values() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-12);
        assert!((bessel_i0(1.0) - 1.266_065_877_752_008_4).abs() < 1e-10);
    }

    #[test]
    fn test_generate_rejects_custom_family() {
        let err = generate(FilterType::Projection, 1.0, 1, 8, 5, None).unwrap_err();
        assert!(matches!(err, FbpError::Configuration(_)));
    }

    #[test]
    fn test_generate_rejects_inconsistent_widths() {
        assert!(generate(FilterType::RamLak, 1.0, 1, 8, 4, None).is_err());
        assert!(generate(FilterType::RamLak, 1.0, 1, 12, 7, None).is_err());
    }

    #[test]
    fn test_ramlak_exact_values() {
        let k = generate(FilterType::RamLak, 1.0, 3, 8, 5, None).unwrap();
        let row: Vec<f32> = k.row(0).iter().map(|c| c.re).collect();
        assert_eq!(row, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(k.is_shared());
        assert_eq!(k.to_dense().len(), 15);
    }

    #[test]
    fn test_full_bin_uses_conjugate_symmetry() {
        let custom = CustomFilter::single_row(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let spec = FilterSpec::new(FilterType::RProjection).with_custom(custom);
        let p = plan(&spec, 3, 1).unwrap();
        let k = build(&spec, &p).unwrap().unwrap();
        for bin in 1..p.fourier_width - 1 {
            let hi = k.full_bin(0, p.real_width - bin);
            let lo = k.full_bin(0, bin);
            assert!((hi - lo.conj()).norm() < 1e-6);
        }
    }

    #[test]
    fn test_spatial_delta_kernel_is_flat() {
        // A centred unit impulse transforms to all-ones weights.
        let custom = CustomFilter::single_row(vec![0.0, 1.0, 0.0]);
        let spec = FilterSpec::new(FilterType::RProjection).with_custom(custom);
        let p = plan(&spec, 4, 2).unwrap();
        let k = build(&spec, &p).unwrap().unwrap();
        for c in k.row(1) {
            assert!((c.re - 1.0).abs() < 1e-6 && c.im.abs() < 1e-6);
        }
    }

    #[test]
    fn test_build_none_is_skipped() {
        let spec = FilterSpec::new(FilterType::None);
        let p = plan(&spec, 16, 4).unwrap();
        assert!(build(&spec, &p).unwrap().is_none());
    }
}
