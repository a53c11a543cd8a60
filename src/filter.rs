// filter.rs — Filter catalog and filter specification.
//
// The catalog is a pure lookup from a textual token to a `FilterType`.
// There is no registry and no process-wide state: the table below is a
// `const` slice and `lookup()` is a linear scan over ~20 entries.
//
// Families fall into three classes:
//
//   analytic windows   — ram-lak, shepp-logan, cosine, hamming, hann, ...
//                        generated from the ramp |f| times a window w(f/D)
//   parameterized      — tukey, gaussian, blackman, kaiser: analytic windows
//                        with one shape parameter in a documented range
//   custom             — projection / sinogram (frequency-domain weights)
//                        rprojection / rsinogram (spatial-domain kernels)
//                        supplied by the caller, one row or one per angle
//
// A `FilterSpec` bundles family, width, shape parameter, cutoff and custom
// data. `validate()` rejects combinations that cannot be meaningful (a shape
// parameter on ram-lak, custom rows on hann, ...) instead of ignoring them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{FbpError, Result};

/// Sentinel for "no shape parameter". Any negative value means unset.
pub const NO_PARAMETER: f32 = -1.0;

/// Filter family identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// No filtering: back-project the (pre-weighted) sinogram as is.
    None,
    RamLak,
    SheppLogan,
    Cosine,
    Hamming,
    Hann,
    Tukey,
    Lanczos,
    Triangular,
    Gaussian,
    BarlettHann,
    Blackman,
    Nuttall,
    BlackmanHarris,
    BlackmanNuttall,
    FlatTop,
    Kaiser,
    Parzen,
    /// Custom frequency-domain weights, one row shared by every angle.
    Projection,
    /// Custom frequency-domain weights, one row per projection angle.
    Sinogram,
    /// Custom spatial-domain kernel, one row shared by every angle.
    RProjection,
    /// Custom spatial-domain kernel, one row per projection angle.
    RSinogram,
}

/// (family, token, display name). Both strings are accepted by `lookup`.
const CATALOG: &[(FilterType, &str, &str)] = &[
    (FilterType::None, "none", "None"),
    (FilterType::RamLak, "ram-lak", "Ram-Lak"),
    (FilterType::SheppLogan, "shepp-logan", "Shepp-Logan"),
    (FilterType::Cosine, "cosine", "Cosine"),
    (FilterType::Hamming, "hamming", "Hamming"),
    (FilterType::Hann, "hann", "Hann"),
    (FilterType::Tukey, "tukey", "Tukey"),
    (FilterType::Lanczos, "lanczos", "Lanczos"),
    (FilterType::Triangular, "triangular", "Triangular"),
    (FilterType::Gaussian, "gaussian", "Gaussian"),
    (FilterType::BarlettHann, "barlett-hann", "Barlett-Hann"),
    (FilterType::Blackman, "blackman", "Blackman"),
    (FilterType::Nuttall, "nuttall", "Nuttall"),
    (FilterType::BlackmanHarris, "blackman-harris", "Blackman-Harris"),
    (FilterType::BlackmanNuttall, "blackman-nuttall", "Blackman-Nuttall"),
    (FilterType::FlatTop, "flat-top", "Flat-Top"),
    (FilterType::Kaiser, "kaiser", "Kaiser"),
    (FilterType::Parzen, "parzen", "Parzen"),
    (FilterType::Projection, "projection", "Projection"),
    (FilterType::Sinogram, "sinogram", "Sinogram"),
    (FilterType::RProjection, "rprojection", "RProjection"),
    (FilterType::RSinogram, "rsinogram", "RSinogram"),
];

/// Map a case-sensitive filter token to its family.
///
/// # Errors
/// `FbpError::Configuration` for any token not in the catalog.
///
/// ```
/// use tomo_fbp::filter::{lookup, FilterType};
/// assert_eq!(lookup("ram-lak").unwrap(), FilterType::RamLak);
/// assert_eq!(lookup("Ram-Lak").unwrap(), FilterType::RamLak);
/// assert!(lookup("RAM-LAK").is_err());
/// ```
pub fn lookup(name: &str) -> Result<FilterType> {
    CATALOG
        .iter()
        .find(|(_, token, display)| *token == name || *display == name)
        .map(|(family, _, _)| *family)
        .ok_or_else(|| FbpError::config(format!("unrecognized filter type `{name}`")))
}

/// Where custom filter rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomDomain {
    /// Rows are frequency-bin weights (N/2 + 1 bins).
    Frequency,
    /// Rows are spatial convolution kernels, centred at (width - 1) / 2.
    Spatial,
}

/// Valid range and default for a family's shape parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    /// `false` for ranges open at the bottom, e.g. gaussian sigma in (0, 1].
    pub min_inclusive: bool,
    pub default: f32,
}

impl ParameterRange {
    pub fn contains(&self, value: f32) -> bool {
        let above_min = if self.min_inclusive { value >= self.min } else { value > self.min };
        above_min && value <= self.max
    }
}

impl fmt::Display for ParameterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.min_inclusive { '[' } else { '(' };
        write!(f, "{} in {open}{}, {}]", self.name, self.min, self.max)
    }
}

impl FilterType {
    /// Canonical catalog token.
    pub fn token(self) -> &'static str {
        CATALOG
            .iter()
            .find(|(family, _, _)| *family == self)
            .map(|(_, token, _)| *token)
            .unwrap_or("none")
    }

    /// Every family in catalog order.
    pub fn all() -> impl Iterator<Item = FilterType> {
        CATALOG.iter().map(|(family, _, _)| *family)
    }

    /// Shape-parameter range, or `None` for families without a parameter.
    pub fn parameter_range(self) -> Option<ParameterRange> {
        match self {
            FilterType::Tukey => Some(ParameterRange {
                name: "alpha", min: 0.0, max: 1.0, min_inclusive: true, default: 0.5,
            }),
            FilterType::Gaussian => Some(ParameterRange {
                name: "sigma", min: 0.0, max: 1.0, min_inclusive: false, default: 0.5,
            }),
            FilterType::Blackman => Some(ParameterRange {
                name: "alpha", min: 0.0, max: 1.0, min_inclusive: true, default: 0.16,
            }),
            FilterType::Kaiser => Some(ParameterRange {
                name: "alpha", min: 0.0, max: 40.0, min_inclusive: true, default: 3.0,
            }),
            _ => None,
        }
    }

    /// Domain of caller-supplied rows, `None` for generated families.
    pub fn custom_domain(self) -> Option<CustomDomain> {
        match self {
            FilterType::Projection | FilterType::Sinogram => Some(CustomDomain::Frequency),
            FilterType::RProjection | FilterType::RSinogram => Some(CustomDomain::Spatial),
            _ => None,
        }
    }

    pub fn is_custom(self) -> bool {
        self.custom_domain().is_some()
    }

    /// True when the family expects one row per projection angle.
    pub fn is_per_angle(self) -> bool {
        matches!(self, FilterType::Sinogram | FilterType::RSinogram)
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for FilterType {
    type Err = FbpError;

    fn from_str(s: &str) -> Result<Self> {
        lookup(s)
    }
}

// ---------------------------------------------------------------------------
// Custom filter data
// ---------------------------------------------------------------------------

/// Caller-supplied filter rows, row-major, `rows * width` values.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFilter {
    width: usize,
    rows: usize,
    data: Vec<f32>,
}

impl CustomFilter {
    /// # Panics
    /// Panics if `data.len() != width * rows`.
    pub fn new(width: usize, rows: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            width * rows,
            "custom filter data length ({}) must equal width * rows ({})",
            data.len(),
            width * rows,
        );
        CustomFilter { width, rows, data }
    }

    /// A single row shared by all angles.
    pub fn single_row(data: Vec<f32>) -> Self {
        let width = data.len();
        CustomFilter::new(width, 1, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

// ---------------------------------------------------------------------------
// FilterSpec
// ---------------------------------------------------------------------------

/// Everything needed to build a filter kernel for one reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub family: FilterType,
    /// Analytic families: padded transform length (0 = ideal).
    /// Custom families: elements per supplied row (0 = take from the data).
    pub width: usize,
    /// Shape parameter; negative means "not set".
    pub parameter: f32,
    /// Cutoff as a fraction of Nyquist, in (0, 1].
    pub cutoff: f32,
    pub custom: Option<Arc<CustomFilter>>,
}

impl FilterSpec {
    pub fn new(family: FilterType) -> Self {
        FilterSpec {
            family,
            width: 0,
            parameter: NO_PARAMETER,
            cutoff: 1.0,
            custom: None,
        }
    }

    pub fn with_cutoff(mut self, cutoff: f32) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_parameter(mut self, parameter: f32) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_custom(mut self, custom: CustomFilter) -> Self {
        self.custom = Some(Arc::new(custom));
        self
    }

    /// The shape parameter to use, with the family default applied.
    /// `None` for families without a parameter.
    pub fn effective_parameter(&self) -> Option<f32> {
        self.family.parameter_range().map(|range| {
            if self.parameter_is_set() { self.parameter } else { range.default }
        })
    }

    fn parameter_is_set(&self) -> bool {
        // NaN is "set" so that it reaches the range check and is rejected.
        !(self.parameter < 0.0)
    }

    /// Geometry-independent validation.
    ///
    /// Width checks need the detector count and live in
    /// [`crate::kernel::plan`].
    pub fn validate(&self) -> Result<()> {
        if !(self.cutoff > 0.0 && self.cutoff <= 1.0) {
            return Err(FbpError::filter(format!(
                "cutoff D = {} outside (0, 1]",
                self.cutoff
            )));
        }

        if self.parameter_is_set() {
            match self.family.parameter_range() {
                Some(range) if range.contains(self.parameter) => {}
                Some(range) => {
                    return Err(FbpError::filter(format!(
                        "{} filter parameter {} outside valid range: {range}",
                        self.family, self.parameter
                    )));
                }
                None => {
                    return Err(FbpError::filter(format!(
                        "{} filter does not take a shape parameter (got {})",
                        self.family, self.parameter
                    )));
                }
            }
        }

        match (self.family.is_custom(), &self.custom) {
            (true, None) => Err(FbpError::config(format!(
                "{} filter requires custom filter data",
                self.family
            ))),
            (false, Some(_)) => Err(FbpError::config(format!(
                "{} filter does not accept custom filter data",
                self.family
            ))),
            (true, Some(custom)) if custom.width() == 0 || custom.rows() == 0 => {
                Err(FbpError::filter("custom filter data is empty"))
            }
            _ => Ok(()),
        }
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec::new(FilterType::RamLak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_token_round_trips() {
        for family in FilterType::all() {
            assert_eq!(lookup(family.token()).unwrap(), family);
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(lookup("Hamming").is_ok());
        assert!(lookup("HAMMING").is_err());
        assert!(lookup("hAmming").is_err());
    }

    #[test]
    fn test_unknown_token_is_configuration_error() {
        let err = lookup("bogus").unwrap_err();
        assert!(matches!(err, FbpError::Configuration(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_from_str() {
        let f: FilterType = "shepp-logan".parse().unwrap();
        assert_eq!(f, FilterType::SheppLogan);
    }

    #[test]
    fn test_parameter_rejected_on_unparameterized_family() {
        let spec = FilterSpec::new(FilterType::RamLak).with_parameter(0.5);
        assert!(matches!(spec.validate(), Err(FbpError::FilterParameter(_))));
    }

    #[test]
    fn test_parameter_range_enforced() {
        let ok = FilterSpec::new(FilterType::Tukey).with_parameter(1.0);
        assert!(ok.validate().is_ok());
        let bad = FilterSpec::new(FilterType::Tukey).with_parameter(1.5);
        assert!(matches!(bad.validate(), Err(FbpError::FilterParameter(_))));
        // Gaussian sigma is open at zero.
        let zero = FilterSpec::new(FilterType::Gaussian).with_parameter(0.0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_nan_parameter_rejected() {
        let spec = FilterSpec::new(FilterType::Kaiser).with_parameter(f32::NAN);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_effective_parameter_defaults() {
        assert_eq!(FilterSpec::new(FilterType::Tukey).effective_parameter(), Some(0.5));
        assert_eq!(
            FilterSpec::new(FilterType::Kaiser).with_parameter(5.0).effective_parameter(),
            Some(5.0)
        );
        assert_eq!(FilterSpec::new(FilterType::Hann).effective_parameter(), None);
    }

    #[test]
    fn test_cutoff_range() {
        assert!(FilterSpec::new(FilterType::Hann).with_cutoff(1.0).validate().is_ok());
        assert!(FilterSpec::new(FilterType::Hann).with_cutoff(0.0).validate().is_err());
        assert!(FilterSpec::new(FilterType::Hann).with_cutoff(1.01).validate().is_err());
    }

    #[test]
    fn test_custom_data_pairing() {
        let missing = FilterSpec::new(FilterType::Projection);
        assert!(matches!(missing.validate(), Err(FbpError::Configuration(_))));

        let extra = FilterSpec::new(FilterType::Hann)
            .with_custom(CustomFilter::single_row(vec![1.0; 5]));
        assert!(matches!(extra.validate(), Err(FbpError::Configuration(_))));

        let ok = FilterSpec::new(FilterType::Projection)
            .with_custom(CustomFilter::single_row(vec![1.0; 5]));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_custom_filter_rows() {
        let f = CustomFilter::new(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(f.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "width * rows")]
    fn test_custom_filter_length_mismatch_panics() {
        CustomFilter::new(3, 2, vec![0.0; 5]);
    }
}
