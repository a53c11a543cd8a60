// config.rs — Algorithm configuration tree.
//
// Configurations arrive as a JSON key/value tree:
//
//   {
//     "type": "FBP_GPU",
//     "ProjectionDataId": 1,
//     "ReconstructionDataId": 2,
//     "option": {
//       "FilterType": "ram-lak",
//       "FilterWidth": 0,
//       "FilterParameter": -1,
//       "FilterD": 1.0,
//       "FilterSinogramId": 3,
//       "GPUindex": -1,
//       "PixelSuperSampling": 1
//     }
//   }
//
// Only the two data ids are required. Unknown keys anywhere are ignored.
// Data ids are resolved against a `DataStore` by the algorithm; this module
// only parses and range-checks.

use serde::{Deserialize, Serialize};

use crate::data::{DataId, DataStore};
use crate::error::{FbpError, Result};
use crate::filter::{self, FilterSpec, NO_PARAMETER};

/// Value of the `type` key for this algorithm.
pub const ALGORITHM_TYPE: &str = "FBP_GPU";

/// Parsed configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "ProjectionDataId", default)]
    pub projection_data_id: Option<u32>,
    #[serde(rename = "ReconstructionDataId", default)]
    pub reconstruction_data_id: Option<u32>,
    #[serde(default)]
    pub option: OptionTree,
}

/// The `option` subtree. Every key is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionTree {
    #[serde(rename = "FilterType", default, skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<String>,
    #[serde(rename = "FilterWidth", default, skip_serializing_if = "Option::is_none")]
    pub filter_width: Option<i64>,
    #[serde(rename = "FilterParameter", default, skip_serializing_if = "Option::is_none")]
    pub filter_parameter: Option<f32>,
    #[serde(rename = "FilterD", default, skip_serializing_if = "Option::is_none")]
    pub filter_d: Option<f32>,
    #[serde(rename = "FilterSinogramId", default, skip_serializing_if = "Option::is_none")]
    pub filter_sinogram_id: Option<u32>,
    #[serde(rename = "GPUindex", default, skip_serializing_if = "Option::is_none")]
    pub gpu_index: Option<i32>,
    #[serde(rename = "PixelSuperSampling", default, skip_serializing_if = "Option::is_none")]
    pub pixel_super_sampling: Option<i64>,
}

/// Settings of one FBP reconstruction, independent of how they were given.
#[derive(Debug, Clone, PartialEq)]
pub struct FbpOptions {
    pub filter: FilterSpec,
    /// Adapter index, -1 for the default adapter.
    pub gpu_index: i32,
    /// Sub-samples per pixel per axis, >= 1.
    pub supersampling: u32,
}

impl Default for FbpOptions {
    fn default() -> Self {
        FbpOptions { filter: FilterSpec::default(), gpu_index: -1, supersampling: 1 }
    }
}

impl AlgorithmConfig {
    /// Minimal configuration binding two data ids, all options default.
    pub fn new(projection: DataId, reconstruction: DataId) -> Self {
        AlgorithmConfig {
            kind: Some(ALGORITHM_TYPE.to_string()),
            projection_data_id: Some(projection.0),
            reconstruction_data_id: Some(reconstruction.0),
            option: OptionTree::default(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FbpError::config(format!("malformed configuration: {e}")))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| FbpError::config(format!("malformed configuration: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FbpError::config(e.to_string()))
    }

    pub fn projection_id(&self) -> Result<DataId> {
        self.projection_data_id
            .map(DataId)
            .ok_or_else(|| FbpError::config("missing required field ProjectionDataId"))
    }

    pub fn reconstruction_id(&self) -> Result<DataId> {
        self.reconstruction_data_id
            .map(DataId)
            .ok_or_else(|| FbpError::config("missing required field ReconstructionDataId"))
    }

    /// Parse the `option` subtree. `store` resolves `FilterSinogramId`.
    pub fn options(&self, store: &DataStore) -> Result<FbpOptions> {
        if let Some(kind) = &self.kind {
            if kind != ALGORITHM_TYPE {
                return Err(FbpError::config(format!(
                    "type `{kind}` is not {ALGORITHM_TYPE}"
                )));
            }
        }
        let o = &self.option;

        let family = filter::lookup(o.filter_type.as_deref().unwrap_or("ram-lak"))?;
        let mut spec = FilterSpec::new(family)
            .with_cutoff(o.filter_d.unwrap_or(1.0))
            .with_parameter(o.filter_parameter.unwrap_or(NO_PARAMETER));

        match o.filter_width.unwrap_or(0) {
            w if w < 0 => return Err(FbpError::config(format!("FilterWidth {w} is negative"))),
            w => spec = spec.with_width(w as usize),
        }

        if let Some(id) = o.filter_sinogram_id {
            let id = DataId(id);
            let data = store
                .filter(id)
                .ok_or_else(|| FbpError::config(format!("FilterSinogramId {id} does not name filter data")))?;
            spec.custom = Some(data);
        }

        let supersampling = match o.pixel_super_sampling.unwrap_or(1) {
            s if s < 1 || s > u32::MAX as i64 => {
                return Err(FbpError::config(format!("PixelSuperSampling {s} must be >= 1")));
            }
            s => s as u32,
        };

        Ok(FbpOptions { filter: spec, gpu_index: o.gpu_index.unwrap_or(-1), supersampling })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CustomFilter, FilterType};

    #[test]
    fn test_defaults() {
        let cfg = AlgorithmConfig::from_json(r#"{"ProjectionDataId": 1, "ReconstructionDataId": 2}"#).unwrap();
        let opts = cfg.options(&DataStore::new()).unwrap();
        assert_eq!(opts, FbpOptions::default());
        assert_eq!(cfg.projection_id().unwrap(), DataId(1));
    }

    #[test]
    fn test_all_options() {
        let cfg = AlgorithmConfig::from_json(
            r#"{
                "type": "FBP_GPU",
                "ProjectionDataId": 1,
                "ReconstructionDataId": 2,
                "option": {
                    "FilterType": "tukey",
                    "FilterWidth": 512,
                    "FilterParameter": 0.25,
                    "FilterD": 0.8,
                    "GPUindex": 0,
                    "PixelSuperSampling": 3,
                    "SomethingElse": [1, 2, 3]
                },
                "Unrelated": true
            }"#,
        )
        .unwrap();
        let opts = cfg.options(&DataStore::new()).unwrap();
        assert_eq!(opts.filter.family, FilterType::Tukey);
        assert_eq!(opts.filter.width, 512);
        assert_eq!(opts.filter.parameter, 0.25);
        assert_eq!(opts.filter.cutoff, 0.8);
        assert_eq!(opts.gpu_index, 0);
        assert_eq!(opts.supersampling, 3);
    }

    #[test]
    fn test_missing_bindings_named() {
        let cfg = AlgorithmConfig::from_json(r#"{"ReconstructionDataId": 2}"#).unwrap();
        let err = cfg.projection_id().unwrap_err();
        assert!(err.to_string().contains("ProjectionDataId"));
        let cfg = AlgorithmConfig::from_json(r#"{"ProjectionDataId": 2}"#).unwrap();
        assert!(cfg.reconstruction_id().unwrap_err().to_string().contains("ReconstructionDataId"));
    }

    #[test]
    fn test_bad_values() {
        let store = DataStore::new();
        let parse = |opt: &str| {
            AlgorithmConfig::from_json(&format!(
                r#"{{"ProjectionDataId": 1, "ReconstructionDataId": 2, "option": {opt}}}"#
            ))
            .and_then(|c| c.options(&store))
        };
        assert!(matches!(parse(r#"{"FilterType": "bogus"}"#), Err(FbpError::Configuration(_))));
        assert!(matches!(parse(r#"{"FilterType": "RAM-LAK"}"#), Err(FbpError::Configuration(_))));
        assert!(matches!(parse(r#"{"FilterWidth": -4}"#), Err(FbpError::Configuration(_))));
        assert!(matches!(parse(r#"{"PixelSuperSampling": 0}"#), Err(FbpError::Configuration(_))));
        assert!(matches!(parse(r#"{"FilterSinogramId": 9}"#), Err(FbpError::Configuration(_))));
        assert!(matches!(parse(r#"{"FilterD": "high"}"#), Err(FbpError::Configuration(_))));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let cfg = AlgorithmConfig::from_json(
            r#"{"type": "SIRT", "ProjectionDataId": 1, "ReconstructionDataId": 2}"#,
        )
        .unwrap();
        assert!(cfg.options(&DataStore::new()).is_err());
    }

    #[test]
    fn test_custom_filter_resolved() {
        let mut store = DataStore::new();
        let id = store.insert_filter(CustomFilter::single_row(vec![1.0; 33]));
        let mut cfg = AlgorithmConfig::new(DataId(1), DataId(2));
        cfg.option.filter_type = Some("projection".into());
        cfg.option.filter_sinogram_id = Some(id.0);
        let opts = cfg.options(&store).unwrap();
        assert_eq!(opts.filter.custom.as_ref().map(|c| c.width()), Some(33));
    }

    #[test]
    fn test_json_round_trip_keeps_keys() {
        let cfg = AlgorithmConfig::new(DataId(4), DataId(5));
        let text = cfg.to_json().unwrap();
        assert!(text.contains("ProjectionDataId"));
        assert_eq!(AlgorithmConfig::from_json(&text).unwrap(), cfg);
    }
}
