// tests/test_algorithm.rs — Algorithm façade through the public API.
//
// Everything here fails (or is checked) before a device would be opened,
// so these run on machines without a GPU. Successful GPU runs are covered
// by the subprocess tests inside the library.

use std::sync::Arc;

use tomo_fbp::config::AlgorithmConfig;
use tomo_fbp::geometry::{FanFlatGeometry, ParallelGeometry, VolumeGeometry};
use tomo_fbp::{CustomFilter, DataStore, FbpAlgorithm, FbpError, ReconstructionAlgorithm, Sinogram, Volume};

fn parallel_store(n: usize, m: usize, side: usize) -> (DataStore, String) {
    let mut store = DataStore::new();
    let s = store.insert_sinogram(Sinogram::zeros(Arc::new(ParallelGeometry::uniform(n, m))));
    let v = store.insert_volume(Volume::zeros(VolumeGeometry::new(side, side)));
    let ids = format!(r#""ProjectionDataId": {}, "ReconstructionDataId": {}"#, s.0, v.0);
    (store, ids)
}

fn init(store: &DataStore, json: &str) -> (FbpAlgorithm, tomo_fbp::Result<()>) {
    let cfg = AlgorithmConfig::from_json(json).expect("well-formed json");
    let mut alg = FbpAlgorithm::new();
    let result = alg.initialize(&cfg, store);
    (alg, result)
}

#[test]
fn unknown_filter_type_is_configuration_error() {
    let (store, ids) = parallel_store(128, 180, 128);
    let (alg, result) = init(&store, &format!(r#"{{ {ids}, "option": {{ "FilterType": "bogus" }} }}"#));
    assert!(matches!(result, Err(FbpError::Configuration(_))));
    assert!(!alg.check());
}

#[test]
fn missing_projection_id_is_named() {
    let (store, _) = parallel_store(16, 4, 16);
    let (alg, result) = init(&store, r#"{ "ReconstructionDataId": 2 }"#);
    let err = result.unwrap_err();
    assert!(err.to_string().contains("ProjectionDataId"), "{err}");
    assert!(!alg.check());
}

#[test]
fn wrong_algorithm_type_is_rejected() {
    let (store, ids) = parallel_store(16, 4, 16);
    let (_, result) = init(&store, &format!(r#"{{ "type": "SIRT", {ids} }}"#));
    assert!(matches!(result, Err(FbpError::Configuration(_))));
}

#[test]
fn zero_supersampling_is_rejected() {
    let (store, ids) = parallel_store(16, 4, 16);
    let (_, result) = init(&store, &format!(r#"{{ {ids}, "option": {{ "PixelSuperSampling": 0 }} }}"#));
    assert!(matches!(result, Err(FbpError::Configuration(_))));
}

#[test]
fn huge_supersampling_is_rejected() {
    let (store, ids) = parallel_store(16, 4, 16);
    let (alg, result) = init(&store, &format!(r#"{{ {ids}, "option": {{ "PixelSuperSampling": 70000 }} }}"#));
    let err = result.unwrap_err();
    assert!(matches!(err, FbpError::Configuration(_)), "{err}");
    assert!(!alg.check());
}

#[test]
fn parameter_outside_range_is_filter_error() {
    let (store, ids) = parallel_store(16, 4, 16);
    let json = format!(r#"{{ {ids}, "option": {{ "FilterType": "kaiser", "FilterParameter": 50.0 }} }}"#);
    let (_, result) = init(&store, &json);
    assert!(matches!(result, Err(FbpError::FilterParameter(_))));
}

#[test]
fn custom_family_without_data_is_configuration_error() {
    let (store, ids) = parallel_store(16, 4, 16);
    let (_, result) = init(&store, &format!(r#"{{ {ids}, "option": {{ "FilterType": "sinogram" }} }}"#));
    assert!(matches!(result, Err(FbpError::Configuration(_))));
}

#[test]
fn per_angle_filter_with_wrong_row_count_is_filter_error() {
    let (mut store, ids) = parallel_store(16, 4, 16);
    let f = store.insert_filter(CustomFilter::new(17, 3, vec![1.0; 51]));
    let json = format!(r#"{{ {ids}, "option": {{ "FilterType": "sinogram", "FilterSinogramId": {} }} }}"#, f.0);
    let (_, result) = init(&store, &json);
    assert!(matches!(result, Err(FbpError::FilterParameter(_))));
}

#[test]
fn fan_source_inside_volume_is_geometry_mismatch() {
    let mut store = DataStore::new();
    let s = store.insert_sinogram(Sinogram::zeros(Arc::new(FanFlatGeometry::uniform(64, 1.0, 90, 20.0, 20.0))));
    let v = store.insert_volume(Volume::zeros(VolumeGeometry::new(64, 64)));
    let mut alg = FbpAlgorithm::new();
    let result = alg.initialize(&AlgorithmConfig::new(s, v), &store);
    assert!(matches!(result, Err(FbpError::GeometryMismatch(_))));
}

#[test]
fn out_of_range_gpu_index_is_device_error() {
    let (store, ids) = parallel_store(32, 8, 32);
    let (alg, result) = init(&store, &format!(r#"{{ {ids}, "option": {{ "GPUindex": 999 }} }}"#));
    assert!(matches!(result, Err(FbpError::Device(_))), "{result:?}");
    assert!(!alg.check());
}

#[test]
fn uninitialised_algorithm_refuses_to_run() {
    let mut alg = FbpAlgorithm::new();
    assert!(!alg.check());
    assert!(alg.run(1).is_err());
    assert_eq!(alg.description(), "FBP_GPU");
}

#[test]
fn algorithms_are_usable_as_trait_objects() {
    let algorithms: Vec<Box<dyn ReconstructionAlgorithm>> = vec![Box::new(FbpAlgorithm::new())];
    assert!(algorithms.iter().all(|a| !a.check()));
}
