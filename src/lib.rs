// tomo-fbp: GPU filtered back-projection for 2-D tomography
//
// Parallel-beam and flat-detector fan-beam reconstruction on wgpu compute,
// with a rustfft + CPU reference implementation of the same pipeline.
//
//   filter / kernel      — filter catalog and frequency-domain kernels
//   geometry / data      — projection and volume geometry, data handles
//   filtering            — CPU row filtering
//   backproject          — CPU pixel-driven back-projection
//   pipeline             — stage machine over an `FbpExecutor`
//   gpu                  — wgpu executor
//   config / algorithm   — option tree and the algorithm façade

pub mod algorithm;
pub mod backproject;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod filtering;
pub mod geometry;
pub mod gpu;
pub mod kernel;
pub mod pipeline;

pub use algorithm::{device_count, FbpAlgorithm, ReconstructionAlgorithm};
pub use config::{AlgorithmConfig, FbpOptions};
pub use data::{DataId, DataStore, Sinogram, Volume};
pub use error::{FbpError, Result};
pub use filter::{CustomFilter, FilterSpec, FilterType};
pub use geometry::{FanFlatGeometry, ParallelGeometry, ProjectionGeometry, VectorGeometry, VolumeGeometry};
pub use kernel::{generate as generate_filter_kernel, FilterKernel};
pub use pipeline::{FbpPipeline, Stage, MAX_SUPERSAMPLING};
