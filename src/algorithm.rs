// algorithm.rs — The FBP algorithm façade.
//
// Lifecycle:
//
//   initialize(config, store)   parse, bind data, validate, select device
//   check()                     runnable? (bound data still alive, device up)
//   run(iterations)             one analytic pass; `iterations` is ignored
//
// `ReconstructionAlgorithm` is the capability set shared with iterative
// algorithms, so callers can hold any of them as `Box<dyn ...>`.
//
// Data is bound through `Weak` handles. The algorithm never keeps a
// sinogram or volume alive: if the caller drops them, `check()` turns false
// and `run` refuses to start.

use std::sync::{RwLock, Weak};

use crate::config::{AlgorithmConfig, FbpOptions, ALGORITHM_TYPE};
use crate::data::{DataStore, Sinogram, SinogramHandle, Volume, VolumeHandle};
use crate::error::{FbpError, Result};
use crate::gpu::device::GpuDevice;
use crate::gpu::GpuExecutor;
use crate::pipeline::{plan_run, FbpPipeline, Stage};

/// Operations shared by every reconstruction algorithm.
pub trait ReconstructionAlgorithm {
    /// Parse `config`, resolve its data ids in `store` and prepare to run.
    /// Calling it again discards the previous binding.
    fn initialize(&mut self, config: &AlgorithmConfig, store: &DataStore) -> Result<()>;

    /// Run the algorithm. Analytic algorithms ignore `iterations`.
    fn run(&mut self, iterations: u32) -> Result<()>;

    /// True when `run` may be called.
    fn check(&self) -> bool;

    fn description(&self) -> &'static str;
}

/// Number of GPU adapters visible to the process (0 if none).
pub fn device_count() -> usize {
    GpuDevice::count()
}

/// GPU filtered back-projection.
#[derive(Debug, Default)]
pub struct FbpAlgorithm {
    sinogram: Weak<Sinogram>,
    volume: Weak<RwLock<Volume>>,
    options: FbpOptions,
    pipeline: Option<FbpPipeline<GpuExecutor>>,
}

impl FbpAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct-parameter initialisation, bypassing configuration parsing.
    pub fn initialize_with(
        &mut self,
        sinogram: &SinogramHandle,
        volume: &VolumeHandle,
        options: FbpOptions,
    ) -> Result<()> {
        self.clear();

        let volume_geometry = *volume
            .read()
            .map_err(|_| FbpError::config("reconstruction volume lock is poisoned"))?
            .geometry();
        // Filter and geometry problems surface here, before a device is opened.
        plan_run(&options.filter, options.supersampling, sinogram, &volume_geometry)?;

        let executor = GpuExecutor::new(options.gpu_index)?;
        log::info!(
            "{ALGORITHM_TYPE} initialised on {}: filter {}, supersampling {}",
            executor.device(),
            options.filter.family,
            options.supersampling
        );

        self.pipeline = Some(FbpPipeline::new(executor, options.filter.clone(), options.supersampling));
        self.sinogram = SinogramHandle::downgrade(sinogram);
        self.volume = VolumeHandle::downgrade(volume);
        self.options = options;
        Ok(())
    }

    pub fn options(&self) -> &FbpOptions {
        &self.options
    }

    /// Stage of the last run, `None` before initialisation.
    pub fn stage(&self) -> Option<Stage> {
        self.pipeline.as_ref().map(|p| p.stage())
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

impl ReconstructionAlgorithm for FbpAlgorithm {
    fn initialize(&mut self, config: &AlgorithmConfig, store: &DataStore) -> Result<()> {
        self.clear();

        let projection_id = config.projection_id()?;
        let reconstruction_id = config.reconstruction_id()?;
        let options = config.options(store)?;

        let sinogram = store.sinogram(projection_id).ok_or_else(|| {
            FbpError::config(format!("ProjectionDataId {projection_id} does not name a sinogram"))
        })?;
        let volume = store.volume(reconstruction_id).ok_or_else(|| {
            FbpError::config(format!("ReconstructionDataId {reconstruction_id} does not name a volume"))
        })?;

        self.initialize_with(&sinogram, &volume, options)
    }

    fn run(&mut self, iterations: u32) -> Result<()> {
        if iterations > 1 {
            log::debug!("{ALGORITHM_TYPE} is a single pass; ignoring iterations = {iterations}");
        }
        let (Some(pipeline), Some(sinogram), Some(volume)) =
            (self.pipeline.as_mut(), self.sinogram.upgrade(), self.volume.upgrade())
        else {
            return Err(FbpError::config("algorithm is not initialised or its data was released"));
        };

        let mut volume = volume
            .write()
            .map_err(|_| FbpError::config("reconstruction volume lock is poisoned"))?;
        pipeline.reset();
        pipeline.execute(&sinogram, &mut volume)
    }

    fn check(&self) -> bool {
        self.pipeline.is_some() && self.sinogram.strong_count() > 0 && self.volume.strong_count() > 0
    }

    fn description(&self) -> &'static str {
        ALGORITHM_TYPE
    }
}
