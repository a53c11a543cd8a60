// pipeline.rs — FBP run orchestration.
//
// One `execute` walks the stage machine
//
//   Unconfigured → Validated → Allocated → Filtering → BackProjecting → Done
//                      └──────────┴────────────┴──────────────┴──────→ Failed
//
// Done and Failed are terminal; `reset` returns to Unconfigured.
//
// The stages themselves are delegated to an `FbpExecutor`. The executor
// owns the device-side storage of one run through its associated
// `Buffers` type, which the pipeline creates in Allocated and drops when
// `execute` returns, whatever the outcome. Two executors exist:
//
//   gpu::GpuExecutor   — wgpu compute, used by the algorithm façade
//   ReferenceExecutor  — rustfft + CPU loops, the numerical reference

use crate::backproject;
use crate::data::{Sinogram, Volume};
use crate::error::{FbpError, Result};
use crate::filter::FilterSpec;
use crate::filtering;
use crate::geometry::{check_compatible, VectorGeometry, VolumeGeometry};
use crate::kernel::{self, FilterKernel};

/// Pipeline progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unconfigured,
    Validated,
    Allocated,
    Filtering,
    BackProjecting,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

/// Largest accepted `PixelSuperSampling`. Each pixel takes S² samples per
/// angle, so larger factors only multiply run time.
pub const MAX_SUPERSAMPLING: u32 = 64;

/// Everything an executor needs for one run, resolved and validated.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub geometry: VectorGeometry,
    pub volume: VolumeGeometry,
    /// `None` for filter family `none`: rows are only pre-weighted.
    pub kernel: Option<FilterKernel>,
    pub supersampling: u32,
}

impl RunPlan {
    pub fn detector_count(&self) -> usize {
        self.geometry.detector_count
    }

    pub fn angle_count(&self) -> usize {
        self.geometry.angle_count()
    }
}

/// Validate inputs and resolve the kernel for one run.
pub fn plan_run(
    spec: &FilterSpec,
    supersampling: u32,
    sinogram: &Sinogram,
    volume: &VolumeGeometry,
) -> Result<RunPlan> {
    if supersampling == 0 {
        return Err(FbpError::config("PixelSuperSampling must be at least 1"));
    }
    if supersampling > MAX_SUPERSAMPLING {
        return Err(FbpError::config(format!(
            "PixelSuperSampling {supersampling} exceeds the maximum of {MAX_SUPERSAMPLING}"
        )));
    }
    let geometry = sinogram.geometry().to_vectors();
    if geometry.angle_count() != sinogram.angle_count() {
        return Err(FbpError::geometry(format!(
            "geometry produced {} projection vectors for {} angles",
            geometry.angle_count(),
            sinogram.angle_count()
        )));
    }
    check_compatible(&geometry, volume)?;

    let kernel_plan = kernel::plan(spec, geometry.detector_count, geometry.angle_count())?;
    let kernel = kernel::build(spec, &kernel_plan)?;
    Ok(RunPlan { geometry, volume: *volume, kernel, supersampling })
}

/// Backend that carries out the data-parallel stages.
pub trait FbpExecutor {
    /// Storage for one run. Dropping it releases everything.
    type Buffers;

    fn allocate(&mut self, plan: &RunPlan) -> Result<Self::Buffers>;
    fn upload(&mut self, buffers: &mut Self::Buffers, plan: &RunPlan, sinogram: &[f32]) -> Result<()>;
    fn filter(&mut self, buffers: &mut Self::Buffers, plan: &RunPlan) -> Result<()>;
    fn backproject(&mut self, buffers: &mut Self::Buffers, plan: &RunPlan) -> Result<()>;
    fn download(&mut self, buffers: &mut Self::Buffers, plan: &RunPlan, volume: &mut [f32]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FbpPipeline
// ---------------------------------------------------------------------------

/// Drives an executor through one reconstruction.
#[derive(Debug)]
pub struct FbpPipeline<E: FbpExecutor> {
    executor: E,
    spec: FilterSpec,
    supersampling: u32,
    stage: Stage,
}

impl<E: FbpExecutor> FbpPipeline<E> {
    pub fn new(executor: E, spec: FilterSpec, supersampling: u32) -> Self {
        FbpPipeline { executor, spec, supersampling, stage: Stage::Unconfigured }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Return to Unconfigured so the pipeline can run again.
    pub fn reset(&mut self) {
        self.stage = Stage::Unconfigured;
    }

    /// Reconstruct `sinogram` into `volume`, overwriting its contents.
    ///
    /// On error the pipeline ends in `Failed`, run buffers are released and
    /// `volume` is left as it was.
    pub fn execute(&mut self, sinogram: &Sinogram, volume: &mut Volume) -> Result<()> {
        if self.stage != Stage::Unconfigured {
            return Err(FbpError::InvalidState { expected: Stage::Unconfigured, found: self.stage });
        }
        match self.run_stages(sinogram, volume) {
            Ok(()) => {
                self.enter(Stage::Done);
                Ok(())
            }
            Err(e) => {
                log::warn!("FBP run failed in stage {:?}: {e}", self.stage);
                self.stage = Stage::Failed;
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("FBP stage {:?} → {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn run_stages(&mut self, sinogram: &Sinogram, volume: &mut Volume) -> Result<()> {
        let plan = plan_run(&self.spec, self.supersampling, sinogram, volume.geometry())?;
        log::info!(
            "FBP: {} angles × {} detectors → {}×{} volume, filter {}, padded width {}, supersampling {}",
            plan.angle_count(),
            plan.detector_count(),
            plan.volume.cols,
            plan.volume.rows,
            self.spec.family,
            plan.kernel.as_ref().map_or(0, |k| k.real_width()),
            plan.supersampling,
        );
        self.enter(Stage::Validated);

        let mut buffers = self.executor.allocate(&plan)?;
        self.executor.upload(&mut buffers, &plan, sinogram.as_slice())?;
        self.enter(Stage::Allocated);

        self.enter(Stage::Filtering);
        self.executor.filter(&mut buffers, &plan)?;

        self.enter(Stage::BackProjecting);
        self.executor.backproject(&mut buffers, &plan)?;

        let mut pixels = vec![0.0f32; plan.volume.pixel_count()];
        self.executor.download(&mut buffers, &plan, &mut pixels)?;
        volume.overwrite(&pixels);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReferenceExecutor
// ---------------------------------------------------------------------------

/// CPU executor built on `filtering` and `backproject`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceExecutor;

/// Host copies standing in for device buffers.
#[derive(Debug, Default)]
pub struct ReferenceBuffers {
    sinogram: Vec<f32>,
    filtered: Vec<f32>,
    volume: Vec<f32>,
}

impl FbpExecutor for ReferenceExecutor {
    type Buffers = ReferenceBuffers;

    fn allocate(&mut self, plan: &RunPlan) -> Result<ReferenceBuffers> {
        let samples = plan.angle_count() * plan.detector_count();
        Ok(ReferenceBuffers {
            sinogram: Vec::with_capacity(samples),
            filtered: Vec::new(),
            volume: Vec::with_capacity(plan.volume.pixel_count()),
        })
    }

    fn upload(&mut self, buffers: &mut ReferenceBuffers, _plan: &RunPlan, sinogram: &[f32]) -> Result<()> {
        buffers.sinogram.clear();
        buffers.sinogram.extend_from_slice(sinogram);
        Ok(())
    }

    fn filter(&mut self, buffers: &mut ReferenceBuffers, plan: &RunPlan) -> Result<()> {
        buffers.filtered = filtering::filter_sinogram(&buffers.sinogram, &plan.geometry, plan.kernel.as_ref());
        Ok(())
    }

    fn backproject(&mut self, buffers: &mut ReferenceBuffers, plan: &RunPlan) -> Result<()> {
        buffers.volume =
            backproject::backproject(&buffers.filtered, &plan.geometry, &plan.volume, plan.supersampling);
        Ok(())
    }

    fn download(&mut self, buffers: &mut ReferenceBuffers, _plan: &RunPlan, volume: &mut [f32]) -> Result<()> {
        volume.copy_from_slice(&buffers.volume);
        Ok(())
    }
}

/// Reconstruct on the CPU in one call.
pub fn reconstruct_reference(
    spec: &FilterSpec,
    supersampling: u32,
    sinogram: &Sinogram,
    volume: &mut Volume,
) -> Result<()> {
    FbpPipeline::new(ReferenceExecutor, spec.clone(), supersampling).execute(sinogram, volume)
}
