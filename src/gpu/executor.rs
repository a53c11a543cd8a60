// gpu/executor.rs — `FbpExecutor` on wgpu.
//
// Holds the device and the compiled kernels; the per-run storage lives in
// `RunBuffers`, created by `allocate` and dropped by the pipeline when the
// run ends. Each stage blocks until the device has finished, so a stage
// error is reported by the stage that caused it.

use crate::error::Result;
use crate::gpu::backproject::GpuBackprojectPipeline;
use crate::gpu::buffers::RunBuffers;
use crate::gpu::device::{DeviceProfile, GpuDevice, GpuError};
use crate::gpu::filter::GpuFilterPipeline;
use crate::pipeline::{FbpExecutor, RunPlan};

/// Production executor.
pub struct GpuExecutor {
    // Pipelines drop before the device they were created on.
    filter: GpuFilterPipeline,
    backproject: GpuBackprojectPipeline,
    gpu: GpuDevice,
}

impl GpuExecutor {
    /// Select adapter `index` (-1 = default) and compile the kernels.
    pub fn new(index: i32) -> Result<Self> {
        Self::with_profile(index, DeviceProfile::Native)
    }

    pub fn with_profile(index: i32, profile: DeviceProfile) -> Result<Self> {
        let gpu = GpuDevice::select_with_profile(index, profile)?;
        Ok(Self::from_device(gpu)?)
    }

    /// Compile the kernels on an already opened device.
    pub fn from_device(gpu: GpuDevice) -> std::result::Result<Self, GpuError> {
        let (filter, backproject) =
            gpu.capture(|| (GpuFilterPipeline::new(&gpu), GpuBackprojectPipeline::new(&gpu)))?;
        Ok(GpuExecutor { filter, backproject, gpu })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }
}

impl std::fmt::Debug for GpuExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuExecutor").field("gpu", &self.gpu).finish()
    }
}

impl FbpExecutor for GpuExecutor {
    type Buffers = RunBuffers;

    fn allocate(&mut self, plan: &RunPlan) -> Result<RunBuffers> {
        Ok(RunBuffers::allocate(&self.gpu, plan)?)
    }

    fn upload(&mut self, buffers: &mut RunBuffers, plan: &RunPlan, sinogram: &[f32]) -> Result<()> {
        Ok(buffers.upload(&self.gpu, plan, sinogram)?)
    }

    fn filter(&mut self, buffers: &mut RunBuffers, plan: &RunPlan) -> Result<()> {
        Ok(self.filter.run(&self.gpu, buffers, plan)?)
    }

    fn backproject(&mut self, buffers: &mut RunBuffers, plan: &RunPlan) -> Result<()> {
        Ok(self.backproject.run(&self.gpu, buffers, plan)?)
    }

    fn download(&mut self, buffers: &mut RunBuffers, plan: &RunPlan, volume: &mut [f32]) -> Result<()> {
        let pixels = buffers.read_volume(&self.gpu, plan)?;
        volume.copy_from_slice(&pixels);
        Ok(())
    }
}
