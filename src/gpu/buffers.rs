// gpu/buffers.rs — Device storage for one reconstruction run.
//
// LAYOUT
// ──────
//   sinogram   f32        M × n       raw projection rows        (upload)
//   weights    f32        M × n       detector pre-weights       (upload)
//   spectrum_a vec2<f32>  M × N       transform ping buffer
//   spectrum_b vec2<f32>  M × N       transform pong buffer
//   kernel     vec2<f32>  R × F       filter weights, R = 1 or M (upload)
//   filtered   f32        M × n       filtered rows
//   vectors    ProjectionVector × M   per-angle geometry         (upload)
//   volume     f32        rows × cols reconstruction
//   readback   MAP_READ staging for volume / filtered rows
//
// M angles, n detectors, N padded real width, F = N/2 + 1 bins.
//
// OWNERSHIP
// ─────────
// `RunBuffers` is created at the start of a run and owns every buffer.
// wgpu releases a buffer when its handle drops, so dropping `RunBuffers`
// (normal return, `?` early exit or unwinding) frees the run's device
// memory. Nothing is cached between runs.
//
// Filter `none` never touches the spectrum buffers; they are still
// allocated with the minimum size so the bind group layout stays fixed.

use crate::geometry::ProjectionVector;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::pipeline::RunPlan;

const F32: u64 = std::mem::size_of::<f32>() as u64;
const COMPLEX: u64 = 2 * F32;

/// Device buffers of one run.
pub struct RunBuffers {
    pub sinogram: wgpu::Buffer,
    pub weights: wgpu::Buffer,
    pub spectrum_a: wgpu::Buffer,
    pub spectrum_b: wgpu::Buffer,
    pub kernel: wgpu::Buffer,
    pub filtered: wgpu::Buffer,
    pub vectors: wgpu::Buffer,
    pub volume: wgpu::Buffer,
    pub readback: wgpu::Buffer,
}

/// Byte sizes of every buffer for a plan. Pure, so it is checked without
/// a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    pub rows: u64,
    pub spectrum: u64,
    pub kernel: u64,
    pub vectors: u64,
    pub volume: u64,
    pub readback: u64,
}

impl BufferSizes {
    pub fn for_plan(plan: &RunPlan) -> Self {
        let m = plan.angle_count() as u64;
        let n = plan.detector_count() as u64;
        let (spectrum, kernel) = match &plan.kernel {
            Some(k) => (
                m * k.real_width() as u64 * COMPLEX,
                (k.stored_rows() * k.fourier_width()) as u64 * COMPLEX,
            ),
            None => (COMPLEX, COMPLEX),
        };
        let rows = m * n * F32;
        let volume = plan.volume.pixel_count() as u64 * F32;
        BufferSizes {
            rows,
            spectrum,
            kernel,
            vectors: m * std::mem::size_of::<ProjectionVector>() as u64,
            volume,
            readback: volume.max(rows),
        }
    }

    /// Total device memory of one run.
    pub fn total(&self) -> u64 {
        3 * self.rows + 2 * self.spectrum + self.kernel + self.vectors + self.volume + self.readback
    }
}

fn storage(gpu: &GpuDevice, label: &'static str, size: u64, extra: wgpu::BufferUsages) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | extra,
        mapped_at_creation: false,
    })
}

impl RunBuffers {
    /// Allocate every buffer for `plan`, checking sizes against the device
    /// limits first.
    pub fn allocate(gpu: &GpuDevice, plan: &RunPlan) -> Result<Self, GpuError> {
        let sizes = BufferSizes::for_plan(plan);
        for (label, bytes) in [
            ("sinogram", sizes.rows),
            ("spectrum", sizes.spectrum),
            ("kernel", sizes.kernel),
            ("vectors", sizes.vectors),
            ("volume", sizes.volume),
        ] {
            gpu.check_buffer_size(label, bytes)?;
        }
        log::debug!("allocating {} bytes of run buffers", sizes.total());

        use wgpu::BufferUsages as U;
        gpu.capture(|| RunBuffers {
            sinogram: storage(gpu, "sinogram", sizes.rows, U::COPY_DST),
            weights: storage(gpu, "weights", sizes.rows, U::COPY_DST),
            spectrum_a: storage(gpu, "spectrum_a", sizes.spectrum, U::empty()),
            spectrum_b: storage(gpu, "spectrum_b", sizes.spectrum, U::empty()),
            kernel: storage(gpu, "kernel", sizes.kernel, U::COPY_DST),
            filtered: storage(gpu, "filtered", sizes.rows, U::COPY_SRC),
            vectors: storage(gpu, "vectors", sizes.vectors, U::COPY_DST),
            volume: storage(gpu, "volume", sizes.volume, U::COPY_SRC),
            readback: gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback"),
                size: sizes.readback,
                usage: U::MAP_READ | U::COPY_DST,
                mapped_at_creation: false,
            }),
        })
    }

    /// Write the sinogram, pre-weights, kernel and projection vectors.
    pub fn upload(&self, gpu: &GpuDevice, plan: &RunPlan, sinogram: &[f32]) -> Result<(), GpuError> {
        let geometry = &plan.geometry;
        let n = plan.detector_count();
        let weights: Vec<f32> = (0..plan.angle_count())
            .flat_map(|a| (0..n).map(move |d| geometry.detector_weight(a, d)))
            .collect();

        gpu.capture(|| {
            gpu.queue.write_buffer(&self.sinogram, 0, bytemuck::cast_slice(sinogram));
            gpu.queue.write_buffer(&self.weights, 0, bytemuck::cast_slice(&weights));
            gpu.queue.write_buffer(&self.vectors, 0, bytemuck::cast_slice(&geometry.vectors));
            if let Some(kernel) = &plan.kernel {
                gpu.queue.write_buffer(&self.kernel, 0, bytemuck::cast_slice(&kernel.as_pairs()));
            }
        })
    }

    /// Copy the first `len` floats of `src` to the host.
    pub fn read_f32(&self, gpu: &GpuDevice, src: &wgpu::Buffer, len: usize) -> Result<Vec<f32>, GpuError> {
        let bytes = len as u64 * F32;
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback") });
        encoder.copy_buffer_to_buffer(src, 0, &self.readback, 0, bytes);
        gpu.capture(|| gpu.queue.submit(std::iter::once(encoder.finish())))?;

        let slice = self.readback.slice(..bytes);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            // The receiver outlives the poll below.
            let _ = tx.send(r);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| GpuError::Validation("readback callback never fired".into()))?
            .map_err(GpuError::BufferMap)?;

        let mapped = slice.get_mapped_range();
        let out = bytemuck::cast_slice::<u8, f32>(&mapped).to_vec();
        drop(mapped);
        self.readback.unmap();
        Ok(out)
    }

    /// Filtered rows, for checking the filtering stage on its own.
    pub fn read_filtered(&self, gpu: &GpuDevice, plan: &RunPlan) -> Result<Vec<f32>, GpuError> {
        self.read_f32(gpu, &self.filtered, plan.angle_count() * plan.detector_count())
    }

    pub fn read_volume(&self, gpu: &GpuDevice, plan: &RunPlan) -> Result<Vec<f32>, GpuError> {
        self.read_f32(gpu, &self.volume, plan.volume.pixel_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sinogram;
    use crate::filter::{FilterSpec, FilterType};
    use crate::geometry::{ParallelGeometry, VolumeGeometry};
    use crate::pipeline::plan_run;
    use std::sync::Arc;

    fn plan(spec: FilterSpec, n: usize, m: usize, cols: usize, rows: usize) -> RunPlan {
        let sino = Sinogram::zeros(Arc::new(ParallelGeometry::uniform(n, m)));
        plan_run(&spec, 1, &sino, &VolumeGeometry::new(cols, rows)).unwrap()
    }

    #[test]
    fn test_sizes_with_kernel() {
        let s = BufferSizes::for_plan(&plan(FilterSpec::default(), 100, 10, 64, 32));
        // N = 256, F = 129.
        assert_eq!(s.rows, 10 * 100 * 4);
        assert_eq!(s.spectrum, 10 * 256 * 8);
        assert_eq!(s.kernel, 129 * 8);
        assert_eq!(s.vectors, 10 * 32);
        assert_eq!(s.volume, 64 * 32 * 4);
        assert_eq!(s.readback, 64 * 32 * 4);
    }

    #[test]
    fn test_sizes_without_kernel() {
        let s = BufferSizes::for_plan(&plan(FilterSpec::new(FilterType::None), 100, 10, 4, 4));
        assert_eq!(s.spectrum, 8);
        assert_eq!(s.kernel, 8);
        // Readback must also fit the filtered rows.
        assert_eq!(s.readback, s.rows);
    }
}
