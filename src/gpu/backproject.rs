// gpu/backproject.rs — GPU pixel-driven back-projection.
//
// One invocation per volume pixel, dispatched over (cols, rows). The
// filtered rows and projection vectors are already resident in the run
// buffers, so a dispatch is one small uniform upload plus the kernel.
// Validated against `crate::backproject::backproject`.

use wgpu::util::DeviceExt;

use crate::gpu::buffers::RunBuffers;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::filter::{storage_entry, uniform_entry};
use crate::pipeline::RunPlan;

// ---------------------------------------------------------------------------
// Uniform params (must match WGSL struct BackprojectParams exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BackprojectParams {
    cols: u32,
    rows: u32,
    detector_count: u32,
    angle_count: u32,
    supersampling: u32,
    beam: u32,
    min_x: f32,
    max_y: f32,
    pixel_width: f32,
    pixel_height: f32,
    scale: f32,
    _pad: u32,
}

impl BackprojectParams {
    fn for_plan(plan: &RunPlan) -> Self {
        let vol = &plan.volume;
        let s = plan.supersampling;
        BackprojectParams {
            cols: vol.cols as u32,
            rows: vol.rows as u32,
            detector_count: plan.detector_count() as u32,
            angle_count: plan.angle_count() as u32,
            supersampling: s,
            beam: plan.geometry.beam.code(),
            min_x: vol.min_x,
            max_y: vol.max_y,
            pixel_width: vol.pixel_width(),
            pixel_height: vol.pixel_height(),
            scale: plan.geometry.output_scale() / (s as f32).powi(2),
            _pad: 0,
        }
    }
}

/// Compiled back-projection kernel.
pub struct GpuBackprojectPipeline {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

impl GpuBackprojectPipeline {
    pub fn new(gpu: &GpuDevice) -> Self {
        let shader_src = gpu.workgroup_size.specialise(include_str!("../shaders/backproject.wgsl"));
        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("backproject.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuBackproject BGL"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),  // filtered rows
                storage_entry(2, true),  // projection vectors
                storage_entry(3, false), // volume
            ],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GpuBackproject pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("backproject"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "backproject",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        GpuBackprojectPipeline { pipeline, bgl }
    }

    /// Overwrite `bufs.volume` with the back-projection of `bufs.filtered`.
    /// Blocks until the device is done.
    pub fn run(&self, gpu: &GpuDevice, bufs: &RunBuffers, plan: &RunPlan) -> Result<(), GpuError> {
        let params = BackprojectParams::for_plan(plan);
        gpu.capture(|| {
            let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("GpuBackproject params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("GpuBackproject BG"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: params_buf.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: bufs.filtered.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: bufs.vectors.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: bufs.volume.as_entire_binding() },
                ],
            });

            let (dx, dy) = gpu.dispatch_size(params.cols, params.rows);
            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("GpuBackproject") });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("backproject"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(dx, dy, 1);
            }
            gpu.queue.submit(std::iter::once(encoder.finish()));
            gpu.device.poll(wgpu::Maintain::Wait);
        })
    }
}
