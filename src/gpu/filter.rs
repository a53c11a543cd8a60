// gpu/filter.rs — GPU row filtering: pad, FFT, multiply, inverse FFT.
//
// FFT
// ───
// Radix-2 Stockham, one dispatch per stage, ping-ponging between the two
// spectrum buffers. Stage s (half-span Ns = 2^s) computes for every
// j in [0, N/2):
//
//   v0 = src[j]
//   v1 = src[j + N/2] · e^{i·dir·2π·(j mod Ns)/(2Ns)}
//   d  = (j / Ns)·2Ns + (j mod Ns)
//   dst[d] = v0 + v1,  dst[d + Ns] = v0 − v1
//
// After log2 N stages the spectrum is in natural order; no bit reversal.
// dir = −1 is the forward transform, +1 the unnormalised inverse (the
// 1/N is applied by extract_rows).
//
// Buffer parity: pad writes A. The forward stages end in A if log2 N is
// even, else B; the kernel multiplies in place there; the inverse stages
// (same count) always end back in A, which extract_rows reads.
//
// All dispatches of a run go into one command encoder; compute passes in
// one submission execute in order with storage writes visible to later
// passes.

use wgpu::util::DeviceExt;

use crate::gpu::buffers::RunBuffers;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::pipeline::RunPlan;

// ---------------------------------------------------------------------------
// Uniform params (must match WGSL struct FilterParams exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct FilterParams {
    detector_count: u32,
    angle_count: u32,
    real_width: u32,
    fourier_width: u32,
    stage_span: u32,
    kernel_shared: u32,
    direction: f32,
    _pad: u32,
}

const FORWARD: f32 = -1.0;
const INVERSE: f32 = 1.0;

/// Compiled filtering kernels. Create once per device.
pub struct GpuFilterPipeline {
    pad_rows: wgpu::ComputePipeline,
    fft_stage: wgpu::ComputePipeline,
    apply_kernel: wgpu::ComputePipeline,
    extract_rows: wgpu::ComputePipeline,
    weight_rows: wgpu::ComputePipeline,
    buffers_bgl: wgpu::BindGroupLayout,
    params_bgl: wgpu::BindGroupLayout,
}

pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Number of radix-2 stages for a power-of-two length.
pub(crate) fn stage_count(real_width: usize) -> u32 {
    debug_assert!(real_width.is_power_of_two());
    real_width.trailing_zeros()
}

impl GpuFilterPipeline {
    pub fn new(gpu: &GpuDevice) -> Self {
        let shader_src = gpu.workgroup_size.specialise(include_str!("../shaders/filter.wgsl"));
        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("filter.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let buffers_bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuFilter buffers BGL"),
            entries: &[
                storage_entry(0, true),  // sino
                storage_entry(1, true),  // weights
                storage_entry(2, true),  // spectrum_src
                storage_entry(3, false), // spectrum_dst
                storage_entry(4, true),  // kern
                storage_entry(5, false), // filtered
            ],
        });
        let params_bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuFilter params BGL"),
            entries: &[uniform_entry(0)],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GpuFilter pipeline layout"),
            bind_group_layouts: &[&buffers_bgl, &params_bgl],
            push_constant_ranges: &[],
        });

        let make = |entry_point: &'static str| {
            gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&layout),
                module: &shader,
                entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        GpuFilterPipeline {
            pad_rows: make("pad_rows"),
            fft_stage: make("fft_stage"),
            apply_kernel: make("apply_kernel"),
            extract_rows: make("extract_rows"),
            weight_rows: make("weight_rows"),
            buffers_bgl,
            params_bgl,
        }
    }

    fn buffers_group(&self, gpu: &GpuDevice, bufs: &RunBuffers, src: &wgpu::Buffer, dst: &wgpu::Buffer) -> wgpu::BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GpuFilter buffers BG"),
            layout: &self.buffers_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: bufs.sinogram.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: bufs.weights.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: src.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: dst.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: bufs.kernel.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: bufs.filtered.as_entire_binding() },
            ],
        })
    }

    fn params_group(&self, gpu: &GpuDevice, params: FilterParams) -> wgpu::BindGroup {
        let buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GpuFilter params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GpuFilter params BG"),
            layout: &self.params_bgl,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: buf.as_entire_binding() }],
        })
    }

    /// Filter every row of the uploaded sinogram into `bufs.filtered`.
    /// Blocks until the device is done.
    pub fn run(&self, gpu: &GpuDevice, bufs: &RunBuffers, plan: &RunPlan) -> Result<(), GpuError> {
        let n = plan.detector_count() as u32;
        let m = plan.angle_count() as u32;

        let mut base = FilterParams {
            detector_count: n,
            angle_count: m,
            real_width: 0,
            fourier_width: 0,
            stage_span: 0,
            kernel_shared: 0,
            direction: FORWARD,
            _pad: 0,
        };
        if let Some(k) = &plan.kernel {
            base.real_width = k.real_width() as u32;
            base.fourier_width = k.fourier_width() as u32;
            base.kernel_shared = k.is_shared() as u32;
        }

        gpu.capture(|| {
            let ab = self.buffers_group(gpu, bufs, &bufs.spectrum_a, &bufs.spectrum_b);
            let ba = self.buffers_group(gpu, bufs, &bufs.spectrum_b, &bufs.spectrum_a);

            let mut encoder = gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("GpuFilter") });

            // (pipeline, buffers group, params, width of the x index space)
            let mut passes: Vec<(&wgpu::ComputePipeline, &wgpu::BindGroup, FilterParams, u32)> = Vec::new();

            if plan.kernel.is_none() {
                passes.push((&self.weight_rows, &ab, base, n));
            } else {
                let len = base.real_width;
                let stages = stage_count(len as usize);
                // `ba` writes A, `ab` writes B.
                passes.push((&self.pad_rows, &ba, base, len));

                let mut in_a = true;
                for direction in [FORWARD, INVERSE] {
                    if direction == INVERSE {
                        let group = if in_a { &ba } else { &ab };
                        passes.push((&self.apply_kernel, group, base, len));
                    }
                    for s in 0..stages {
                        let params = FilterParams { stage_span: 1 << s, direction, ..base };
                        let group = if in_a { &ab } else { &ba };
                        passes.push((&self.fft_stage, group, params, len / 2));
                        in_a = !in_a;
                    }
                }
                debug_assert!(in_a);
                passes.push((&self.extract_rows, &ab, base, n));
            }

            let params_groups: Vec<wgpu::BindGroup> =
                passes.iter().map(|(_, _, p, _)| self.params_group(gpu, *p)).collect();

            for ((pipeline, group, _, width), params) in passes.iter().zip(&params_groups) {
                let (dx, dy) = gpu.dispatch_size(*width, m);
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("GpuFilter pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, group, &[]);
                pass.set_bind_group(1, params, &[]);
                pass.dispatch_workgroups(dx, dy, 1);
            }

            gpu.queue.submit(std::iter::once(encoder.finish()));
            gpu.device.poll(wgpu::Maintain::Wait);
        })
    }
}
