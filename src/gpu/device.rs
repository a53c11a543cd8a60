// gpu/device.rs — Adapter enumeration, device selection and GPU errors.
//
// Responsibilities:
//   - Enumerate adapters in a stable order and report how many exist.
//   - Open the adapter at a caller-given index (-1 = default).
//   - Expose a `DeviceProfile` that caps limits to portable values so
//     that code which only fits a large desktop GPU fails on the dev box.
//   - Provide `WorkgroupSize` and `dispatch_size` for 2D dispatches.
//   - Turn wgpu's asynchronous error reporting into `GpuError` values.
//
// ADAPTER ORDER:
// Index 0 must be the device a user would expect, not whatever the loader
// happens to list first. Adapters from the primary backends (Vulkan,
// Metal, DX12) are sorted by tier, keeping enumeration order within a tier:
//
//   DiscreteGpu  — dedicated card                 tier 0
//   IntegratedGpu — iGPU                          tier 1
//   VirtualGpu / Other — VM pass-through, dzn      tier 2
//   Cpu          — llvmpipe / WARP / SwiftShader  tier 3
//
// Software adapters are listed last, not dropped.
//
// WORKGROUP SIZES:
// The wgpu 22 WGSL front end only accepts const-expressions inside
// @workgroup_size(), so `override` constants set through
// `PipelineCompilationOptions::constants` cannot size a workgroup. The
// shaders carry `{{WG_X}}` / `{{WG_Y}}` tokens instead and each pipeline is
// compiled once, at executor construction, from the specialised source.
//
// ERROR CAPTURE:
// wgpu reports validation and out-of-memory errors through an uncaptured
// error handler that panics by default. Every run stage is wrapped in
// `GpuDevice::capture`, which pushes error scopes around the work and
// converts whatever was caught into `GpuError`. Nothing is retried.

use std::fmt;

/// Hardware profile controlling requested limits and default workgroup size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Use wgpu's default limits.
    Native,
    /// Cap invocations and storage bindings to values every mainstream
    /// compute-capable GPU supports.
    Portable,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::Portable => write!(f, "Portable (capped limits)"),
        }
    }
}

/// A workgroup size for 2D compute dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Fill the `{{WG_X}}` / `{{WG_Y}}` placeholders of a WGSL template.
    ///
    /// Every placeholder is replaced; a template with none is returned
    /// unchanged.
    pub fn specialise(&self, template: &str) -> String {
        template
            .replace("{{WG_X}}", &self.x.to_string())
            .replace("{{WG_Y}}", &self.y.to_string())
    }

    /// 16×8 = 128 invocations on desktop GPUs (4 NVIDIA warps, 2 AMD
    /// waves); 8×8 = 64 under the portable profile.
    fn for_profile(profile: DeviceProfile) -> Self {
        match profile {
            DeviceProfile::Native => WorkgroupSize { x: 16, y: 8 },
            DeviceProfile::Portable => WorkgroupSize { x: 8, y: 8 },
        }
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(raw: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: raw.name,
            vendor: raw.vendor,
            device: raw.device,
            device_type: raw.device_type,
            backend: raw.backend,
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The GPU context used by one reconstruction: device, queue and profile.
///
/// # Field drop order
/// Fields drop top to bottom. `_instance` is last so the instance outlives
/// `device` and `queue`; some drivers (dzn on WSL2) crash when the instance
/// is destroyed first.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    /// Position of the adapter in `GpuDevice::adapters()`.
    pub index: usize,
    pub workgroup_size: WorkgroupSize,
    _instance: wgpu::Instance,
}

fn make_instance() -> wgpu::Instance {
    let flags = if cfg!(debug_assertions) {
        wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
    } else {
        wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
    };
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        flags,
        ..Default::default()
    })
}

fn tier(device_type: wgpu::DeviceType) -> u8 {
    match device_type {
        wgpu::DeviceType::DiscreteGpu => 0,
        wgpu::DeviceType::IntegratedGpu => 1,
        wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 2,
        wgpu::DeviceType::Cpu => 3,
    }
}

/// Adapters of `instance` in selection order.
fn ordered_adapters(instance: &wgpu::Instance) -> Vec<wgpu::Adapter> {
    let mut adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
    // Stable sort: ties keep the loader's order.
    adapters.sort_by_key(|a| tier(a.get_info().device_type));
    adapters
}

/// Map a requested index onto `0..count`. -1 selects entry 0.
fn resolve_index(index: i32, count: usize) -> Result<usize, GpuError> {
    match index {
        -1 if count == 0 => Err(GpuError::NoSuitableAdapter),
        -1 => Ok(0),
        i if i >= 0 && (i as usize) < count => Ok(i as usize),
        i => Err(GpuError::InvalidIndex { index: i, count }),
    }
}

impl GpuDevice {
    /// Number of usable adapters. Zero is a valid answer, not an error.
    pub fn count() -> usize {
        ordered_adapters(&make_instance()).len()
    }

    /// Adapters in selection order.
    pub fn adapters() -> Vec<AdapterInfo> {
        ordered_adapters(&make_instance())
            .into_iter()
            .map(|a| a.get_info().into())
            .collect()
    }

    /// Open the default adapter with native limits.
    pub fn new() -> Result<Self, GpuError> {
        Self::select(-1)
    }

    /// Open adapter `index` (-1 = default) with native limits.
    pub fn select(index: i32) -> Result<Self, GpuError> {
        Self::select_with_profile(index, DeviceProfile::Native)
    }

    pub fn select_with_profile(index: i32, profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(index, profile))
    }

    async fn init_async(index: i32, profile: DeviceProfile) -> Result<Self, GpuError> {
        let instance = make_instance();
        let mut adapters = ordered_adapters(&instance);
        for (i, a) in adapters.iter().enumerate() {
            let info = a.get_info();
            log::debug!("adapter {i}: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        let chosen = resolve_index(index, adapters.len())?;
        let adapter = adapters.swap_remove(chosen);
        let adapter_info: AdapterInfo = adapter.get_info().into();
        if adapter_info.device_type == wgpu::DeviceType::Cpu {
            log::warn!("using software adapter {adapter_info}; reconstruction will be slow");
        }

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tomo-fbp"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        let gpu = GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            index: chosen,
            workgroup_size: WorkgroupSize::for_profile(profile),
            _instance: instance,
        };
        log::info!("selected {gpu}");
        Ok(gpu)
    }

    /// Override the default workgroup size, validating against the profile.
    pub fn set_workgroup_size(&mut self, x: u32, y: u32) -> Result<(), GpuError> {
        let total = x * y;
        let max = max_invocations_for_profile(self.profile);
        if total > max {
            return Err(GpuError::WorkgroupTooLarge { total, max });
        }
        self.workgroup_size = WorkgroupSize { x, y };
        Ok(())
    }

    /// Workgroups needed to cover a `w × h` index space (ceiling division).
    /// Shaders must discard out-of-range invocations.
    pub fn dispatch_size(&self, w: u32, h: u32) -> (u32, u32) {
        dispatch_for(self.workgroup_size, w, h)
    }

    /// Reject storage buffers the device cannot bind.
    pub fn check_buffer_size(&self, label: &'static str, bytes: u64) -> Result<(), GpuError> {
        let limits = self.device.limits();
        let max = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if bytes > max {
            return Err(GpuError::BufferTooLarge { label, requested: bytes, max });
        }
        Ok(())
    }

    /// Run `work` inside validation and out-of-memory error scopes.
    ///
    /// The scopes are popped even if `work` panics, so a caller that
    /// catches the unwind keeps a balanced scope stack.
    pub fn capture<T>(&self, work: impl FnOnce() -> T) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let scopes = ErrorScopes { device: &self.device, open: true };
        let out = work();
        let (validation, oom) = scopes.pop();
        if let Some(e) = oom {
            return Err(GpuError::OutOfMemory(e.to_string()));
        }
        if let Some(e) = validation {
            return Err(GpuError::Validation(e.to_string()));
        }
        Ok(out)
    }
}

/// The two scopes pushed by `GpuDevice::capture`, innermost first.
struct ErrorScopes<'a> {
    device: &'a wgpu::Device,
    open: bool,
}

impl ErrorScopes<'_> {
    fn pop(mut self) -> (Option<wgpu::Error>, Option<wgpu::Error>) {
        self.open = false;
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        (validation, oom)
    }
}

impl Drop for ErrorScopes<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = pollster::block_on(self.device.pop_error_scope());
            let _ = pollster::block_on(self.device.pop_error_scope());
        }
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ #{}: {}, profile: {}, workgroup: {} }}",
            self.index, self.adapter_info, self.profile, self.workgroup_size
        )
    }
}

impl fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn dispatch_for(ws: WorkgroupSize, w: u32, h: u32) -> (u32, u32) {
    (w.div_ceil(ws.x), h.div_ceil(ws.y))
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::Portable => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn max_invocations_for_profile(profile: DeviceProfile) -> u32 {
    limits_for_profile(profile).max_compute_invocations_per_workgroup
}

// ============================================================
// Error type
// ============================================================

/// Errors from device selection, allocation and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no GPU adapter available")]
    NoSuitableAdapter,

    #[error("GPU index {index} out of range ({count} adapter(s) available)")]
    InvalidIndex { index: i32, count: usize },

    #[error("device request failed: {0}")]
    DeviceRequest(#[source] wgpu::RequestDeviceError),

    #[error("workgroup size {total} exceeds profile limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },

    #[error("{label} buffer needs {requested} bytes, device allows {max}")]
    BufferTooLarge { label: &'static str, requested: u64, max: u64 },

    #[error("GPU validation error: {0}")]
    Validation(String),

    #[error("GPU out of memory: {0}")]
    OutOfMemory(String),

    #[error("buffer readback failed: {0}")]
    BufferMap(#[source] wgpu::BufferAsyncError),
}

// ============================================================
// Tests
// ============================================================
