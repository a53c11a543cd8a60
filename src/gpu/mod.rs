// gpu/mod.rs — wgpu compute backend for the FBP pipeline.
//
// Mirrors the CPU reference in `filtering` and `backproject`; every kernel
// is checked against it in the subprocess GPU tests.
//
//   device     — adapter selection, limits, error capture
//   buffers    — per-run storage, upload and readback
//   filter     — pad / Stockham FFT / kernel multiply / extract
//   backproject — pixel-driven back-projection with supersampling
//   executor   — `FbpExecutor` tying the above together
//
// The host stays in charge between stages: a stage submits its passes,
// waits for the device, and reports any captured validation or
// out-of-memory error before the next stage starts.

pub mod backproject;
pub mod buffers;
pub mod device;
pub mod executor;
pub mod filter;

pub use executor::GpuExecutor;
