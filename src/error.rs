// error.rs — Crate-wide error type.
//
// Four failure classes, one per stage that can reject a reconstruction:
//
//   Configuration     — missing/invalid fields, unknown filter token
//   GeometryMismatch  — sinogram and volume cannot be combined
//   Device            — adapter selection, allocation, shader/dispatch errors
//   FilterParameter   — shape parameter out of range, undersized kernel
//
// None of them are retried. A failed `initialize` leaves the algorithm
// non-runnable; a failed `run` leaves the output volume undefined.

use crate::gpu::device::GpuError;
use crate::pipeline::Stage;

/// Errors produced while configuring or running a reconstruction.
#[derive(Debug, thiserror::Error)]
pub enum FbpError {
    /// A configuration field is missing or holds an invalid value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Sinogram, volume and projection geometry are not compatible.
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// The GPU could not be selected, allocated or driven.
    #[error("device error: {0}")]
    Device(#[from] GpuError),

    /// A filter shape parameter, cutoff or custom kernel was rejected.
    #[error("filter parameter error: {0}")]
    FilterParameter(String),

    /// A pipeline operation was requested from the wrong stage.
    #[error("pipeline is in stage {found:?}, expected {expected:?}")]
    InvalidState { expected: Stage, found: Stage },
}

impl FbpError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        FbpError::Configuration(msg.into())
    }

    pub(crate) fn geometry(msg: impl Into<String>) -> Self {
        FbpError::GeometryMismatch(msg.into())
    }

    pub(crate) fn filter(msg: impl Into<String>) -> Self {
        FbpError::FilterParameter(msg.into())
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, FbpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_class() {
        let e = FbpError::config("missing ProjectionDataId");
        assert_eq!(e.to_string(), "configuration error: missing ProjectionDataId");

        let e = FbpError::filter("tukey alpha 1.5 outside [0, 1]");
        assert!(e.to_string().starts_with("filter parameter error"));
    }

    #[test]
    fn test_device_error_converts() {
        let e: FbpError = GpuError::InvalidIndex { index: 999, count: 1 }.into();
        assert!(matches!(e, FbpError::Device(GpuError::InvalidIndex { index: 999, count: 1 })));
        assert!(e.to_string().contains("999"));
    }

    #[test]
    fn test_invalid_state_message() {
        let e = FbpError::InvalidState { expected: Stage::Unconfigured, found: Stage::Done };
        assert_eq!(e.to_string(), "pipeline is in stage Done, expected Unconfigured");
    }
}
