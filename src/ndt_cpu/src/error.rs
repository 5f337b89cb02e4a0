//! Error types for the NDT scan matcher.

use thiserror::Error;

/// Errors reported by [`crate::NdtScanMatcher`].
///
/// Optimizer outcomes such as hitting the iteration limit are not errors; they
/// are reported through [`crate::ConvergenceStatus`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NdtError {
    /// Alignment or scoring was requested before a target cloud was set.
    #[error("no target set, call set_input_target() first")]
    NoTarget,

    /// Alignment was requested before a source cloud was set.
    #[error("no source set, call set_input_source() first")]
    NoSource,

    /// The target cloud has no points.
    #[error("target point cloud is empty")]
    EmptyTarget,

    /// The source cloud has no points.
    #[error("source point cloud is empty")]
    EmptySource,

    /// Voxel resolution must be strictly positive and finite.
    #[error("invalid voxel resolution {0}")]
    InvalidResolution(f32),
}
