//! CPU Normal Distributions Transform (NDT) scan matching.
//!
//! The algorithm is split into phases:
//! - voxel grid construction from the map point cloud
//! - derivative computation (score, gradient, Hessian)
//! - Newton optimisation
//! - scoring (transformation probability, point-to-point fitness)
//!
//! ```ignore
//! use ndt_cpu::NdtScanMatcher;
//! use nalgebra::Isometry3;
//!
//! let mut matcher = NdtScanMatcher::new(2.0);
//! matcher.set_input_target(load_map());
//! matcher.set_input_source(lidar_scan());
//! matcher.align(Isometry3::identity())?;
//! println!("converged: {}", matcher.has_converged());
//! ```

pub mod derivatives;
pub mod error;
pub mod ndt;
pub mod optimization;
pub mod scoring;
pub mod test_utils;
pub mod voxel_grid;

pub use derivatives::{AngularDerivatives, Derivatives, GaussianParams};
pub use error::NdtError;
pub use optimization::{ConvergenceStatus, NdtConfig, NdtOptimizer, NdtResult, OptimizationConfig};
pub use scoring::{compute_transform_probability, FitnessScore, TargetTree};
pub use voxel_grid::{Voxel, VoxelGrid, VoxelGridConfig};

pub use ndt::{NdtScanMatcher, NdtScanMatcherBuilder, NdtScanMatcherConfig};
