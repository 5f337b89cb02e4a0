//! Alignment quality figures:
//! - transformation probability, the NDT score averaged over the source cloud
//! - fitness, the mean squared point-to-point distance after alignment

pub mod fitness;
pub mod metrics;

pub use fitness::{FitnessScore, TargetTree};
pub use metrics::compute_transform_probability;
