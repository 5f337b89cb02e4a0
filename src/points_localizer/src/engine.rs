//! The registration engine capability the localizer drives.
//!
//! Any scan matcher that can be configured with the four NDT tunables, given
//! a target and a source cloud and asked to align from an initial transform
//! can sit behind [`crate::NdtLocalizer`]. The crate ships an implementation
//! for [`ndt_cpu::NdtScanMatcher`].

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::point::{Point, PointCloud};

pub use ndt_cpu::FitnessScore;

pub trait RegistrationEngine<S: Point, T: Point>: Send + Sync {
    /// Failures of input handling and alignment, relayed by the localizer as is.
    type Error: std::error::Error + Send + Sync + 'static;

    fn set_transformation_epsilon(&mut self, epsilon: f64);
    fn transformation_epsilon(&self) -> f64;

    fn set_step_size(&mut self, step_size: f64);
    fn step_size(&self) -> f64;

    fn set_resolution(&mut self, resolution: f32);
    fn resolution(&self) -> f32;

    fn set_maximum_iterations(&mut self, max_iterations: usize);
    fn maximum_iterations(&self) -> usize;

    fn set_input_target(&mut self, target: &PointCloud<T>) -> Result<(), Self::Error>;
    fn set_input_source(&mut self, source: &PointCloud<S>) -> Result<(), Self::Error>;

    /// Align the source onto the target from `initial_guess` (source to
    /// target, homogeneous).
    fn align(&mut self, initial_guess: &Matrix4<f64>) -> Result<(), Self::Error>;

    fn final_transformation(&self) -> Matrix4<f64>;

    /// Fitness of the stored source under the final transformation.
    fn fitness_score(&self) -> f64;

    /// Fitness of `source` under the final transformation, ignoring pairs
    /// farther apart than `max_range`.
    fn fitness_score_with(
        &self,
        source: &PointCloud<S>,
        max_range: f64,
    ) -> Result<FitnessScore, Self::Error>;

    fn transformation_probability(&self) -> f64;

    fn centroids(&self) -> Vec<Vector3<f64>>;
    fn covariances(&self) -> Vec<Matrix3<f64>>;

    fn has_converged(&self) -> bool;
    fn final_num_iterations(&self) -> usize;
}
