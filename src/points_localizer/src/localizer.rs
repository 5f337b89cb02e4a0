//! Interface every points localizer exposes to the surrounding system.

use nalgebra::{Matrix3, Vector3};

use crate::engine::FitnessScore;
use crate::point::{Point, PointCloud};
use crate::pose::Pose;

pub trait Localizer<S: Point, T: Point> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn set_transformation_epsilon(&mut self, epsilon: f64);
    fn set_step_size(&mut self, step_size: f64);
    fn set_resolution(&mut self, resolution: f32);
    fn set_maximum_iterations(&mut self, max_iterations: usize);

    fn transformation_epsilon(&self) -> f64;
    fn step_size(&self) -> f64;
    fn resolution(&self) -> f32;
    fn maximum_iterations(&self) -> usize;

    fn transformation_probability(&self) -> f64;
    fn centroids(&self) -> Vec<Vector3<f64>>;
    fn covariances(&self) -> Vec<Matrix3<f64>>;

    fn set_input_target(&mut self, map: &PointCloud<T>) -> Result<(), Self::Error>;
    fn set_input_source(&mut self, scan: &PointCloud<S>) -> Result<(), Self::Error>;

    /// Align the current source against the current target, starting at
    /// `predict_pose`.
    fn align(&mut self, predict_pose: &Pose) -> Result<(), Self::Error>;

    fn final_pose(&self) -> Pose;

    fn fitness_score(&self) -> f64;
    fn fitness_score_with(
        &self,
        source: &PointCloud<S>,
        max_range: f64,
    ) -> Result<FitnessScore, Self::Error>;

    /// Prepare a localizer state for `map` without disturbing the one in use.
    fn build_map(&mut self, map: &PointCloud<T>) -> Result<(), Self::Error>;

    /// Start using the state prepared by the last [`Self::build_map`].
    fn swap_instance(&mut self);

    /// One CSV line of diagnostics for the current state.
    fn log_file_content(&self) -> String {
        self.base_log_content()
    }

    /// `x,y,z,roll,pitch,yaw` of the final pose.
    fn base_log_content(&self) -> String {
        self.final_pose().to_string()
    }

    /// Set `scan` as source, align it from `predict_pose` and return the
    /// resulting pose.
    fn localize(&mut self, scan: &PointCloud<S>, predict_pose: &Pose) -> Result<Pose, Self::Error> {
        self.set_input_source(scan)?;
        self.align(predict_pose)?;
        Ok(self.final_pose())
    }

    /// Replace the map in one step: build, then swap.
    fn update_points_map(&mut self, map: &PointCloud<T>) -> Result<(), Self::Error> {
        self.build_map(map)?;
        self.swap_instance();
        Ok(())
    }
}
