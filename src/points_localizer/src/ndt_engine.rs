//! [`RegistrationEngine`] for the CPU NDT scan matcher.
//!
//! Clouds are reduced to their positions on the way in; that copy is the
//! only one made between the caller's cloud and the voxel grid.

use nalgebra::{Matrix3, Matrix4, Vector3};
use ndt_cpu::{FitnessScore, NdtError, NdtScanMatcher};

use crate::engine::RegistrationEngine;
use crate::point::{Point, PointCloud};
use crate::pose::matrix_to_isometry;

impl<S: Point, T: Point> RegistrationEngine<S, T> for NdtScanMatcher {
    type Error = NdtError;

    fn set_transformation_epsilon(&mut self, epsilon: f64) {
        NdtScanMatcher::set_transformation_epsilon(self, epsilon);
    }

    fn transformation_epsilon(&self) -> f64 {
        NdtScanMatcher::transformation_epsilon(self)
    }

    fn set_step_size(&mut self, step_size: f64) {
        NdtScanMatcher::set_step_size(self, step_size);
    }

    fn step_size(&self) -> f64 {
        NdtScanMatcher::step_size(self)
    }

    fn set_resolution(&mut self, resolution: f32) {
        NdtScanMatcher::set_resolution(self, resolution);
    }

    fn resolution(&self) -> f32 {
        NdtScanMatcher::resolution(self)
    }

    fn set_maximum_iterations(&mut self, max_iterations: usize) {
        NdtScanMatcher::set_maximum_iterations(self, max_iterations);
    }

    fn maximum_iterations(&self) -> usize {
        NdtScanMatcher::maximum_iterations(self)
    }

    fn set_input_target(&mut self, target: &PointCloud<T>) -> Result<(), NdtError> {
        NdtScanMatcher::set_input_target(self, target.positions());
        Ok(())
    }

    fn set_input_source(&mut self, source: &PointCloud<S>) -> Result<(), NdtError> {
        NdtScanMatcher::set_input_source(self, source.positions());
        Ok(())
    }

    fn align(&mut self, initial_guess: &Matrix4<f64>) -> Result<(), NdtError> {
        NdtScanMatcher::align(self, matrix_to_isometry(initial_guess))
    }

    fn final_transformation(&self) -> Matrix4<f64> {
        NdtScanMatcher::final_transformation(self).to_homogeneous()
    }

    fn fitness_score(&self) -> f64 {
        NdtScanMatcher::fitness_score(self)
    }

    fn fitness_score_with(
        &self,
        source: &PointCloud<S>,
        max_range: f64,
    ) -> Result<FitnessScore, NdtError> {
        NdtScanMatcher::fitness_score_with(self, &source.positions(), max_range)
    }

    fn transformation_probability(&self) -> f64 {
        NdtScanMatcher::transformation_probability(self)
    }

    fn centroids(&self) -> Vec<Vector3<f64>> {
        NdtScanMatcher::centroids(self)
    }

    fn covariances(&self) -> Vec<Matrix3<f64>> {
        NdtScanMatcher::covariances(self)
    }

    fn has_converged(&self) -> bool {
        NdtScanMatcher::has_converged(self)
    }

    fn final_num_iterations(&self) -> usize {
        NdtScanMatcher::final_num_iterations(self)
    }
}
