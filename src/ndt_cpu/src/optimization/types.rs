//! Types for the NDT Newton optimizer and the pose-vector parameterisation.

use nalgebra::{Isometry3, Matrix3, Matrix6, Rotation3, Translation3, UnitQuaternion, Vector6};

/// Tunables of an NDT alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct NdtConfig {
    /// Voxel side length in meters.
    pub resolution: f64,

    pub max_iterations: usize,

    /// Iteration stops once the Newton step norm drops below this.
    pub trans_epsilon: f64,

    /// Upper bound on the length of a single step, not a damping factor.
    pub step_size: f64,

    /// Probability that a point is an outlier.
    pub outlier_ratio: f64,

    /// Diagonal loading added to the Hessian before solving.
    pub regularization: f64,
}

impl Default for NdtConfig {
    fn default() -> Self {
        Self {
            resolution: 2.0,
            max_iterations: 30,
            trans_epsilon: 0.01,
            step_size: 0.1,
            outlier_ratio: 0.55,
            regularization: 1e-6,
        }
    }
}

impl NdtConfig {
    pub fn with_resolution(resolution: f64) -> Self {
        Self {
            resolution,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// An applied step after the first fell below `trans_epsilon`.
    Converged,

    MaxIterations,

    /// Too few source points landed near a voxel. At the initial pose the
    /// result keeps the guess; later it carries the best pose reached.
    NoCorrespondences,

    /// The Newton system could not be solved.
    SingularHessian,
}

impl ConvergenceStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceStatus::Converged)
    }

    /// Converged, or ran out of iterations with a pose worth keeping.
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::Converged | ConvergenceStatus::MaxIterations
        )
    }
}

/// Outcome of one alignment.
#[derive(Debug, Clone)]
pub struct NdtResult {
    /// Source-to-target transform.
    pub pose: Isometry3<f64>,

    pub status: ConvergenceStatus,

    /// NDT score at `pose` (higher is better).
    pub score: f64,

    /// `score` divided by the number of source points.
    pub transform_probability: f64,

    pub iterations: usize,

    /// Hessian at `pose`.
    pub hessian: Matrix6<f64>,

    pub num_correspondences: usize,
}

impl NdtResult {
    /// Result carrying the initial guess unchanged.
    pub fn no_correspondences(initial_pose: Isometry3<f64>, num_correspondences: usize) -> Self {
        Self {
            pose: initial_pose,
            status: ConvergenceStatus::NoCorrespondences,
            score: 0.0,
            transform_probability: 0.0,
            iterations: 0,
            hessian: Matrix6::zeros(),
            num_correspondences,
        }
    }
}

/// `[tx, ty, tz, roll, pitch, yaw]` to a transform with
/// `R = Rx(roll) * Ry(pitch) * Rz(yaw)`, the order the angular derivatives use.
pub fn pose_vector_to_isometry(pose: &[f64; 6]) -> Isometry3<f64> {
    let rotation = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::x_axis(), pose[3])
        * UnitQuaternion::from_axis_angle(&nalgebra::Vector3::y_axis(), pose[4])
        * UnitQuaternion::from_axis_angle(&nalgebra::Vector3::z_axis(), pose[5]);
    Isometry3::from_parts(Translation3::new(pose[0], pose[1], pose[2]), rotation)
}

/// Inverse of [`pose_vector_to_isometry`] for `|pitch| < pi/2`.
pub fn isometry_to_pose_vector(isometry: &Isometry3<f64>) -> [f64; 6] {
    let t = isometry.translation.vector;
    let r: Matrix3<f64> = *isometry.rotation.to_rotation_matrix().matrix();

    let pitch = r[(0, 2)].clamp(-1.0, 1.0).asin();
    let yaw = (-r[(0, 1)]).atan2(r[(0, 0)]);
    let roll = (-r[(1, 2)]).atan2(r[(2, 2)]);

    [t.x, t.y, t.z, roll, pitch, yaw]
}

/// Rotation part of a pose vector as a matrix.
pub fn pose_vector_rotation(pose: &[f64; 6]) -> Rotation3<f64> {
    pose_vector_to_isometry(pose).rotation.to_rotation_matrix()
}

/// Add `delta * step_length` to the pose vector component-wise.
pub fn apply_pose_delta(pose: &[f64; 6], delta: &Vector6<f64>, step_length: f64) -> [f64; 6] {
    let mut updated = *pose;
    for (value, d) in updated.iter_mut().zip(delta.iter()) {
        *value += d * step_length;
    }
    updated
}
