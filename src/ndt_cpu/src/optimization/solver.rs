//! Newton optimisation loop for NDT scan matching.
//!
//! Per iteration:
//! 1. Newton step `delta = -H^-1 g` from the derivatives at the current pose
//! 2. More-Thuente line search along the ascent direction of `delta`, starting
//!    at `|delta|` and bounded by `step_size`
//! 3. score, gradient and Hessian at the new pose
//! 4. stop when an applied step after the first is shorter than `trans_epsilon`

use nalgebra::{Isometry3, Matrix6, Vector6};
use tracing::{debug, warn};

use super::more_thuente::{more_thuente_search, LineSearchConfig};
use super::newton::{condition_number, newton_step_regularized};
use super::types::{
    apply_pose_delta, isometry_to_pose_vector, pose_vector_to_isometry, ConvergenceStatus,
    NdtConfig, NdtResult,
};
use crate::derivatives::{compute_derivatives, GaussianParams};
use crate::scoring::compute_transform_probability;
use crate::voxel_grid::VoxelGrid;

#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub ndt: NdtConfig,

    /// Singular value tolerance of the Newton solve.
    pub svd_tolerance: f64,

    /// Fewer correspondences than this aborts with
    /// [`ConvergenceStatus::NoCorrespondences`].
    pub min_correspondences: usize,

    /// Hessians worse conditioned than this are reported.
    pub condition_warning_threshold: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            ndt: NdtConfig::default(),
            svd_tolerance: 1e-10,
            min_correspondences: 10,
            condition_warning_threshold: 1e10,
        }
    }
}

pub struct NdtOptimizer {
    config: OptimizationConfig,
    gauss: GaussianParams,
}

impl NdtOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        let gauss = GaussianParams::new(config.ndt.resolution, config.ndt.outlier_ratio);
        Self { config, gauss }
    }

    pub fn with_defaults() -> Self {
        Self::new(OptimizationConfig::default())
    }

    pub fn with_resolution(resolution: f64) -> Self {
        let mut config = OptimizationConfig::default();
        config.ndt.resolution = resolution;
        Self::new(config)
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn gauss(&self) -> &GaussianParams {
        &self.gauss
    }

    /// Line search bounds: the Newton step is the first trial, capped at
    /// `step_size` and floored at half of `trans_epsilon`.
    fn line_search_config(&self) -> LineSearchConfig {
        LineSearchConfig {
            step_max: self.config.ndt.step_size,
            step_min: self.config.ndt.trans_epsilon / 2.0,
            ..LineSearchConfig::default()
        }
    }

    /// Find the transform that best maps `source_points` onto `target_grid`,
    /// starting from `initial_guess`.
    pub fn align(
        &self,
        source_points: &[[f32; 3]],
        target_grid: &VoxelGrid,
        initial_guess: Isometry3<f64>,
    ) -> NdtResult {
        let ndt = &self.config.ndt;
        let line_search = self.line_search_config();
        let mut pose = isometry_to_pose_vector(&initial_guess);
        let mut derivatives =
            compute_derivatives(source_points, target_grid, &pose, &self.gauss, true);

        if derivatives.num_correspondences < self.config.min_correspondences {
            debug!(
                correspondences = derivatives.num_correspondences,
                required = self.config.min_correspondences,
                "Too few correspondences, keeping initial guess"
            );
            return NdtResult::no_correspondences(initial_guess, derivatives.num_correspondences);
        }

        let mut best_score = derivatives.score;
        let mut best_pose = pose;
        let mut best_hessian = derivatives.hessian;
        let mut best_correspondences = derivatives.num_correspondences;
        let mut iterations = 0;

        let status = loop {
            if iterations >= ndt.max_iterations {
                break ConvergenceStatus::MaxIterations;
            }

            let Some(delta) = newton_step_regularized(
                &derivatives.gradient,
                &derivatives.hessian,
                ndt.regularization,
                self.config.svd_tolerance,
            ) else {
                warn!(iteration = iterations, "Singular Hessian, stopping at best pose");
                break ConvergenceStatus::SingularHessian;
            };

            let cond = condition_number(&derivatives.hessian);
            if cond > self.config.condition_warning_threshold {
                warn!(iteration = iterations, condition = cond, "Ill-conditioned Hessian");
            }

            // The Newton direction points at a stationary point, which may be
            // a minimum of the score; always climb.
            let delta_norm = delta.norm();
            let mut direction = if delta_norm > 0.0 {
                delta / delta_norm
            } else {
                Vector6::zeros()
            };
            if derivatives.gradient.dot(&direction) < 0.0 {
                direction = -direction;
            }

            let search = more_thuente_search(
                |step| {
                    let trial = apply_pose_delta(&pose, &direction, step);
                    let d =
                        compute_derivatives(source_points, target_grid, &trial, &self.gauss, false);
                    (d.score, d.gradient.dot(&direction))
                },
                derivatives.score,
                derivatives.gradient.dot(&direction),
                delta_norm,
                &line_search,
            );

            pose = apply_pose_delta(&pose, &direction, search.step_length);
            derivatives =
                compute_derivatives(source_points, target_grid, &pose, &self.gauss, true);
            iterations += 1;

            if derivatives.num_correspondences < self.config.min_correspondences {
                debug!(
                    iteration = iterations,
                    correspondences = derivatives.num_correspondences,
                    "Lost correspondences, stopping at best pose"
                );
                best_correspondences = derivatives.num_correspondences;
                break ConvergenceStatus::NoCorrespondences;
            }

            if derivatives.score > best_score {
                best_score = derivatives.score;
                best_pose = pose;
                best_hessian = derivatives.hessian;
                best_correspondences = derivatives.num_correspondences;
            }

            // `direction` is a unit vector, so the step length is the norm of
            // the applied step. The first step never counts.
            if iterations > 1 && search.step_length < ndt.trans_epsilon {
                break ConvergenceStatus::Converged;
            }
        };

        if status == ConvergenceStatus::Converged {
            self.finish(
                source_points,
                pose,
                derivatives.score,
                status,
                iterations,
                derivatives.hessian,
                derivatives.num_correspondences,
            )
        } else {
            self.finish(
                source_points,
                best_pose,
                best_score,
                status,
                iterations,
                best_hessian,
                best_correspondences,
            )
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        source_points: &[[f32; 3]],
        pose: [f64; 6],
        score: f64,
        status: ConvergenceStatus,
        iterations: usize,
        hessian: Matrix6<f64>,
        num_correspondences: usize,
    ) -> NdtResult {
        let score = if score.is_finite() { score } else { 0.0 };
        let result = NdtResult {
            pose: pose_vector_to_isometry(&pose),
            status,
            score,
            transform_probability: compute_transform_probability(score, source_points.len()),
            iterations,
            hessian,
            num_correspondences,
        };

        debug!(
            status = ?result.status,
            iterations = result.iterations,
            score = result.score,
            correspondences = result.num_correspondences,
            "NDT alignment finished"
        );
        result
    }
}
