//! Stateful NDT scan matcher.
//!
//! The matcher keeps the target (map) and source (scan) clouds, the four
//! alignment tunables and the outcome of the last alignment, in the style of
//! a PCL registration object:
//!
//! ```ignore
//! use ndt_cpu::NdtScanMatcher;
//! use nalgebra::Isometry3;
//!
//! let mut matcher = NdtScanMatcher::builder().resolution(1.0).build();
//! matcher.set_input_target(map_points);
//! matcher.set_input_source(scan_points);
//! matcher.align(Isometry3::identity())?;
//!
//! let pose = matcher.final_transformation();
//! let fitness = matcher.fitness_score();
//! ```
//!
//! The voxel grid and the nearest-neighbour tree are derived from the target
//! lazily, on the first query that needs them, and dropped whenever the
//! target or the resolution changes.

use std::sync::OnceLock;

use nalgebra::{Isometry3, Matrix3, Matrix6, Vector3};
use tracing::{debug, warn};

use crate::error::NdtError;
use crate::optimization::{NdtConfig, NdtOptimizer, NdtResult, OptimizationConfig};
use crate::scoring::{FitnessScore, TargetTree};
use crate::voxel_grid::{VoxelGrid, VoxelGridConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct NdtScanMatcherConfig {
    /// Voxel side length in meters.
    pub resolution: f32,

    pub max_iterations: usize,

    /// Convergence threshold on the Newton step norm.
    pub trans_epsilon: f64,

    /// Maximum length of one Newton step.
    pub step_size: f64,

    /// Outlier ratio of the score function, 0.55 in Autoware.
    pub outlier_ratio: f64,

    /// Diagonal loading of the Hessian.
    pub regularization: f64,

    /// Voxels with fewer points carry no Gaussian.
    pub min_points_per_voxel: usize,
}

impl Default for NdtScanMatcherConfig {
    fn default() -> Self {
        Self {
            resolution: 2.0,
            max_iterations: 30,
            trans_epsilon: 0.01,
            step_size: 0.1,
            outlier_ratio: 0.55,
            regularization: 0.001,
            min_points_per_voxel: 6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NdtScanMatcherBuilder {
    config: NdtScanMatcherConfig,
}

impl NdtScanMatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(mut self, resolution: f32) -> Self {
        self.config.resolution = resolution;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn transformation_epsilon(mut self, epsilon: f64) -> Self {
        self.config.trans_epsilon = epsilon;
        self
    }

    pub fn step_size(mut self, step_size: f64) -> Self {
        self.config.step_size = step_size;
        self
    }

    pub fn outlier_ratio(mut self, outlier_ratio: f64) -> Self {
        self.config.outlier_ratio = outlier_ratio;
        self
    }

    pub fn regularization(mut self, regularization: f64) -> Self {
        self.config.regularization = regularization;
        self
    }

    pub fn min_points_per_voxel(mut self, min_points: usize) -> Self {
        self.config.min_points_per_voxel = min_points;
        self
    }

    pub fn build(self) -> NdtScanMatcher {
        NdtScanMatcher::with_config(self.config)
    }
}

#[derive(Debug)]
pub struct NdtScanMatcher {
    config: NdtScanMatcherConfig,

    target: Option<Vec<[f32; 3]>>,
    source: Option<Vec<[f32; 3]>>,

    /// Derived from `target` and `config.resolution` on first use.
    grid: OnceLock<VoxelGrid>,
    /// Derived from `target` on first use.
    tree: OnceLock<TargetTree>,

    final_transformation: Isometry3<f64>,
    last_result: Option<NdtResult>,
}

impl Default for NdtScanMatcher {
    fn default() -> Self {
        Self::with_config(NdtScanMatcherConfig::default())
    }
}

impl NdtScanMatcher {
    pub fn new(resolution: f32) -> Self {
        Self::with_config(NdtScanMatcherConfig {
            resolution,
            ..Default::default()
        })
    }

    pub fn with_config(config: NdtScanMatcherConfig) -> Self {
        Self {
            config,
            target: None,
            source: None,
            grid: OnceLock::new(),
            tree: OnceLock::new(),
            final_transformation: Isometry3::identity(),
            last_result: None,
        }
    }

    pub fn builder() -> NdtScanMatcherBuilder {
        NdtScanMatcherBuilder::new()
    }

    pub fn config(&self) -> &NdtScanMatcherConfig {
        &self.config
    }

    pub fn set_transformation_epsilon(&mut self, epsilon: f64) {
        self.config.trans_epsilon = epsilon;
    }

    pub fn transformation_epsilon(&self) -> f64 {
        self.config.trans_epsilon
    }

    pub fn set_step_size(&mut self, step_size: f64) {
        self.config.step_size = step_size;
    }

    pub fn step_size(&self) -> f64 {
        self.config.step_size
    }

    /// Changing the resolution discards the voxel grid.
    pub fn set_resolution(&mut self, resolution: f32) {
        if resolution != self.config.resolution {
            self.config.resolution = resolution;
            self.grid = OnceLock::new();
        }
    }

    pub fn resolution(&self) -> f32 {
        self.config.resolution
    }

    pub fn set_maximum_iterations(&mut self, max_iterations: usize) {
        self.config.max_iterations = max_iterations;
    }

    pub fn maximum_iterations(&self) -> usize {
        self.config.max_iterations
    }

    /// Replace the map cloud. Derived structures are rebuilt on next use.
    pub fn set_input_target(&mut self, points: Vec<[f32; 3]>) {
        self.target = Some(points);
        self.grid = OnceLock::new();
        self.tree = OnceLock::new();
    }

    pub fn input_target(&self) -> Option<&[[f32; 3]]> {
        self.target.as_deref()
    }

    pub fn set_input_source(&mut self, points: Vec<[f32; 3]>) {
        self.source = Some(points);
    }

    pub fn input_source(&self) -> Option<&[[f32; 3]]> {
        self.source.as_deref()
    }

    /// Voxel grid of the current target, built on first call.
    pub fn target_grid(&self) -> Option<&VoxelGrid> {
        let target = self.target.as_ref()?;
        Some(self.grid.get_or_init(|| {
            let config = VoxelGridConfig {
                resolution: self.config.resolution,
                min_points_per_voxel: self.config.min_points_per_voxel,
                ..Default::default()
            };
            let grid = VoxelGrid::from_points_with_config(target, config);
            if grid.is_empty() {
                warn!(
                    points = target.len(),
                    resolution = self.config.resolution,
                    "Target produced no populated voxels"
                );
            }
            debug!(voxels = grid.len(), "Built target voxel grid");
            grid
        }))
    }

    /// Whether the voxel grid for the current target is already built.
    pub fn is_target_initialized(&self) -> bool {
        self.grid.get().is_some()
    }

    fn target_tree(&self) -> Option<&TargetTree> {
        let target = self.target.as_ref()?;
        Some(self.tree.get_or_init(|| TargetTree::new(target)))
    }

    fn optimizer(&self) -> NdtOptimizer {
        NdtOptimizer::new(OptimizationConfig {
            ndt: NdtConfig {
                resolution: self.config.resolution as f64,
                max_iterations: self.config.max_iterations,
                trans_epsilon: self.config.trans_epsilon,
                step_size: self.config.step_size,
                outlier_ratio: self.config.outlier_ratio,
                regularization: self.config.regularization,
            },
            ..Default::default()
        })
    }

    /// Align the source onto the target starting from `initial_guess`.
    ///
    /// Failing to converge is not an error; check [`Self::has_converged`].
    pub fn align(&mut self, initial_guess: Isometry3<f64>) -> Result<(), NdtError> {
        let resolution = self.config.resolution;
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(NdtError::InvalidResolution(resolution));
        }
        match &self.target {
            None => return Err(NdtError::NoTarget),
            Some(t) if t.is_empty() => return Err(NdtError::EmptyTarget),
            Some(_) => {}
        }
        let source = match &self.source {
            None => return Err(NdtError::NoSource),
            Some(s) if s.is_empty() => return Err(NdtError::EmptySource),
            Some(s) => s,
        };
        let grid = self.target_grid().ok_or(NdtError::NoTarget)?;

        let result = self.optimizer().align(source, grid, initial_guess);
        debug!(
            status = ?result.status,
            iterations = result.iterations,
            transform_probability = result.transform_probability,
            "Aligned {} source points against {} voxels",
            source.len(),
            grid.len()
        );

        self.final_transformation = result.pose;
        self.last_result = Some(result);
        Ok(())
    }

    /// Result of the last [`Self::align`], identity before the first one.
    pub fn final_transformation(&self) -> Isometry3<f64> {
        self.final_transformation
    }

    pub fn last_result(&self) -> Option<&NdtResult> {
        self.last_result.as_ref()
    }

    pub fn has_converged(&self) -> bool {
        self.last_result
            .as_ref()
            .is_some_and(|r| r.status.is_converged())
    }

    pub fn final_num_iterations(&self) -> usize {
        self.last_result.as_ref().map_or(0, |r| r.iterations)
    }

    pub fn score(&self) -> f64 {
        self.last_result.as_ref().map_or(0.0, |r| r.score)
    }

    pub fn transformation_probability(&self) -> f64 {
        self.last_result
            .as_ref()
            .map_or(0.0, |r| r.transform_probability)
    }

    pub fn hessian(&self) -> Matrix6<f64> {
        self.last_result
            .as_ref()
            .map_or_else(Matrix6::zeros, |r| r.hessian)
    }

    /// Fitness of the stored source under the final transformation, with no
    /// range limit. `f64::MAX` when there is nothing to compare.
    pub fn fitness_score(&self) -> f64 {
        match (&self.source, self.target_tree()) {
            (Some(source), Some(tree)) => {
                tree.fitness(source, &self.final_transformation, f64::MAX)
                    .score
            }
            _ => f64::MAX,
        }
    }

    /// Fitness of an arbitrary cloud under the final transformation, counting
    /// only points whose squared nearest-neighbour distance is within
    /// `max_range`.
    pub fn fitness_score_with(
        &self,
        source: &[[f32; 3]],
        max_range: f64,
    ) -> Result<FitnessScore, NdtError> {
        let tree = self.target_tree().ok_or(NdtError::NoTarget)?;
        Ok(tree.fitness(source, &self.final_transformation, max_range))
    }

    /// Voxel means in coordinate order; empty without a target.
    pub fn centroids(&self) -> Vec<Vector3<f64>> {
        self.target_grid()
            .map(VoxelGrid::centroids)
            .unwrap_or_default()
    }

    /// Voxel covariances, in the same order as [`Self::centroids`].
    pub fn covariances(&self) -> Vec<Matrix3<f64>> {
        self.target_grid()
            .map(VoxelGrid::covariances)
            .unwrap_or_default()
    }
}
