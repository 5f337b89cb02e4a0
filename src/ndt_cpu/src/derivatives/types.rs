//! Types shared by the derivative computations (Magnusson 2009, chapter 6).

use nalgebra::{Matrix6, SMatrix, Vector6};

/// d(T(x))/dp for one point: 3 output coordinates by 6 pose parameters.
pub type PointJacobian = SMatrix<f64, 3, 6>;

/// d²(T(x))/dp² for one point, six stacked 3x6 blocks (one per first parameter).
pub type PointHessian = SMatrix<f64, 18, 6>;

/// Constants of the mixed Gaussian/uniform score function (eq. 6.9).
///
/// `p(x) = -d1 * exp(-d2 / 2 * (x - mu)^T Sigma^-1 (x - mu))`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    pub d1: f64,
    pub d2: f64,
    pub outlier_ratio: f64,
}

impl GaussianParams {
    /// Fit the score constants for a voxel side length and outlier ratio.
    pub fn new(resolution: f64, outlier_ratio: f64) -> Self {
        let c1 = 10.0 * (1.0 - outlier_ratio);
        let c2 = outlier_ratio / resolution.powi(3);
        let d3 = -c2.ln();
        let d1 = -(c1 + c2).ln() - d3;
        let d2 = -2.0 * ((-(c1 * (-0.5_f64).exp() + c2).ln() - d3) / d1).ln();

        Self {
            d1,
            d2,
            outlier_ratio,
        }
    }
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self::new(2.0, 0.55)
    }
}

/// Score, gradient and Hessian of the NDT objective.
///
/// Used both for a single point-voxel pair and for a whole cloud; in the
/// latter case `num_correspondences` counts the contributing pairs.
#[derive(Debug, Clone)]
pub struct Derivatives {
    pub score: f64,
    pub gradient: Vector6<f64>,
    pub hessian: Matrix6<f64>,
    pub num_correspondences: usize,
}

impl Derivatives {
    pub fn zeros() -> Self {
        Self {
            score: 0.0,
            gradient: Vector6::zeros(),
            hessian: Matrix6::zeros(),
            num_correspondences: 0,
        }
    }

    /// Add one point-voxel contribution.
    pub fn add(&mut self, other: &Derivatives) {
        self.score += other.score;
        self.gradient += other.gradient;
        self.hessian += other.hessian;
        self.num_correspondences += 1;
    }
}
