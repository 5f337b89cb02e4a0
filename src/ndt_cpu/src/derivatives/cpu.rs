//! Score, gradient and Hessian of the NDT objective (Magnusson 2009, eq. 6.9-6.13).

use nalgebra::{Matrix3, Matrix6, Point3, Vector3};

use super::angular::AngularDerivatives;
use super::types::{Derivatives, GaussianParams, PointHessian, PointJacobian};
use crate::optimization::types::pose_vector_to_isometry;
use crate::voxel_grid::VoxelGrid;

/// Contribution of one transformed point against one voxel Gaussian.
///
/// `x_trans` is the transformed point minus the voxel mean. The Hessian is
/// left at zero unless `compute_hessian` is set.
pub fn compute_derivative_single(
    x_trans: &Vector3<f64>,
    inv_covariance: &Matrix3<f64>,
    point_jacobian: &PointJacobian,
    point_hessian: &PointHessian,
    gauss: &GaussianParams,
    compute_hessian: bool,
) -> Derivatives {
    let c_inv_x = inv_covariance * x_trans;
    let mahalanobis = x_trans.dot(&c_inv_x);

    let exp_term = (-gauss.d2 * mahalanobis * 0.5).exp();
    let mut e_x_cov_x = gauss.d2 * exp_term;

    // Underflow or a broken covariance; the pair contributes nothing.
    if !(0.0..=1.0).contains(&e_x_cov_x) || !e_x_cov_x.is_finite() {
        return Derivatives {
            num_correspondences: 1,
            ..Derivatives::zeros()
        };
    }
    e_x_cov_x *= gauss.d1;

    // (x - mu)^T C^-1 dT/dp
    let x_c_inv_j = (c_inv_x.transpose() * point_jacobian).transpose();
    let gradient = x_c_inv_j * e_x_cov_x;

    let mut hessian = Matrix6::zeros();
    if compute_hessian {
        let j_c_inv_j = point_jacobian.transpose() * inv_covariance * point_jacobian;
        for i in 0..6 {
            let block = point_hessian.fixed_view::<3, 6>(3 * i, 0);
            let x_c_inv_h = c_inv_x.transpose() * block;
            for j in 0..6 {
                hessian[(i, j)] = e_x_cov_x
                    * (-gauss.d2 * x_c_inv_j[i] * x_c_inv_j[j]
                        + x_c_inv_h[(0, j)]
                        + j_c_inv_j[(j, i)]);
            }
        }
    }

    Derivatives {
        score: -gauss.d1 * exp_term,
        gradient,
        hessian,
        num_correspondences: 1,
    }
}

/// Apply a pose vector `[tx, ty, tz, roll, pitch, yaw]` to a point.
pub fn transform_point(point: &[f64; 3], pose: &[f64; 6]) -> [f64; 3] {
    let p = pose_vector_to_isometry(pose) * Point3::new(point[0], point[1], point[2]);
    [p.x, p.y, p.z]
}

/// Accumulate the objective over the whole source cloud at `pose`.
///
/// Each transformed point is scored against every voxel whose centroid lies
/// within one grid resolution. Points are visited in input order so repeated
/// calls give bit-identical sums.
pub fn compute_derivatives(
    source_points: &[[f32; 3]],
    target_grid: &VoxelGrid,
    pose: &[f64; 6],
    gauss: &GaussianParams,
    compute_hessian: bool,
) -> Derivatives {
    let mut total = Derivatives::zeros();

    let transform = pose_vector_to_isometry(pose);
    let angular = AngularDerivatives::new(pose[3], pose[4], pose[5], compute_hessian);
    let radius = target_grid.resolution() as f64;

    for source_point in source_points {
        let x = Vector3::new(
            source_point[0] as f64,
            source_point[1] as f64,
            source_point[2] as f64,
        );
        let transformed = transform * Point3::from(x);
        if !transformed.coords.iter().all(|v| v.is_finite()) {
            continue;
        }

        let nearby = target_grid.radius_search(&[transformed.x, transformed.y, transformed.z], radius);
        if nearby.is_empty() {
            continue;
        }

        let point_jacobian = angular.point_jacobian(&x);
        let point_hessian = if compute_hessian {
            angular.point_hessian(&x)
        } else {
            PointHessian::zeros()
        };

        for voxel in nearby {
            let x_trans = transformed.coords - voxel.mean;
            let pair = compute_derivative_single(
                &x_trans,
                &voxel.inv_covariance,
                &point_jacobian,
                &point_hessian,
                gauss,
                compute_hessian,
            );
            total.add(&pair);
        }
    }

    total
}
