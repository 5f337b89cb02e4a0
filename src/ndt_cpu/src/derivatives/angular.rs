//! Derivatives of the rotation with respect to the Euler angles.
//!
//! The pose vector `[tx, ty, tz, roll, pitch, yaw]` maps a point as
//! `T(x) = Rx(roll) * Ry(pitch) * Rz(yaw) * x + t`. The terms below are
//! equations 6.19 (first order) and 6.21 (second order) of Magnusson 2009,
//! evaluated once per pose and then contracted with each source point.

use nalgebra::{SMatrix, Vector3};

use super::types::{PointHessian, PointJacobian};

/// Angles closer to zero than this are treated as exactly zero.
const ANGLE_EPSILON: f64 = 1e-5;

fn sin_cos(angle: f64) -> (f64, f64) {
    if angle.abs() < ANGLE_EPSILON {
        (0.0, 1.0)
    } else {
        angle.sin_cos()
    }
}

#[derive(Debug, Clone)]
pub struct AngularDerivatives {
    /// Rows: dy/droll, dz/droll, dx/dpitch, dy/dpitch, dz/dpitch, dx/dyaw, dy/dyaw, dz/dyaw.
    pub j_ang: SMatrix<f64, 8, 3>,
    /// Rows: a2 a3 (roll,roll), b2 b3 (roll,pitch), c2 c3 (roll,yaw),
    /// d1 d2 d3 (pitch,pitch), e1 e2 e3 (pitch,yaw), f1 f2 f3 (yaw,yaw).
    pub h_ang: SMatrix<f64, 15, 3>,
}

impl AngularDerivatives {
    /// Precompute the angular terms. The second-order block stays zero unless
    /// `compute_hessian` is set.
    pub fn new(roll: f64, pitch: f64, yaw: f64, compute_hessian: bool) -> Self {
        let (sx, cx) = sin_cos(roll);
        let (sy, cy) = sin_cos(pitch);
        let (sz, cz) = sin_cos(yaw);

        #[rustfmt::skip]
        let j_ang = SMatrix::<f64, 8, 3>::from_row_slice(&[
            -sx * sz + cx * sy * cz, -sx * cz - cx * sy * sz, -cx * cy,
             cx * sz + sx * sy * cz,  cx * cz - sx * sy * sz, -sx * cy,
            -sy * cz,                 sy * sz,                 cy,
             sx * cy * cz,           -sx * cy * sz,            sx * sy,
            -cx * cy * cz,            cx * cy * sz,           -cx * sy,
            -cy * sz,                -cy * cz,                 0.0,
             cx * cz - sx * sy * sz, -cx * sz - sx * sy * cz,  0.0,
             sx * cz + cx * sy * sz,  cx * sy * cz - sx * sz,  0.0,
        ]);

        #[rustfmt::skip]
        let h_ang = if compute_hessian {
            SMatrix::<f64, 15, 3>::from_row_slice(&[
                -cx * sz - sx * sy * cz, -cx * cz + sx * sy * sz,  sx * cy,
                -sx * sz + cx * sy * cz, -cx * sy * sz - sx * cz, -cx * cy,
                 cx * cy * cz,           -cx * cy * sz,            cx * sy,
                 sx * cy * cz,           -sx * cy * sz,            sx * sy,
                -sx * cz - cx * sy * sz,  sx * sz - cx * sy * cz,  0.0,
                 cx * cz - sx * sy * sz, -sx * sy * cz - cx * sz,  0.0,
                -cy * cz,                 cy * sz,                -sy,
                -sx * sy * cz,            sx * sy * sz,            sx * cy,
                 cx * sy * cz,           -cx * sy * sz,           -cx * cy,
                 sy * sz,                 sy * cz,                 0.0,
                -sx * cy * sz,           -sx * cy * cz,            0.0,
                 cx * cy * sz,            cx * cy * cz,            0.0,
                -cy * cz,                 cy * sz,                 0.0,
                -cx * sz - sx * sy * cz, -cx * cz + sx * sy * sz,  0.0,
                -sx * sz + cx * sy * cz, -cx * sy * sz - sx * cz,  0.0,
            ])
        } else {
            SMatrix::zeros()
        };

        Self { j_ang, h_ang }
    }

    /// Jacobian of the transformed point with respect to the pose, for the
    /// untransformed source point `x`.
    pub fn point_jacobian(&self, x: &Vector3<f64>) -> PointJacobian {
        let t = self.j_ang * x;

        let mut jacobian = PointJacobian::zeros();
        jacobian.fixed_view_mut::<3, 3>(0, 0).fill_with_identity();
        jacobian[(1, 3)] = t[0];
        jacobian[(2, 3)] = t[1];
        jacobian[(0, 4)] = t[2];
        jacobian[(1, 4)] = t[3];
        jacobian[(2, 4)] = t[4];
        jacobian[(0, 5)] = t[5];
        jacobian[(1, 5)] = t[6];
        jacobian[(2, 5)] = t[7];
        jacobian
    }

    /// Second derivatives of the transformed point. Block `i` (rows `3i..3i+3`)
    /// holds d²T/dp_i dp_j in column `j`; only the rotation blocks are non-zero.
    pub fn point_hessian(&self, x: &Vector3<f64>) -> PointHessian {
        let h = self.h_ang * x;
        let a = Vector3::new(0.0, h[0], h[1]);
        let b = Vector3::new(0.0, h[2], h[3]);
        let c = Vector3::new(0.0, h[4], h[5]);
        let d = Vector3::new(h[6], h[7], h[8]);
        let e = Vector3::new(h[9], h[10], h[11]);
        let f = Vector3::new(h[12], h[13], h[14]);

        let mut hessian = PointHessian::zeros();
        for (row, col, block) in [
            (9, 3, a),
            (12, 3, b),
            (15, 3, c),
            (9, 4, b),
            (12, 4, d),
            (15, 4, e),
            (9, 5, c),
            (12, 5, e),
            (15, 5, f),
        ] {
            hessian.fixed_view_mut::<3, 1>(row, col).copy_from(&block);
        }
        hessian
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::types::pose_vector_to_isometry;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn transform(pose: &[f64; 6], x: &Vector3<f64>) -> Vector3<f64> {
        (pose_vector_to_isometry(pose) * Point3::from(*x)).coords
    }

    #[test]
    fn test_identity_pose_jacobian() {
        let angular = AngularDerivatives::new(0.0, 0.0, 0.0, false);
        let jacobian = angular.point_jacobian(&Vector3::new(1.0, 2.0, 3.0));

        assert_eq!(jacobian[(0, 0)], 1.0);
        assert_eq!(jacobian[(1, 1)], 1.0);
        assert_eq!(jacobian[(2, 2)], 1.0);
        assert_eq!(jacobian[(0, 1)], 0.0);
        // d/droll of y at identity is -z
        assert_relative_eq!(jacobian[(1, 3)], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tiny_angles_snap_to_zero() {
        let tiny = AngularDerivatives::new(1e-10, 1e-10, 1e-10, true);
        let zero = AngularDerivatives::new(0.0, 0.0, 0.0, true);

        assert_eq!(tiny.j_ang, zero.j_ang);
        assert_eq!(tiny.h_ang, zero.h_ang);
    }

    #[test]
    fn test_hessian_skipped_when_disabled() {
        let angular = AngularDerivatives::new(0.1, 0.2, 0.3, false);
        assert_eq!(angular.h_ang, SMatrix::<f64, 15, 3>::zeros());
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let pose = [0.5, -0.2, 0.1, 0.1, 0.2, 0.3];
        let x = Vector3::new(1.0, -2.0, 0.5);
        let jacobian = AngularDerivatives::new(pose[3], pose[4], pose[5], false).point_jacobian(&x);
        let eps = 1e-6;

        for j in 0..6 {
            let mut plus = pose;
            let mut minus = pose;
            plus[j] += eps;
            minus[j] -= eps;
            let numeric = (transform(&plus, &x) - transform(&minus, &x)) / (2.0 * eps);
            for i in 0..3 {
                assert_relative_eq!(jacobian[(i, j)], numeric[i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_hessian_matches_finite_differences() {
        let pose = [0.0, 0.0, 0.0, 0.15, -0.25, 0.4];
        let x = Vector3::new(2.0, 1.0, -1.0);
        let eps = 1e-5;
        let hessian = AngularDerivatives::new(pose[3], pose[4], pose[5], true).point_hessian(&x);

        for i in 3..6 {
            let mut plus = pose;
            let mut minus = pose;
            plus[i] += eps;
            minus[i] -= eps;
            let j_plus = AngularDerivatives::new(plus[3], plus[4], plus[5], false).point_jacobian(&x);
            let j_minus =
                AngularDerivatives::new(minus[3], minus[4], minus[5], false).point_jacobian(&x);
            let numeric = (j_plus - j_minus) / (2.0 * eps);

            for j in 3..6 {
                for k in 0..3 {
                    assert_relative_eq!(hessian[(3 * i + k, j)], numeric[(k, j)], epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_pure_pitch_second_derivative() {
        let pitch = 0.3f64;
        let x = Vector3::new(0.0, 0.0, 1.0);
        let hessian = AngularDerivatives::new(0.0, pitch, 0.0, true).point_hessian(&x);

        // R * (0, 0, 1) = (sin p, 0, cos p)
        assert_relative_eq!(hessian[(12, 4)], -pitch.sin(), epsilon = 1e-12);
        assert_relative_eq!(hessian[(13, 4)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(hessian[(14, 4)], -pitch.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_hessian_matches_second_differences_of_transform() {
        let pose = [0.0, 0.0, 0.0, -0.3, 0.35, 0.2];
        let x = Vector3::new(-0.5, 1.5, 2.0);
        let eps = 1e-4;
        let hessian = AngularDerivatives::new(pose[3], pose[4], pose[5], true).point_hessian(&x);

        let at = |di: usize, dj: usize, si: f64, sj: f64| {
            let mut p = pose;
            p[di] += si * eps;
            p[dj] += sj * eps;
            transform(&p, &x)
        };

        for i in 3..6 {
            for j in 3..6 {
                let numeric = (at(i, j, 1.0, 1.0) - at(i, j, 1.0, -1.0) - at(i, j, -1.0, 1.0)
                    + at(i, j, -1.0, -1.0))
                    / (4.0 * eps * eps);
                for k in 0..3 {
                    assert_relative_eq!(hessian[(3 * i + k, j)], numeric[k], epsilon = 1e-5);
                }
            }
        }
    }
}
