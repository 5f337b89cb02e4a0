//! 6-DOF pose and its conversion to and from homogeneous transforms.
//!
//! Angles are in radians. The rotation is `Rz(yaw) * Ry(pitch) * Rx(roll)`.

use std::fmt;

use nalgebra::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.x, self.y, self.z),
            UnitQuaternion::from_euler_angles(self.roll, self.pitch, self.yaw),
        )
    }

    pub fn from_isometry(isometry: &Isometry3<f64>) -> Self {
        let t = isometry.translation.vector;
        let (roll, pitch, yaw) = isometry.rotation.euler_angles();
        Self::new(t.x, t.y, t.z, roll, pitch, yaw)
    }
}

impl fmt::Display for Pose {
    /// `x,y,z,roll,pitch,yaw`, the layout used in log lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            self.x, self.y, self.z, self.roll, self.pitch, self.yaw
        )
    }
}

/// Homogeneous transform of `pose`.
pub fn convert_to_matrix(pose: &Pose) -> Matrix4<f64> {
    pose.to_isometry().to_homogeneous()
}

/// Pose of a homogeneous transform. The rotation block is projected onto the
/// nearest rotation first, so matrices carrying rounding noise still convert.
pub fn convert_to_pose(matrix: &Matrix4<f64>) -> Pose {
    let rotation = nearest_rotation(&matrix.fixed_view::<3, 3>(0, 0).into_owned());
    let (roll, pitch, yaw) = rotation.euler_angles();
    Pose::new(
        matrix[(0, 3)],
        matrix[(1, 3)],
        matrix[(2, 3)],
        roll,
        pitch,
        yaw,
    )
}

pub(crate) fn matrix_to_isometry(matrix: &Matrix4<f64>) -> Isometry3<f64> {
    let rotation = nearest_rotation(&matrix.fixed_view::<3, 3>(0, 0).into_owned());
    Isometry3::from_parts(
        Translation3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]),
        UnitQuaternion::from_rotation_matrix(&rotation),
    )
}

fn nearest_rotation(m: &Matrix3<f64>) -> Rotation3<f64> {
    let svd = m.svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(mut u), Some(v_t)) => {
            if (u * v_t).determinant() < 0.0 {
                u.column_mut(2).neg_mut();
            }
            Rotation3::from_matrix_unchecked(u * v_t)
        }
        _ => Rotation3::identity(),
    }
}
