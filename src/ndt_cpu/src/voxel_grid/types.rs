//! Voxel grid building blocks.

use nalgebra::{Matrix3, Vector3};

/// Parameters for building a voxel grid.
#[derive(Debug, Clone)]
pub struct VoxelGridConfig {
    /// Voxel side length in meters.
    pub resolution: f32,
    /// Voxels holding fewer points than this carry no Gaussian and are dropped.
    pub min_points_per_voxel: usize,
    /// Covariance eigenvalues are clamped to at least this fraction of the largest one.
    pub eigenvalue_ratio_threshold: f64,
}

impl Default for VoxelGridConfig {
    fn default() -> Self {
        Self {
            resolution: 2.0,
            min_points_per_voxel: 6,
            eigenvalue_ratio_threshold: 0.01,
        }
    }
}

/// Gaussian summary of the target points falling into one voxel.
#[derive(Debug, Clone)]
pub struct Voxel {
    /// Centroid of the contained points.
    pub mean: Vector3<f64>,
    /// Regularized sample covariance.
    pub covariance: Matrix3<f64>,
    /// Inverse of `covariance`.
    pub inv_covariance: Matrix3<f64>,
    /// Number of points that contributed.
    pub point_count: usize,
}

impl Voxel {
    /// Turn accumulated first and second moments into a voxel.
    ///
    /// `sum` is the sum of the points, `sum_sq` the sum of their outer products.
    /// Returns `None` when there are too few points or the covariance is degenerate.
    pub fn from_statistics(
        sum: &Vector3<f64>,
        sum_sq: &Matrix3<f64>,
        count: usize,
        config: &VoxelGridConfig,
    ) -> Option<Self> {
        if count < config.min_points_per_voxel || count < 2 {
            return None;
        }

        let n = count as f64;
        let mean = sum / n;
        let covariance = (sum_sq - mean * mean.transpose() * n) / (n - 1.0);

        let (covariance, inv_covariance) =
            regularize_covariance(&covariance, config.eigenvalue_ratio_threshold)?;

        Some(Self {
            mean,
            covariance,
            inv_covariance,
            point_count: count,
        })
    }
}

/// Inflate small eigenvalues so the covariance can be inverted safely.
///
/// Returns `(covariance, inverse)`, or `None` if every eigenvalue is non-positive.
pub(crate) fn regularize_covariance(
    cov: &Matrix3<f64>,
    ratio_threshold: f64,
) -> Option<(Matrix3<f64>, Matrix3<f64>)> {
    let eigen = cov.symmetric_eigen();
    let max_eigenvalue = eigen.eigenvalues.iter().copied().fold(0.0_f64, f64::max);
    if max_eigenvalue <= 0.0 {
        return None;
    }

    let floor = max_eigenvalue * ratio_threshold;
    let clamped = eigen.eigenvalues.map(|ev| ev.max(floor));
    let inverted = clamped.map(|ev| 1.0 / ev);

    let v = &eigen.eigenvectors;
    let regularized = v * Matrix3::from_diagonal(&clamped) * v.transpose();
    let inverse = v * Matrix3::from_diagonal(&inverted) * v.transpose();

    Some((regularized, inverse))
}

/// Integer voxel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Voxel containing `point` for the given side length.
    pub fn from_point(point: &[f32; 3], resolution: f32) -> Self {
        Self {
            x: (point[0] / resolution).floor() as i32,
            y: (point[1] / resolution).floor() as i32,
            z: (point[2] / resolution).floor() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn moments(points: &[[f64; 3]]) -> (Vector3<f64>, Matrix3<f64>) {
        points.iter().fold(
            (Vector3::zeros(), Matrix3::zeros()),
            |(sum, sum_sq), p| {
                let v = Vector3::new(p[0], p[1], p[2]);
                (sum + v, sum_sq + v * v.transpose())
            },
        )
    }

    #[test]
    fn test_voxel_coord_floors_negative_values() {
        assert_eq!(
            VoxelCoord::from_point(&[0.0, 0.0, 0.0], 2.0),
            VoxelCoord::new(0, 0, 0)
        );
        assert_eq!(
            VoxelCoord::from_point(&[3.5, 5.1, 1.9], 2.0),
            VoxelCoord::new(1, 2, 0)
        );
        assert_eq!(
            VoxelCoord::from_point(&[-3.5, -1.1, -0.1], 2.0),
            VoxelCoord::new(-2, -1, -1)
        );
    }

    #[test]
    fn test_voxel_from_statistics() {
        let points = [
            [1.0, 2.0, 3.0],
            [1.1, 2.0, 3.1],
            [0.9, 1.9, 2.9],
            [1.05, 2.1, 3.0],
            [0.95, 1.95, 2.95],
            [1.0, 2.05, 3.05],
            [1.02, 1.98, 2.97],
            [0.98, 2.02, 3.03],
        ];
        let (sum, sum_sq) = moments(&points);

        let voxel = Voxel::from_statistics(&sum, &sum_sq, points.len(), &Default::default())
            .expect("enough points for a voxel");

        assert_relative_eq!(voxel.mean.x, 1.0, epsilon = 0.05);
        assert_relative_eq!(voxel.mean.y, 2.0, epsilon = 0.05);
        assert_relative_eq!(voxel.mean.z, 3.0, epsilon = 0.05);
        assert_relative_eq!(
            voxel.covariance * voxel.inv_covariance,
            Matrix3::identity(),
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_voxel_too_few_points() {
        let sum = Vector3::new(1.0, 2.0, 3.0);
        let sum_sq = Matrix3::identity();
        assert!(Voxel::from_statistics(&sum, &sum_sq, 3, &Default::default()).is_none());
    }

    #[test]
    fn test_regularize_planar_covariance() {
        let cov = Matrix3::new(
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1e-6,
        );

        let (reg, inv) = regularize_covariance(&cov, 0.01).unwrap();

        let eigen = reg.symmetric_eigen();
        let min_ev = eigen.eigenvalues.min();
        assert_relative_eq!(min_ev, 0.01, epsilon = 1e-9);
        assert_relative_eq!(reg * inv, Matrix3::identity(), epsilon = 1e-8);
    }

    #[test]
    fn test_regularize_zero_covariance() {
        assert!(regularize_covariance(&Matrix3::zeros(), 0.01).is_none());
    }
}
