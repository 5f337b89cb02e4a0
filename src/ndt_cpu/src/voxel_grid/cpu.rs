//! Voxel statistics accumulation.

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use super::types::{Voxel, VoxelCoord, VoxelGridConfig};

#[derive(Debug, Clone, Default)]
struct VoxelAccumulator {
    sum: Vector3<f64>,
    sum_sq: Matrix3<f64>,
    count: usize,
}

impl VoxelAccumulator {
    fn add_point(&mut self, point: &[f32; 3]) {
        let v = Vector3::new(point[0] as f64, point[1] as f64, point[2] as f64);
        self.sum += v;
        self.sum_sq += v * v.transpose();
        self.count += 1;
    }
}

/// Bin `points` into voxels and fit a Gaussian to every populated voxel.
///
/// Non-finite points are skipped. The result is sorted by voxel coordinate so
/// that grids built from the same cloud are identical.
pub fn build_voxels(points: &[[f32; 3]], config: &VoxelGridConfig) -> Vec<(VoxelCoord, Voxel)> {
    let mut accumulators: HashMap<VoxelCoord, VoxelAccumulator> = HashMap::new();

    for point in points.iter().filter(|p| p.iter().all(|c| c.is_finite())) {
        let coord = VoxelCoord::from_point(point, config.resolution);
        accumulators.entry(coord).or_default().add_point(point);
    }

    let mut voxels: Vec<_> = accumulators
        .into_par_iter()
        .filter_map(|(coord, acc)| {
            Voxel::from_statistics(&acc.sum, &acc.sum_sq, acc.count, config)
                .map(|voxel| (coord, voxel))
        })
        .collect();

    voxels.par_sort_unstable_by_key(|(coord, _)| *coord);
    voxels
}

/// Inclusive voxel bounding box as `(min, max)`, or `None` for no coordinates.
pub fn compute_voxel_bounds(coords: &[VoxelCoord]) -> Option<(VoxelCoord, VoxelCoord)> {
    let first = *coords.first()?;
    Some(coords.iter().fold((first, first), |(min, max), c| {
        (
            VoxelCoord::new(min.x.min(c.x), min.y.min(c.y), min.z.min(c.z)),
            VoxelCoord::new(max.x.max(c.x), max.y.max(c.y), max.z.max(c.z)),
        )
    }))
}
