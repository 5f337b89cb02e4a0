//! KD-tree radius search over voxel centroids.
//!
//! A source point is scored against every voxel whose centroid lies within one
//! resolution of it, not only the voxel that geometrically contains it. This
//! keeps the score smooth when points cross voxel borders.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use super::Voxel;

/// Leaf size shared with the fitness tree.
const BUCKET_SIZE: usize = 256;

#[derive(Debug)]
pub struct VoxelSearch {
    kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE>,
}

impl VoxelSearch {
    /// Index the centroids of `voxels`; item ids are positions in the slice.
    pub fn from_voxels(voxels: &[Voxel]) -> Option<Self> {
        if voxels.is_empty() {
            return None;
        }

        let centroids: Vec<[f64; 3]> = voxels
            .iter()
            .map(|v| [v.mean.x, v.mean.y, v.mean.z])
            .collect();
        let kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE> = (&*centroids).into();

        Some(Self { kdtree })
    }

    /// Indices of voxels whose centroid is within `radius`, nearest first.
    ///
    /// A point with a non-finite coordinate has no neighbours.
    pub fn within(&self, point: &[f64; 3], radius: f64) -> Vec<usize> {
        if !point.iter().all(|v| v.is_finite()) || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }

        self.kdtree
            .within::<SquaredEuclidean>(point, radius * radius)
            .iter()
            .map(|nn| nn.item as usize)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.kdtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.kdtree.size() == 0
    }
}
