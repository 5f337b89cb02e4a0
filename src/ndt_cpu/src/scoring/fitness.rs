//! Point-to-point fitness: mean squared distance from each transformed source
//! point to its nearest target point.
//!
//! Unlike the NDT score this looks at raw target points, not voxel Gaussians,
//! so it is meaningful even where the grid has no populated voxels.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use nalgebra::{Isometry3, Point3};
use rayon::prelude::*;

const BUCKET_SIZE: usize = 256;

/// Mean squared nearest-neighbour distance and the number of points that
/// contributed to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessScore {
    pub score: f64,
    pub inliers: usize,
}

impl FitnessScore {
    /// Reported when no source point has a neighbour in range.
    pub const NO_INLIERS: Self = Self {
        score: f64::MAX,
        inliers: 0,
    };
}

/// Nearest-neighbour index over the target cloud.
#[derive(Debug)]
pub struct TargetTree {
    kdtree: Option<ImmutableKdTree<f64, u64, 3, BUCKET_SIZE>>,
    len: usize,
}

impl TargetTree {
    pub fn new(points: &[[f32; 3]]) -> Self {
        let positions: Vec<[f64; 3]> = points
            .iter()
            .filter(|p| p.iter().all(|c| c.is_finite()))
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect();

        let kdtree = if positions.is_empty() {
            None
        } else {
            let tree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE> = (&*positions).into();
            Some(tree)
        };
        Self {
            kdtree,
            len: positions.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Squared distance to the closest target point. `None` for an empty tree
    /// or a query with a non-finite coordinate.
    pub fn nearest_squared(&self, point: &[f64; 3]) -> Option<f64> {
        if !point.iter().all(|c| c.is_finite()) {
            return None;
        }
        self.kdtree
            .as_ref()
            .map(|tree| tree.nearest_one::<SquaredEuclidean>(point).distance)
    }

    /// Fitness of `source` moved by `transform`.
    ///
    /// Only pairs whose squared distance is at most `max_range` count, the
    /// same cut-off PCL applies. Distances are computed in parallel and summed
    /// in input order.
    pub fn fitness(
        &self,
        source: &[[f32; 3]],
        transform: &Isometry3<f64>,
        max_range: f64,
    ) -> FitnessScore {
        if self.kdtree.is_none() {
            return FitnessScore::NO_INLIERS;
        }

        let distances: Vec<Option<f64>> = source
            .par_iter()
            .map(|p| {
                let moved = transform * Point3::new(p[0] as f64, p[1] as f64, p[2] as f64);
                self.nearest_squared(&[moved.x, moved.y, moved.z])
                    .filter(|d| *d <= max_range)
            })
            .collect();

        let (sum, inliers) = distances
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(sum, n), d| (sum + d, n + 1));

        if inliers == 0 {
            FitnessScore::NO_INLIERS
        } else {
            FitnessScore {
                score: sum / inliers as f64,
                inliers,
            }
        }
    }
}
