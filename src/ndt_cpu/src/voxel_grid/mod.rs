//! Voxel grid of Gaussian distributions built from the target (map) cloud.
//!
//! Construction runs in two passes:
//! 1. bin every point into its voxel and accumulate first/second moments
//! 2. fit and regularize a Gaussian per voxel (parallel via rayon)
//!
//! Voxels are stored in coordinate order so that centroid and covariance
//! listings are reproducible, and a KD-tree over the centroids answers the
//! radius queries used while scoring.

pub mod cpu;
pub mod search;
pub mod types;

pub use search::VoxelSearch;
pub use types::{Voxel, VoxelCoord, VoxelGridConfig};

use std::collections::HashMap;

use nalgebra::{Matrix3, Vector3};

use crate::voxel_grid::cpu::{build_voxels, compute_voxel_bounds};

#[derive(Debug)]
pub struct VoxelGrid {
    config: VoxelGridConfig,
    voxels: Vec<Voxel>,
    index: HashMap<VoxelCoord, usize>,
    search: Option<VoxelSearch>,
    bounds: Option<(VoxelCoord, VoxelCoord)>,
}

impl VoxelGrid {
    /// Build a grid with default settings and the given resolution.
    pub fn from_points(points: &[[f32; 3]], resolution: f32) -> Self {
        let config = VoxelGridConfig {
            resolution,
            ..Default::default()
        };
        Self::from_points_with_config(points, config)
    }

    pub fn from_points_with_config(points: &[[f32; 3]], config: VoxelGridConfig) -> Self {
        let entries = build_voxels(points, &config);

        let coords: Vec<_> = entries.iter().map(|(coord, _)| *coord).collect();
        let bounds = compute_voxel_bounds(&coords);
        let index = coords.iter().enumerate().map(|(i, c)| (*c, i)).collect();
        let voxels: Vec<_> = entries.into_iter().map(|(_, voxel)| voxel).collect();
        let search = VoxelSearch::from_voxels(&voxels);

        Self {
            config,
            voxels,
            index,
            search,
            bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn config(&self) -> &VoxelGridConfig {
        &self.config
    }

    pub fn resolution(&self) -> f32 {
        self.config.resolution
    }

    /// Voxels in coordinate order.
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn get(&self, coord: &VoxelCoord) -> Option<&Voxel> {
        self.index.get(coord).map(|&i| &self.voxels[i])
    }

    /// The voxel geometrically containing `point`, if it holds a Gaussian.
    pub fn get_by_point(&self, point: &[f32; 3]) -> Option<&Voxel> {
        self.get(&VoxelCoord::from_point(point, self.config.resolution))
    }

    /// Voxels whose centroid lies within `radius` of `point`, nearest first.
    pub fn radius_search(&self, point: &[f64; 3], radius: f64) -> Vec<&Voxel> {
        match &self.search {
            Some(search) => search
                .within(point, radius)
                .into_iter()
                .map(|i| &self.voxels[i])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Inclusive bounds of the populated voxel coordinates.
    pub fn bounds(&self) -> Option<(VoxelCoord, VoxelCoord)> {
        self.bounds
    }

    pub fn centroids(&self) -> Vec<Vector3<f64>> {
        self.voxels.iter().map(|v| v.mean).collect()
    }

    pub fn covariances(&self) -> Vec<Matrix3<f64>> {
        self.voxels.iter().map(|v| v.covariance).collect()
    }
}
