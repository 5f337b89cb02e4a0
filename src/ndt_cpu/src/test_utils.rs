//! Synthetic clouds with known geometry for alignment tests.
//!
//! The half-cubic map is three orthogonal 20 m planes meeting at the origin;
//! it constrains all six degrees of freedom, so an offset scan has a unique
//! correct alignment.

use std::collections::BTreeMap;

/// Three orthogonal planes (z=0, x=0, y=0) spanning `[0, length]` with
/// points every `interval` meters.
pub fn make_half_cubic_pcd(length: f32, interval: f32) -> Vec<[f32; 3]> {
    let per_line = (length / interval) as usize + 1;
    let mut points = Vec::with_capacity(3 * per_line * per_line);

    for i in 0..per_line {
        for j in 0..per_line {
            let u = interval * j as f32;
            let v = interval * i as f32;
            points.push([u, v, 0.0]);
            points.push([0.0, u, v]);
            points.push([u, 0.0, v]);
        }
    }

    points
}

/// 20 m half-cube at 0.2 m spacing (3 x 101² points).
pub fn make_default_half_cubic_pcd() -> Vec<[f32; 3]> {
    make_half_cubic_pcd(20.0, 0.2)
}

pub fn translate_points(points: &[[f32; 3]], offset: [f32; 3]) -> Vec<[f32; 3]> {
    points
        .iter()
        .map(|p| [p[0] + offset[0], p[1] + offset[1], p[2] + offset[2]])
        .collect()
}

/// Replace the points of every occupied `leaf_size` cell by their centroid.
/// Output is ordered by cell.
pub fn voxelize_pcd(points: &[[f32; 3]], leaf_size: f32) -> Vec<[f32; 3]> {
    let mut cells: BTreeMap<(i32, i32, i32), ([f64; 3], usize)> = BTreeMap::new();

    for p in points.iter().filter(|p| p.iter().all(|c| c.is_finite())) {
        let key = (
            (p[0] / leaf_size).floor() as i32,
            (p[1] / leaf_size).floor() as i32,
            (p[2] / leaf_size).floor() as i32,
        );
        let (sum, count) = cells.entry(key).or_insert(([0.0; 3], 0));
        for k in 0..3 {
            sum[k] += p[k] as f64;
        }
        *count += 1;
    }

    cells
        .values()
        .map(|(sum, count)| {
            let n = *count as f64;
            [(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32]
        })
        .collect()
}

/// The half-cube downsampled to 1 m, a stand-in for a sensor scan.
pub fn make_default_sensor_pcd() -> Vec<[f32; 3]> {
    voxelize_pcd(&make_default_half_cubic_pcd(), 1.0)
}
