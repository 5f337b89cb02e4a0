//! Point types and the ordered point cloud handed to the localizer.

use std::slice;
use std::sync::Arc;

/// Anything registration can consume: a point with a position.
///
/// `Default` is required so a placeholder point can be made when an engine
/// has to be fed a one-point cloud.
pub trait Point: Clone + Default + Send + Sync + 'static {
    fn xyz(&self) -> [f32; 3];
}

impl Point for [f32; 3] {
    fn xyz(&self) -> [f32; 3] {
        *self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointXyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PointXyz {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Point for PointXyz {
    fn xyz(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Lidar return with intensity. Registration only looks at the position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointXyzi {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

impl PointXyzi {
    pub fn new(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Self { x, y, z, intensity }
    }
}

impl Point for PointXyzi {
    fn xyz(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud<P> {
    points: Vec<P>,
}

/// Read-only cloud shared between the caller and the localizer.
pub type SharedCloud<P> = Arc<PointCloud<P>>;

impl<P> Default for PointCloud<P> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

impl<P: Point> PointCloud<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<P>) -> Self {
        Self { points }
    }

    pub fn push(&mut self, point: P) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, P> {
        self.points.iter()
    }

    pub fn points(&self) -> &[P] {
        &self.points
    }

    /// Positions only, in cloud order.
    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.points.iter().map(Point::xyz).collect()
    }

    pub fn into_shared(self) -> SharedCloud<P> {
        Arc::new(self)
    }
}

impl<P: Point> FromIterator<P> for PointCloud<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::from_points(iter.into_iter().collect())
    }
}

impl<'a, P: Point> IntoIterator for &'a PointCloud<P> {
    type Item = &'a P;
    type IntoIter = slice::Iter<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
