//! YAML configuration for the localizer.
//!
//! ```yaml
//! ndt:
//!   trans_epsilon: 0.01
//!   step_size: 0.1
//!   resolution: 2.0
//!   max_iterations: 30
//! fitness:
//!   max_range: 1.0
//! ```
//!
//! Every key is optional; missing ones take the values above.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::engine::FitnessScore;
use crate::localizer::Localizer;
use crate::point::{Point, PointCloud};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NdtSection {
    pub trans_epsilon: f64,
    pub step_size: f64,
    pub resolution: f32,
    pub max_iterations: usize,
}

impl Default for NdtSection {
    fn default() -> Self {
        Self {
            trans_epsilon: 0.01,
            step_size: 0.1,
            resolution: 2.0,
            max_iterations: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessSection {
    /// Squared distance bound for pairs counted by range-limited fitness.
    pub max_range: f64,
}

impl Default for FitnessSection {
    fn default() -> Self {
        Self { max_range: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizerConfig {
    #[serde(default)]
    pub ndt: NdtSection,

    #[serde(default)]
    pub fitness: FitnessSection,
}

impl LocalizerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading localizer config");
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Push the NDT tunables into `localizer`.
    pub fn apply<S, T, L>(&self, localizer: &mut L)
    where
        S: Point,
        T: Point,
        L: Localizer<S, T> + ?Sized,
    {
        localizer.set_transformation_epsilon(self.ndt.trans_epsilon);
        localizer.set_step_size(self.ndt.step_size);
        localizer.set_resolution(self.ndt.resolution);
        localizer.set_maximum_iterations(self.ndt.max_iterations);
    }

    /// Fitness of `source` against the localizer's map, counting only pairs
    /// within `fitness.max_range`.
    pub fn fitness_score<S, T, L>(
        &self,
        localizer: &L,
        source: &PointCloud<S>,
    ) -> Result<FitnessScore, L::Error>
    where
        S: Point,
        T: Point,
        L: Localizer<S, T> + ?Sized,
    {
        localizer.fitness_score_with(source, self.fitness.max_range)
    }
}
