//! Points-map localizer.
//!
//! Estimates the 6-DOF pose of a scan against a prebuilt points map through a
//! [`Localizer`]. [`NdtLocalizer`] drives any [`RegistrationEngine`] (the CPU
//! NDT matcher by default) and keeps two engine instances, so a new map can be
//! built while the current one keeps serving alignment.
//!
//! ```no_run
//! use points_localizer::{Localizer, NdtLocalizer, PointCloud, Pose};
//!
//! # fn run(map: PointCloud<[f32; 3]>, scan: PointCloud<[f32; 3]>) -> Result<(), ndt_cpu::NdtError> {
//! let mut localizer: NdtLocalizer<[f32; 3], [f32; 3]> = NdtLocalizer::new();
//! localizer.set_resolution(1.0);
//! localizer.update_points_map(&map)?;
//!
//! let pose = localizer.localize(&scan, &Pose::default())?;
//! println!("{}", localizer.log_file_content());
//! # let _ = pose;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod localizer;
mod ndt_engine;
pub mod ndt_localizer;
pub mod point;
pub mod pose;

pub use config::{ConfigError, LocalizerConfig};
pub use engine::{FitnessScore, RegistrationEngine};
pub use localizer::Localizer;
pub use ndt_localizer::{build_instance, EngineHandle, EngineParams, NdtLocalizer};
pub use point::{Point, PointCloud, PointXyz, PointXyzi, SharedCloud};
pub use pose::{convert_to_matrix, convert_to_pose, Pose};
