//! Derivatives of the NDT score with respect to the 6-DOF pose.
//!
//! - Score (eq. 6.9): `p(x) = -d1 * exp(-d2/2 * (x-mu)^T Sigma^-1 (x-mu))`
//! - Gradient (eq. 6.12) and Hessian (eq. 6.13) follow from the chain rule
//!   through `T(x)` using the precomputed angular terms.
//!
//! The pose vector is `[tx, ty, tz, roll, pitch, yaw]`.

pub mod angular;
pub mod cpu;
pub mod types;

pub use angular::AngularDerivatives;
pub use cpu::{compute_derivative_single, compute_derivatives, transform_point};
pub use types::{Derivatives, GaussianParams, PointHessian, PointJacobian};
