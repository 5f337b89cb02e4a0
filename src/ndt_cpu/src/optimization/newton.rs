//! Newton step `delta = -H^-1 g`, solved by SVD so near-singular Hessians
//! degrade into a pseudo-inverse instead of blowing up.

use nalgebra::{Matrix6, Vector6};

/// Solve `H * delta = -g`. Returns `None` when every singular value of `H`
/// is below `tolerance`.
pub fn newton_step(
    gradient: &Vector6<f64>,
    hessian: &Matrix6<f64>,
    tolerance: f64,
) -> Option<Vector6<f64>> {
    let svd = hessian.svd(true, true);
    if svd.singular_values.max() < tolerance {
        return None;
    }

    let delta = svd.solve(&(-gradient), tolerance).ok()?;
    delta.iter().all(|v| v.is_finite()).then_some(delta)
}

/// [`newton_step`] on `H + lambda * I`.
pub fn newton_step_regularized(
    gradient: &Vector6<f64>,
    hessian: &Matrix6<f64>,
    regularization: f64,
    tolerance: f64,
) -> Option<Vector6<f64>> {
    let loaded = hessian + Matrix6::identity() * regularization;
    newton_step(gradient, &loaded, tolerance)
}

/// Ratio of the largest to the smallest singular value, `INFINITY` when the
/// matrix is singular.
pub fn condition_number(hessian: &Matrix6<f64>) -> f64 {
    let singular_values = hessian.svd(false, false).singular_values;
    let min_sv = singular_values.min();

    if min_sv < 1e-15 {
        f64::INFINITY
    } else {
        singular_values.max() / min_sv
    }
}
