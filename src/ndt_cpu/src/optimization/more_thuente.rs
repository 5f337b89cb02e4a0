//! More-Thuente line search (More and Thuente 1994) in the form NDT uses it.
//!
//! NDT maximises its score, so the search runs on `phi(a) = -score(x + a*d)`
//! and looks for a step satisfying the sufficient decrease condition
//!
//! ```text
//! phi(a) <= phi(0) + mu * a * phi'(0)
//! ```
//!
//! and the curvature condition `phi'(a) <= -nu * phi'(0)`.
//! The interval of uncertainty is updated with the auxiliary function
//! `psi(a) = phi(a) - phi(0) - mu * a * phi'(0)` until a step qualifies.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchConfig {
    /// Upper bound on the step length.
    pub step_max: f64,
    /// Lower bound on the step length.
    pub step_min: f64,
    /// Sufficient decrease constant.
    pub mu: f64,
    /// Curvature constant.
    pub nu: f64,
    /// Trial evaluations after the initial one.
    pub max_iterations: usize,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            step_max: 0.1,
            step_min: 1e-9,
            mu: 1e-4,
            nu: 0.9,
            max_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearchResult {
    pub step_length: f64,
    /// Whether both Wolfe conditions held at `step_length`.
    pub converged: bool,
    /// Trial evaluations performed.
    pub evaluations: usize,
    /// Score at `step_length`.
    pub score: f64,
}

/// `psi(a) = phi(a) - phi(0) - mu * a * phi'(0)`.
#[inline]
fn auxiliary_psi(a: f64, phi_a: f64, phi_0: f64, dphi_0: f64, mu: f64) -> f64 {
    phi_a - phi_0 - mu * dphi_0 * a
}

#[inline]
fn auxiliary_dpsi(dphi_a: f64, dphi_0: f64, mu: f64) -> f64 {
    dphi_a - mu * dphi_0
}

/// Minimiser of the cubic through `(a, f_a, g_a)` and `(b, f_b, g_b)`.
#[inline]
fn cubic_minimizer(a: f64, f_a: f64, g_a: f64, b: f64, f_b: f64, g_b: f64) -> f64 {
    let z = 3.0 * (f_b - f_a) / (b - a) - g_b - g_a;
    let w = (z * z - g_b * g_a).max(0.0).sqrt();
    a + (b - a) * (w - g_a - z) / (g_b - g_a + 2.0 * w)
}

/// Trial step selection, More-Thuente section 4.
///
/// `(a_l, f_l, g_l)` is the endpoint with the lowest value, `(a_u, f_u, g_u)`
/// the other endpoint and `(a_t, f_t, g_t)` the latest trial.
#[allow(clippy::too_many_arguments)]
fn trial_value_selection(
    a_l: f64,
    f_l: f64,
    g_l: f64,
    a_u: f64,
    f_u: f64,
    g_u: f64,
    a_t: f64,
    f_t: f64,
    g_t: f64,
) -> f64 {
    // Case 1: higher value, the minimiser is bracketed.
    if f_t > f_l {
        let a_c = cubic_minimizer(a_l, f_l, g_l, a_t, f_t, g_t);
        let a_q = a_l - 0.5 * (a_l - a_t) * g_l / (g_l - (f_l - f_t) / (a_l - a_t));
        return if (a_c - a_l).abs() < (a_q - a_l).abs() {
            a_c
        } else {
            0.5 * (a_q + a_c)
        };
    }

    // Case 2: lower value, derivatives of opposite sign.
    if g_t * g_l < 0.0 {
        let a_c = cubic_minimizer(a_l, f_l, g_l, a_t, f_t, g_t);
        let a_s = a_l - (a_l - a_t) / (g_l - g_t) * g_l;
        return if (a_c - a_t).abs() >= (a_s - a_t).abs() {
            a_c
        } else {
            a_s
        };
    }

    // Case 3: lower value, same sign, derivative magnitude decreasing.
    if g_t.abs() <= g_l.abs() {
        let a_c = cubic_minimizer(a_l, f_l, g_l, a_t, f_t, g_t);
        let a_s = a_l - (a_l - a_t) / (g_l - g_t) * g_l;
        let a_next = if (a_c - a_t).abs() < (a_s - a_t).abs() {
            a_c
        } else {
            a_s
        };
        let bound = a_t + 0.66 * (a_u - a_t);
        return if a_t > a_l {
            bound.min(a_next)
        } else {
            bound.max(a_next)
        };
    }

    // Case 4: lower value, same sign, derivative magnitude not decreasing.
    cubic_minimizer(a_u, f_u, g_u, a_t, f_t, g_t)
}

/// Interval update, More-Thuente section 2 (U1-U3).
///
/// Returns true when the interval can no longer shrink.
#[allow(clippy::too_many_arguments)]
fn update_interval(
    a_l: &mut f64,
    f_l: &mut f64,
    g_l: &mut f64,
    a_u: &mut f64,
    f_u: &mut f64,
    g_u: &mut f64,
    a_t: f64,
    f_t: f64,
    g_t: f64,
) -> bool {
    if f_t > *f_l {
        *a_u = a_t;
        *f_u = f_t;
        *g_u = g_t;
        false
    } else if g_t * (*a_l - a_t) > 0.0 {
        *a_l = a_t;
        *f_l = f_t;
        *g_l = g_t;
        false
    } else if g_t * (*a_l - a_t) < 0.0 {
        *a_u = *a_l;
        *f_u = *f_l;
        *g_u = *g_l;
        *a_l = a_t;
        *f_l = f_t;
        *g_l = g_t;
        false
    } else {
        true
    }
}

/// Search for an ascent step length along a fixed direction.
///
/// `score_and_derivative(a)` returns the score at step `a` and its directional
/// derivative. `initial_derivative` must be positive for the direction to be
/// an ascent direction; otherwise the search returns a zero step.
pub fn more_thuente_search<F>(
    mut score_and_derivative: F,
    initial_score: f64,
    initial_derivative: f64,
    initial_step: f64,
    config: &LineSearchConfig,
) -> LineSearchResult
where
    F: FnMut(f64) -> (f64, f64),
{
    if initial_derivative.is_nan() || initial_derivative <= 0.0 {
        return LineSearchResult {
            step_length: 0.0,
            converged: false,
            evaluations: 0,
            score: initial_score,
        };
    }

    let step_max = config.step_max;
    let step_min = config.step_min.min(step_max);
    let (mu, nu) = (config.mu, config.nu);

    let phi_0 = -initial_score;
    let dphi_0 = -initial_derivative;

    // Endpoints start at zero, carried in psi until the first trial lands
    // in the region where psi <= 0 and phi' >= 0.
    let (mut a_l, mut a_u) = (0.0, 0.0);
    let (mut f_l, mut g_l) = (
        auxiliary_psi(a_l, phi_0, phi_0, dphi_0, mu),
        auxiliary_dpsi(dphi_0, dphi_0, mu),
    );
    let (mut f_u, mut g_u) = (f_l, g_l);

    let mut open_interval = true;
    let mut interval_converged = step_max - step_min < 0.0;

    let mut a_t = finite_or(initial_step, step_min).clamp(step_min, step_max);
    let (score_t, deriv_t) = score_and_derivative(a_t);
    let mut evaluations = 1;

    let mut phi_t = -score_t;
    let mut dphi_t = -deriv_t;
    let mut psi_t = auxiliary_psi(a_t, phi_t, phi_0, dphi_0, mu);
    let mut dpsi_t = auxiliary_dpsi(dphi_t, dphi_0, mu);

    let wolfe = |psi: f64, dphi: f64| psi <= 0.0 && dphi <= -nu * dphi_0;

    let mut iterations = 0;
    while !interval_converged && iterations < config.max_iterations && !wolfe(psi_t, dphi_t) {
        a_t = if open_interval {
            trial_value_selection(a_l, f_l, g_l, a_u, f_u, g_u, a_t, psi_t, dpsi_t)
        } else {
            trial_value_selection(a_l, f_l, g_l, a_u, f_u, g_u, a_t, phi_t, dphi_t)
        };
        a_t = finite_or(a_t, 0.5 * (a_l + a_u)).clamp(step_min, step_max);

        let (score, deriv) = score_and_derivative(a_t);
        evaluations += 1;

        phi_t = -score;
        dphi_t = -deriv;
        psi_t = auxiliary_psi(a_t, phi_t, phi_0, dphi_0, mu);
        dpsi_t = auxiliary_dpsi(dphi_t, dphi_0, mu);

        // Switch from psi to phi once the trial is in the sufficient
        // decrease region with a non-negative slope.
        if open_interval && psi_t <= 0.0 && dpsi_t >= 0.0 {
            open_interval = false;
            f_l += phi_0 - mu * dphi_0 * a_l;
            g_l += mu * dphi_0;
            f_u += phi_0 - mu * dphi_0 * a_u;
            g_u += mu * dphi_0;
        }

        interval_converged = if open_interval {
            update_interval(
                &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, a_t, psi_t, dpsi_t,
            )
        } else {
            update_interval(
                &mut a_l, &mut f_l, &mut g_l, &mut a_u, &mut f_u, &mut g_u, a_t, phi_t, dphi_t,
            )
        };

        iterations += 1;
    }

    LineSearchResult {
        step_length: a_t,
        converged: wolfe(psi_t, dphi_t),
        evaluations,
        score: -phi_t,
    }
}

#[inline]
fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
