//! Score normalisation.

/// NDT score averaged over the source cloud, the figure reported as
/// "transformation probability". Zero for an empty cloud.
pub fn compute_transform_probability(score: f64, num_source_points: usize) -> f64 {
    if num_source_points == 0 {
        0.0
    } else {
        score / num_source_points as f64
    }
}
