//! Gaussian smoothing for evenly sampled series.
//!
//! The kernel spans `±3σ` samples, never more than the series length, and is
//! renormalized at the series edges, so a constant series stays constant after
//! smoothing.

/// Smooths `values` with a Gaussian kernel of standard deviation `sigma_samples`.
///
/// A non-positive or non-finite `sigma_samples` returns the input unchanged.
///
/// # Examples
///
/// ```
/// use trajreg_stats::smoothing::gaussian_smooth;
///
/// let smoothed = gaussian_smooth(&[0.0, 0.0, 3.0, 0.0, 0.0], 1.0);
/// assert!(smoothed[2] < 3.0);
/// assert!(smoothed[1] > 0.0);
/// assert!((smoothed.iter().sum::<f64>() - 3.0).abs() < 0.5);
/// ```
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
#[must_use]
pub fn gaussian_smooth(values: &[f64], sigma_samples: f64) -> Vec<f64> {
    if !(sigma_samples.is_finite() && sigma_samples > 0.0) || values.len() < 2 {
        return values.to_vec();
    }

    // Weights past either end of the series are never used.
    let half_width = ((3.0 * sigma_samples).ceil() as usize).min(values.len());
    let kernel = (0..=2 * half_width)
        .map(|i| {
            let offset = i as f64 - half_width as f64;
            (-0.5 * (offset / sigma_samples).powi(2)).exp()
        })
        .collect::<Vec<_>>();

    let len = values.len() as isize;
    (0..len)
        .map(|center| {
            let mut weighted = 0.0;
            let mut weight_sum = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let index = center + k as isize - half_width as isize;
                if (0..len).contains(&index) {
                    weighted += weight * values[index as usize];
                    weight_sum += weight;
                }
            }
            weighted / weight_sum
        })
        .collect()
}
