/// Descriptive statistics summarizing a dataset.
///
/// Non-finite values (`NaN`, infinities) are skipped, so the statistics describe
/// only the valid observations. `count` is the number of values actually used.
#[derive(Debug, Clone)]
pub struct DescriptiveStats {
    /// Number of finite values in the dataset.
    pub count: usize,
    /// The minimum value in the dataset.
    pub min: f64,
    /// The maximum value in the dataset.
    pub max: f64,
    /// The arithmetic mean (average) of the dataset.
    pub mean: f64,
    /// The median value of the dataset.
    pub median: f64,
    /// The sample variance (`n - 1` denominator) of the dataset.
    ///
    /// `NaN` when fewer than two values are available.
    pub variance: f64,
    /// The sample standard deviation of the dataset.
    pub std_dev: f64,
}

impl DescriptiveStats {
    /// Computes descriptive statistics from unsorted values.
    ///
    /// Non-finite values are dropped before sorting.
    ///
    /// # Returns
    ///
    /// * `Some(DescriptiveStats)` - if the dataset contains at least one finite value
    /// * `None` - if the dataset is empty or contains only non-finite values
    ///
    /// # Examples
    ///
    /// ```
    /// # use trajreg_stats::descriptive::DescriptiveStats;
    /// let values = [5.0, 2.0, f64::NAN, 4.0, 1.0, 3.0];
    /// let stats = DescriptiveStats::new(values).unwrap();
    /// assert_eq!(stats.count, 5);
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 5.0);
    /// assert_eq!(stats.mean, 3.0);
    /// assert_eq!(stats.median, 3.0);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values
            .into_iter()
            .filter(|v| v.is_finite())
            .collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);
        Self::from_sorted(&values)
    }

    /// Computes descriptive statistics from pre-sorted finite values.
    ///
    /// # Panics
    ///
    /// Panics if `sorted_values` is not sorted in ascending order.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_sorted(sorted_values: &[f64]) -> Option<Self> {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );

        let min = *sorted_values.first()?;
        let max = *sorted_values.last()?;
        let count = sorted_values.len();
        let n = count as f64;
        let mean = sorted_values.iter().sum::<f64>() / n;
        let median = sorted_values[count / 2];
        let variance = if count < 2 {
            f64::NAN
        } else {
            sorted_values
                .iter()
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0)
        };

        Some(Self {
            count,
            min,
            max,
            mean,
            median,
            variance,
            std_dev: variance.sqrt(),
        })
    }
}

/// Sample standard deviation of the finite values, or `NaN` when fewer than two exist.
///
/// ```
/// # use trajreg_stats::descriptive::nan_std_dev;
/// assert!((nan_std_dev([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138_089_935).abs() < 1e-6);
/// assert!(nan_std_dev([1.0, f64::NAN]).is_nan());
/// ```
#[must_use]
pub fn nan_std_dev<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    DescriptiveStats::new(values).map_or(f64::NAN, |stats| stats.std_dev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_all_nan() {
        assert!(DescriptiveStats::new([]).is_none());
        assert!(DescriptiveStats::new([f64::NAN, f64::NAN]).is_none());
    }

    #[test]
    fn test_single_value_has_nan_variance() {
        let stats = DescriptiveStats::new([3.0]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 3.0);
        assert!(stats.variance.is_nan());
    }

    #[test]
    fn test_sample_variance() {
        let stats = DescriptiveStats::new([1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((stats.variance - 5.0 / 3.0).abs() < 1e-12);
        assert!((stats.std_dev - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_infinities_are_skipped() {
        let stats = DescriptiveStats::new([f64::INFINITY, 1.0, 3.0]).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max, 3.0);
    }
}
