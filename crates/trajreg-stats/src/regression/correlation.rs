use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use super::{
    CoefficientStats, RegressionFamily, SolverError, SolverOptions, SolverOutput, distribution,
    ols,
};

/// Pearson correlation between the single predictor column and the dependent variable.
///
/// The correlation coefficient is reported as the predictor's estimate; the
/// intercept slot carries no statistics.
#[expect(clippy::cast_precision_loss)]
pub(super) fn correlate(
    family: RegressionFamily,
    predictors: &DMatrix<f64>,
    dependent: &DVector<f64>,
    options: &SolverOptions,
) -> Result<SolverOutput, SolverError> {
    if predictors.ncols() != 1 {
        return Err(SolverError::PredictorCount {
            family,
            expected: 1,
            found: predictors.ncols(),
        });
    }
    let n = dependent.len();
    if n < 3 {
        return Err(SolverError::TooFewObservations {
            observations: n,
            parameters: 2,
        });
    }

    let x = predictors.column(0);
    let x_mean = x.mean();
    let y_mean = dependent.mean();
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (xi, yi) in x.iter().zip(dependent.iter()) {
        sxy += (xi - x_mean) * (yi - y_mean);
        sxx += (xi - x_mean).powi(2);
        syy += (yi - y_mean).powi(2);
    }
    let r = sxy / (sxx * syy).sqrt();
    let r_squared = r * r;
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r_squared)).sqrt();
    let p_value = distribution::t_test(t, df);
    let adj_r_squared = ols::adjusted(r_squared, n, 1);

    Ok(SolverOutput {
        r_squared,
        p_value,
        df,
        mse: None,
        coefficients: vec![
            CoefficientStats::NAN,
            CoefficientStats {
                estimate: r,
                std_error: f64::NAN,
                p_value,
                r_squared,
                adj_r_squared,
            },
        ],
        diagnostics: options.full_diagnostics.then(|| {
            BTreeMap::from([
                ("n".to_owned(), n as f64),
                ("t_statistic".to_owned(), t),
            ])
        }),
    })
}

/// Correlation with a dichotomous predictor.
pub(super) fn point_biserial(
    predictors: &DMatrix<f64>,
    dependent: &DVector<f64>,
    options: &SolverOptions,
) -> Result<SolverOutput, SolverError> {
    let mut levels: Vec<f64> = vec![];
    for &value in predictors.iter() {
        if !levels.contains(&value) {
            levels.push(value);
        }
        if levels.len() > 2 {
            return Err(SolverError::NonBinaryPredictor);
        }
    }
    if levels.len() != 2 {
        return Err(SolverError::NonBinaryPredictor);
    }
    correlate(
        RegressionFamily::PointBiserial,
        predictors,
        dependent,
        options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_negative_correlation() {
        let x = DMatrix::from_column_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = DVector::from_column_slice(&[8.0, 6.0, 4.0, 2.0]);
        let output =
            correlate(RegressionFamily::Correlation, &x, &y, &SolverOptions::default()).unwrap();
        assert!((output.coefficients[1].estimate + 1.0).abs() < 1e-12);
        assert!((output.r_squared - 1.0).abs() < 1e-12);
        assert!(output.coefficients[0].estimate.is_nan());
        assert!(output.mse.is_none());
    }

    #[test]
    fn test_requires_single_predictor() {
        let x = DMatrix::from_column_slice(3, 2, &[1.0, 2.0, 3.0, 3.0, 1.0, 2.0]);
        let y = DVector::from_column_slice(&[1.0, 2.0, 3.0]);
        let err = correlate(
            RegressionFamily::Correlation,
            &x,
            &y,
            &SolverOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::PredictorCount { found: 2, .. }));
    }

    #[test]
    fn test_point_biserial_rejects_continuous_predictor() {
        let x = DMatrix::from_column_slice(4, 1, &[0.0, 1.0, 2.0, 1.0]);
        let y = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
        let err = point_biserial(&x, &y, &SolverOptions::default()).unwrap_err();
        assert_eq!(err, SolverError::NonBinaryPredictor);
    }

    #[test]
    fn test_point_biserial_binary_predictor() {
        let x = DMatrix::from_column_slice(6, 1, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let y = DVector::from_column_slice(&[1.0, 1.5, 0.5, 3.0, 3.5, 2.5]);
        let output = point_biserial(&x, &y, &SolverOptions::default()).unwrap();
        assert!(output.coefficients[1].estimate > 0.9);
        assert!(output.p_value < 0.05);
    }
}
