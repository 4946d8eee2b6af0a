use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use super::{CoefficientStats, SolverError, SolverOptions, SolverOutput, distribution, ols};

const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-10;
const MIN_WEIGHT: f64 = 1e-10;

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

fn log_likelihood(probabilities: impl Iterator<Item = f64>, dependent: &DVector<f64>) -> f64 {
    probabilities
        .zip(dependent.iter())
        .map(|(p, &y)| {
            let p = p.clamp(MIN_WEIGHT, 1.0 - MIN_WEIGHT);
            y * p.ln() + (1.0 - y) * (1.0 - p).ln()
        })
        .sum()
}

/// Logistic regression fitted by iteratively reweighted least squares.
///
/// Reports Wald p-values per coefficient, McFadden's pseudo-R² and the
/// likelihood-ratio p-value of the whole model.
#[expect(clippy::cast_precision_loss)]
pub(super) fn regress(
    predictors: &DMatrix<f64>,
    dependent: &DVector<f64>,
    options: &SolverOptions,
) -> Result<SolverOutput, SolverError> {
    if dependent.iter().any(|&y| y != 0.0 && y != 1.0) {
        return Err(SolverError::NonBinaryResponse);
    }
    let n = dependent.len();
    let k = predictors.ncols();
    if n < k + 2 {
        return Err(SolverError::TooFewObservations {
            observations: n,
            parameters: k + 1,
        });
    }

    let design = ols::with_intercept(predictors);
    let mut beta = DVector::<f64>::zeros(k + 1);
    let mut covariance = DMatrix::<f64>::identity(k + 1, k + 1);
    let mut iterations = 0;
    let mut converged = false;
    for _ in 0..MAX_ITERATIONS {
        iterations += 1;
        let eta = &design * &beta;
        let mu = eta.map(sigmoid);
        let weights = mu.map(|m| (m * (1.0 - m)).max(MIN_WEIGHT));

        let mut weighted_design = design.clone();
        for (mut row, w) in weighted_design.row_iter_mut().zip(weights.iter()) {
            row *= *w;
        }
        let information = design.transpose() * &weighted_design;
        covariance = information
            .try_inverse()
            .ok_or(SolverError::SingularDesign)?;
        let score = design.transpose() * (dependent - &mu);
        let step = &covariance * score;
        beta += &step;
        if step.amax() < TOLERANCE {
            converged = true;
            break;
        }
    }
    if !options.quiet {
        if converged {
            debug!(iterations, "logistic fit converged");
        } else {
            warn!(iterations, "logistic fit did not converge");
        }
    }

    let fitted = (&design * &beta).map(sigmoid);
    let ll = log_likelihood(fitted.iter().copied(), dependent);
    let mean = dependent.mean();
    let ll_null = log_likelihood(std::iter::repeat_n(mean, n), dependent);
    let r_squared = if ll_null < 0.0 { 1.0 - ll / ll_null } else { f64::NAN };
    let lr_statistic = 2.0 * (ll - ll_null);
    let p_value = distribution::chi_squared_test(lr_statistic, k as f64);

    let coefficients = (0..=k)
        .map(|j| {
            let std_error = covariance[(j, j)].max(0.0).sqrt();
            CoefficientStats {
                estimate: beta[j],
                std_error: f64::NAN,
                p_value: distribution::z_test(beta[j] / std_error),
                r_squared: f64::NAN,
                adj_r_squared: f64::NAN,
            }
        })
        .collect();

    Ok(SolverOutput {
        r_squared,
        p_value,
        df: (n - k - 1) as f64,
        mse: None,
        coefficients,
        diagnostics: options.full_diagnostics.then(|| {
            BTreeMap::from([
                ("n".to_owned(), n as f64),
                ("iterations".to_owned(), iterations as f64),
                ("log_likelihood".to_owned(), ll),
                ("null_log_likelihood".to_owned(), ll_null),
                ("deviance".to_owned(), -2.0 * ll),
            ])
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_binary_response() {
        let x = DMatrix::from_column_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = DVector::from_column_slice(&[0.0, 1.0, 2.0, 1.0]);
        let err = regress(&x, &y, &SolverOptions::default()).unwrap_err();
        assert_eq!(err, SolverError::NonBinaryResponse);
    }

    #[test]
    fn test_overlapping_classes_positive_slope() {
        let x = DMatrix::from_column_slice(
            10,
            1,
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
        );
        let y = DVector::from_column_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
        let output = regress(
            &x,
            &y,
            &SolverOptions {
                quiet: true,
                full_diagnostics: true,
            },
        )
        .unwrap();

        assert!(output.coefficients[1].estimate > 0.0);
        assert!(output.r_squared > 0.0 && output.r_squared < 1.0);
        assert!(output.coefficients[1].std_error.is_nan());
        assert!(output.p_value > 0.0 && output.p_value < 0.1);
        assert_eq!(output.df, 8.0);
        assert!(output.diagnostics.unwrap()["iterations"] < 100.0);
    }

    #[test]
    fn test_reports_convergence_unless_quiet() {
        let x = DMatrix::from_column_slice(8, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let y = DVector::from_column_slice(&[0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let run = |quiet| {
            crate::regression::tests::captured_logs(|| {
                let options = SolverOptions {
                    quiet,
                    ..SolverOptions::default()
                };
                regress(&x, &y, &options).unwrap();
            })
        };

        assert!(run(false).contains("logistic fit converged"));
        assert_eq!(run(true), "");
    }
}
