use nalgebra::{DMatrix, DVector};
use tracing::debug;

use super::{
    CoefficientStats, SolverError, SolverOptions, SolverOutput,
    ols::{self, OlsFit},
};

/// p-value a candidate must beat to enter the model.
const P_ENTER: f64 = 0.05;

/// Forward stepwise least squares.
///
/// Starting from the intercept-only model, the candidate with the smallest
/// p-value is added while that p-value is below [`P_ENTER`]. Predictors that
/// never enter report a zero coefficient and `NaN` statistics.
pub(super) fn regress(
    predictors: &DMatrix<f64>,
    dependent: &DVector<f64>,
    options: &SolverOptions,
) -> Result<SolverOutput, SolverError> {
    let k = predictors.ncols();
    // Nothing is left for a predictor to explain.
    let constant = dependent.max() - dependent.min() <= 0.0;
    let selected = if constant {
        vec![]
    } else {
        select_forward(predictors, dependent, options)
    };

    let reduced = ols::select_columns(predictors, &selected);
    let mut output = ols::regress(&reduced, dependent, options)?;
    if selected.is_empty() {
        output.r_squared = if constant { f64::NAN } else { 0.0 };
    }

    let mut coefficients = vec![output.coefficients[0]];
    coefficients.extend((0..k).map(|column| {
        match selected.iter().position(|&c| c == column) {
            Some(index) => output.coefficients[index + 1],
            None => CoefficientStats {
                estimate: 0.0,
                ..CoefficientStats::NAN
            },
        }
    }));
    output.coefficients = coefficients;
    Ok(output)
}

/// Column indices that enter the model, in ascending order.
fn select_forward(
    predictors: &DMatrix<f64>,
    dependent: &DVector<f64>,
    options: &SolverOptions,
) -> Vec<usize> {
    let mut selected: Vec<usize> = vec![];
    loop {
        let best = (0..predictors.ncols())
            .filter(|c| !selected.contains(c))
            .filter_map(|candidate| {
                let mut columns = selected.clone();
                columns.push(candidate);
                let fit = OlsFit::fit(&ols::select_columns(predictors, &columns), dependent).ok()?;
                let p_value = fit.coefficient_p_value(columns.len());
                (!p_value.is_nan()).then_some((candidate, p_value))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match best {
            Some((candidate, p_value)) if p_value < P_ENTER => {
                if !options.quiet {
                    debug!(column = candidate, p_value, "predictor entered");
                }
                selected.push(candidate);
            }
            _ => break,
        }
    }
    selected.sort_unstable();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irrelevant_predictor_excluded() {
        let x1 = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let noise = [0.3, -0.2, 0.1, 0.4, -0.3, 0.2, -0.1, -0.4, 0.3, -0.3];
        let x2 = [5.0, 3.0, 8.0, 1.0, 9.0, 2.0, 7.0, 4.0, 6.0, 10.0];
        let y = x1
            .iter()
            .zip(&noise)
            .map(|(a, e)| 3.0 * a + e)
            .collect::<Vec<_>>();
        let mut data = x1.to_vec();
        data.extend_from_slice(&x2);
        let predictors = DMatrix::from_column_slice(10, 2, &data);

        let output =
            regress(&predictors, &DVector::from_vec(y), &SolverOptions::default()).unwrap();

        assert_eq!(output.coefficients.len(), 3);
        assert!((output.coefficients[1].estimate - 3.0).abs() < 0.2);
        assert_eq!(output.coefficients[2].estimate, 0.0);
        assert!(output.coefficients[2].p_value.is_nan());
    }

    #[test]
    fn test_no_predictor_enters() {
        let x = DMatrix::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = DVector::from_column_slice(&[1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);
        let output = regress(&x, &y, &SolverOptions::default()).unwrap();
        assert_eq!(output.coefficients[1].estimate, 0.0);
        assert_eq!(output.r_squared, 0.0);
    }

    #[test]
    fn test_constant_dependent_has_nan_r_squared() {
        let x = DMatrix::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = DVector::from_element(6, 2.0);
        let output = regress(&x, &y, &SolverOptions::default()).unwrap();
        assert_eq!(output.coefficients[1].estimate, 0.0);
        assert!(output.r_squared.is_nan());
        assert!((output.coefficients[0].estimate - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_quiet_option_suppresses_logging() {
        let x = DMatrix::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = DVector::from_column_slice(&[2.1, 3.9, 6.2, 7.8, 10.1, 12.0]);
        let run = |quiet| {
            crate::regression::tests::captured_logs(|| {
                let options = SolverOptions {
                    quiet,
                    ..SolverOptions::default()
                };
                regress(&x, &y, &options).unwrap();
            })
        };

        assert!(run(false).contains("predictor entered"));
        assert_eq!(run(true), "");
    }
}
