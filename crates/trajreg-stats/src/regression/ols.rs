use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use super::{CoefficientStats, SolverError, SolverOptions, SolverOutput, distribution};

/// Least-squares fit with an intercept prepended to the predictor columns.
#[derive(Debug, Clone)]
pub(super) struct OlsFit {
    pub(super) coefficients: DVector<f64>,
    pub(super) std_errors: DVector<f64>,
    pub(super) residual_ss: f64,
    pub(super) total_ss: f64,
    pub(super) n: usize,
    /// Number of predictor columns, excluding the intercept.
    pub(super) k: usize,
}

#[expect(clippy::cast_precision_loss)]
impl OlsFit {
    pub(super) fn fit(
        predictors: &DMatrix<f64>,
        dependent: &DVector<f64>,
    ) -> Result<Self, SolverError> {
        let n = dependent.len();
        let k = predictors.ncols();
        if n < k + 2 {
            return Err(SolverError::TooFewObservations {
                observations: n,
                parameters: k + 1,
            });
        }

        let design = with_intercept(predictors);
        let xtx = design.transpose() * &design;
        let singular_values = xtx.clone().svd(false, false).singular_values;
        if !(singular_values.min() > singular_values.max() * 1e-12) {
            return Err(SolverError::SingularDesign);
        }
        let xtx_inv = xtx.try_inverse().ok_or(SolverError::SingularDesign)?;
        let coefficients = &xtx_inv * design.transpose() * dependent;

        let residuals = dependent - &design * &coefficients;
        let residual_ss = residuals.norm_squared();
        let mean = dependent.mean();
        let total_ss = dependent.iter().map(|y| (y - mean).powi(2)).sum::<f64>();

        let df = (n - k - 1) as f64;
        let mse = residual_ss / df;
        let std_errors = xtx_inv.diagonal().map(|v| (v.max(0.0) * mse).sqrt());

        Ok(Self {
            coefficients,
            std_errors,
            residual_ss,
            total_ss,
            n,
            k,
        })
    }

    pub(super) fn df_resid(&self) -> f64 {
        (self.n - self.k - 1) as f64
    }

    pub(super) fn mse(&self) -> f64 {
        self.residual_ss / self.df_resid()
    }

    pub(super) fn r_squared(&self) -> f64 {
        if self.total_ss > 0.0 {
            1.0 - self.residual_ss / self.total_ss
        } else {
            f64::NAN
        }
    }

    pub(super) fn adj_r_squared(&self) -> f64 {
        adjusted(self.r_squared(), self.n, self.k)
    }

    pub(super) fn f_statistic(&self) -> f64 {
        if self.k == 0 {
            return f64::NAN;
        }
        let explained = (self.total_ss - self.residual_ss) / self.k as f64;
        explained / self.mse()
    }

    pub(super) fn model_p_value(&self) -> f64 {
        distribution::f_test(self.f_statistic(), self.k as f64, self.df_resid())
    }

    pub(super) fn coefficient_p_value(&self, index: usize) -> f64 {
        let t = self.coefficients[index] / self.std_errors[index];
        distribution::t_test(t, self.df_resid())
    }

    pub(super) fn diagnostics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("n".to_owned(), self.n as f64),
            ("f_statistic".to_owned(), self.f_statistic()),
            ("residual_ss".to_owned(), self.residual_ss),
            ("total_ss".to_owned(), self.total_ss),
            ("adj_r_squared".to_owned(), self.adj_r_squared()),
        ])
    }
}

#[expect(clippy::cast_precision_loss)]
pub(super) fn adjusted(r_squared: f64, n: usize, k: usize) -> f64 {
    let n = n as f64;
    let k = k as f64;
    1.0 - (1.0 - r_squared) * (n - 1.0) / (n - k - 1.0)
}

pub(super) fn with_intercept(predictors: &DMatrix<f64>) -> DMatrix<f64> {
    predictors.clone().insert_column(0, 1.0)
}

/// Copies the given columns of `predictors` into a new matrix.
pub(super) fn select_columns(predictors: &DMatrix<f64>, columns: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(predictors.nrows(), columns.len(), |row, col| {
        predictors[(row, columns[col])]
    })
}

pub(super) fn regress(
    predictors: &DMatrix<f64>,
    dependent: &DVector<f64>,
    options: &SolverOptions,
) -> Result<SolverOutput, SolverError> {
    let fit = OlsFit::fit(predictors, dependent)?;
    let r_squared = fit.r_squared();
    let adj_r_squared = fit.adj_r_squared();

    let mut coefficients = Vec::with_capacity(fit.k + 1);
    coefficients.push(CoefficientStats {
        estimate: fit.coefficients[0],
        std_error: fit.std_errors[0],
        p_value: fit.coefficient_p_value(0),
        r_squared: f64::NAN,
        adj_r_squared: f64::NAN,
    });
    for j in 0..fit.k {
        let others = (0..fit.k).filter(|&c| c != j).collect::<Vec<_>>();
        let reduced = OlsFit::fit(&select_columns(predictors, &others), dependent)?;
        coefficients.push(CoefficientStats {
            estimate: fit.coefficients[j + 1],
            std_error: fit.std_errors[j + 1],
            p_value: fit.coefficient_p_value(j + 1),
            r_squared: r_squared - reduced.r_squared(),
            adj_r_squared: adj_r_squared - reduced.adj_r_squared(),
        });
    }

    Ok(SolverOutput {
        r_squared,
        p_value: fit.model_p_value(),
        df: fit.df_resid(),
        mse: Some(fit.mse()),
        coefficients,
        diagnostics: options.full_diagnostics.then(|| fit.diagnostics()),
    })
}
