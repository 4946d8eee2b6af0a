//! Single-regression solver contract and reference implementation.
//!
//! The trajectory engine runs one regression per time point and treats the solver
//! as a black box: it hands over a predictor matrix (one column per predictor, no
//! intercept column) and a dependent vector, and reads back the statistics in
//! [`SolverOutput`]. Any type implementing [`RegressionSolver`] can be plugged in.
//!
//! [`ReferenceSolver`] covers every [`RegressionFamily`]:
//!
//! - [`RegressionFamily::Ols`] - ordinary least squares with t-test p-values
//! - [`RegressionFamily::Stepwise`] - forward selection on top of OLS
//! - [`RegressionFamily::Logistic`] - IRLS logistic regression with Wald p-values
//! - [`RegressionFamily::Correlation`] - Pearson correlation with one predictor
//! - [`RegressionFamily::PointBiserial`] - correlation with a binary predictor
//!
//! # Example
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use trajreg_stats::regression::{
//!     ReferenceSolver, RegressionFamily, RegressionSolver, SolverOptions,
//! };
//!
//! let x = DMatrix::from_column_slice(5, 1, &[1.0, 2.0, 3.0, 4.0, 5.0]);
//! let y = DVector::from_column_slice(&[3.1, 4.9, 7.2, 8.8, 11.1]);
//! let output = ReferenceSolver
//!     .solve(RegressionFamily::Ols, &x, &y, &SolverOptions::default())
//!     .unwrap();
//! assert_eq!(output.coefficients.len(), 2);
//! assert!((output.coefficients[1].estimate - 2.0).abs() < 0.1);
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

mod correlation;
mod distribution;
mod logistic;
mod ols;
mod stepwise;

/// Regression family requested for every time point of a regression call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum RegressionFamily {
    #[display("ols")]
    Ols,
    #[display("stepwise")]
    Stepwise,
    #[display("correlation")]
    Correlation,
    #[display("point_biserial")]
    PointBiserial,
    #[display("logistic")]
    Logistic,
}

impl RegressionFamily {
    pub const ALL: [Self; 5] = [
        Self::Ols,
        Self::Stepwise,
        Self::Correlation,
        Self::PointBiserial,
        Self::Logistic,
    ];

    /// Whether the family reports a meaningful per-coefficient standard error.
    #[must_use]
    pub fn has_std_error(self) -> bool {
        matches!(self, Self::Ols | Self::Stepwise)
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display(
    "unknown regression family '{name}' (ols, stepwise, correlation, point_biserial, logistic)"
)]
pub struct UnknownFamilyError {
    #[error(not(source))]
    pub name: String,
}

impl FromStr for RegressionFamily {
    type Err = UnknownFamilyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ols" | "regress" | "linear" => Ok(Self::Ols),
            "stepwise" => Ok(Self::Stepwise),
            "corr" | "correlation" => Ok(Self::Correlation),
            "pbiserial" | "point_biserial" | "point-biserial" => Ok(Self::PointBiserial),
            "logistic" | "logit" => Ok(Self::Logistic),
            _ => Err(UnknownFamilyError { name: s.to_owned() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SolverError {
    #[display("{family} regression is not supported by this solver")]
    UnsupportedFamily { family: RegressionFamily },
    #[display("{family} regression requires {expected} predictor(s), got {found}")]
    PredictorCount {
        family: RegressionFamily,
        expected: usize,
        found: usize,
    },
    #[display("design matrix is singular")]
    SingularDesign,
    #[display("predictor and dependent variable lengths differ ({predictors} vs {dependent})")]
    LengthMismatch { predictors: usize, dependent: usize },
    #[display("point-biserial correlation requires a binary predictor")]
    NonBinaryPredictor,
    #[display("logistic regression requires a 0/1 dependent variable")]
    NonBinaryResponse,
    #[display("too few observations ({observations}) for {parameters} parameters")]
    TooFewObservations {
        observations: usize,
        parameters: usize,
    },
}

/// Options forwarded to the solver for every regression.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    /// The solver must not log anything.
    pub quiet: bool,
    /// Populate [`SolverOutput::diagnostics`].
    pub full_diagnostics: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            quiet: true,
            full_diagnostics: false,
        }
    }
}

/// Statistics for one coefficient (intercept or predictor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoefficientStats {
    pub estimate: f64,
    /// Only meaningful for least-squares families; `NaN` otherwise.
    pub std_error: f64,
    pub p_value: f64,
    /// Decrease in R² when this coefficient's predictor is dropped.
    pub r_squared: f64,
    /// Decrease in adjusted R² when this coefficient's predictor is dropped.
    pub adj_r_squared: f64,
}

impl CoefficientStats {
    pub const NAN: Self = Self {
        estimate: f64::NAN,
        std_error: f64::NAN,
        p_value: f64::NAN,
        r_squared: f64::NAN,
        adj_r_squared: f64::NAN,
    };
}

/// Result of a single regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOutput {
    pub r_squared: f64,
    /// p-value of the whole model.
    pub p_value: f64,
    /// Residual degrees of freedom.
    pub df: f64,
    /// Mean squared error, when the family defines one.
    pub mse: Option<f64>,
    /// Intercept first, then one entry per predictor column.
    pub coefficients: Vec<CoefficientStats>,
    pub diagnostics: Option<BTreeMap<String, f64>>,
}

/// A pluggable single-regression solver.
pub trait RegressionSolver: fmt::Debug + Send + Sync {
    /// Runs one regression of `dependent` on the columns of `predictors`.
    ///
    /// `predictors` has one row per observation and no intercept column; the
    /// returned coefficients must start with the intercept.
    fn solve(
        &self,
        family: RegressionFamily,
        predictors: &DMatrix<f64>,
        dependent: &DVector<f64>,
        options: &SolverOptions,
    ) -> Result<SolverOutput, SolverError>;
}

pub type BoxedRegressionSolver = Box<dyn RegressionSolver>;

/// Built-in solver supporting every [`RegressionFamily`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceSolver;

impl RegressionSolver for ReferenceSolver {
    fn solve(
        &self,
        family: RegressionFamily,
        predictors: &DMatrix<f64>,
        dependent: &DVector<f64>,
        options: &SolverOptions,
    ) -> Result<SolverOutput, SolverError> {
        if predictors.nrows() != dependent.len() {
            return Err(SolverError::LengthMismatch {
                predictors: predictors.nrows(),
                dependent: dependent.len(),
            });
        }
        match family {
            RegressionFamily::Ols => ols::regress(predictors, dependent, options),
            RegressionFamily::Stepwise => stepwise::regress(predictors, dependent, options),
            RegressionFamily::Logistic => logistic::regress(predictors, dependent, options),
            RegressionFamily::Correlation => {
                correlation::correlate(family, predictors, dependent, options)
            }
            RegressionFamily::PointBiserial => {
                correlation::point_biserial(predictors, dependent, options)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Debug, Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` under a debug-level subscriber and returns everything it logged.
    pub(super) fn captured_logs(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_family_from_str_aliases() {
        assert_eq!("regress".parse::<RegressionFamily>().unwrap(), RegressionFamily::Ols);
        assert_eq!("Logit".parse::<RegressionFamily>().unwrap(), RegressionFamily::Logistic);
        assert_eq!(
            "pbiserial".parse::<RegressionFamily>().unwrap(),
            RegressionFamily::PointBiserial
        );
        let err = "anova".parse::<RegressionFamily>().unwrap_err();
        assert!(err.to_string().contains("anova"));
    }

    #[test]
    fn test_family_display_roundtrips() {
        for family in RegressionFamily::ALL {
            assert_eq!(family.to_string().parse::<RegressionFamily>().unwrap(), family);
        }
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let x = DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 3.0]);
        let y = DVector::from_column_slice(&[1.0, 2.0]);
        let err = ReferenceSolver
            .solve(RegressionFamily::Ols, &x, &y, &SolverOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            SolverError::LengthMismatch {
                predictors: 3,
                dependent: 2
            }
        );
    }
}
