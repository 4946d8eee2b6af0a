//! Measure specifications and the measure registry
//!
//! A *measure* is a named quantity derived from trials, such as the x velocity,
//! the implied endpoint, or the trial's target. Regressions name their predictors
//! and dependent variable with measure specs:
//!
//! ```text
//! [#]name[(key=value, ...)]
//! ```
//!
//! The leading `#` marks a **dynamic** measure, evaluated at every time point.
//! Without it the measure is **fixed**: one value per trial.
//!
//! # Architecture
//!
//! - [`MeasureSpec`] - parsed spec (name, numeric arguments, dynamic flag)
//! - [`DynamicMeasureProvider`] - evaluates a spec at a [`RowMatrix`] of rows
//!   (built-in: [`dynamic::BuiltinDynamicMeasures`])
//! - [`FixedMeasureProvider`] - evaluates a spec once per trial
//!   (built-in: [`fixed::BuiltinFixedMeasures`])
//! - [`velocity::VelocityProvider`] - speed series used by the `ivel` measure
//!
//! Providers are the extension point: callers may replace either built-in
//! provider with their own through [`RegressionConfig`](crate::config::RegressionConfig).
//!
//! # Example
//!
//! ```
//! use trajreg_analysis::measure::MeasureSpec;
//!
//! let spec = MeasureSpec::parse("#dtheta(smooth=0.02)").unwrap();
//! assert!(spec.dynamic);
//! assert_eq!(spec.name, "dtheta");
//! assert_eq!(spec.arg("smooth"), Some(0.02));
//! ```

use std::{collections::BTreeMap, fmt};

use nalgebra::DMatrix;

use crate::{
    time_point::RowMatrix,
    trajectory::{ResponseLayout, Trial},
};

use self::velocity::VelocityProvider;

pub mod dynamic;
pub mod fixed;
pub mod velocity;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum MeasureError {
    #[display("unknown measure '{spec}'")]
    UnknownMeasure { spec: String },
    #[display("unknown trajectory column '{column}'")]
    UnknownColumn { column: String },
    #[display("malformed measure spec '{spec}': {reason}")]
    MalformedSpec { spec: String, reason: String },
    #[display("invalid argument '{arg}' in measure '{spec}'")]
    InvalidArgument { spec: String, arg: String },
    #[display("measure '{spec}' requires a number-line layout")]
    MissingNumberLine { spec: String },
    #[display("measure '{spec}' was not computed")]
    Unset { spec: String },
}

/// A parsed measure specification.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureSpec {
    pub name: String,
    pub args: BTreeMap<String, f64>,
    /// Evaluated per time point rather than once per trial.
    pub dynamic: bool,
}

impl MeasureSpec {
    /// Prefix that marks a dynamic measure.
    pub const DYNAMIC_MARKER: char = '#';

    /// Parses a spec; only the leading marker makes it dynamic.
    pub fn parse(raw: &str) -> Result<Self, MeasureError> {
        Self::parse_with_default(raw, false)
    }

    /// Parses a spec that is dynamic if it carries the marker or if
    /// `all_dynamic` flags every spec of the call as dynamic.
    ///
    /// ```
    /// use trajreg_analysis::measure::MeasureSpec;
    ///
    /// assert!(!MeasureSpec::parse_with_default("xvel", false).unwrap().dynamic);
    /// assert!(MeasureSpec::parse_with_default("xvel", true).unwrap().dynamic);
    /// assert!(MeasureSpec::parse_with_default("#xvel", false).unwrap().dynamic);
    /// ```
    pub fn parse_with_default(raw: &str, all_dynamic: bool) -> Result<Self, MeasureError> {
        let trimmed = raw.trim();
        let (marked, body) = match trimmed.strip_prefix(Self::DYNAMIC_MARKER) {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        let malformed = |reason: &str| MeasureError::MalformedSpec {
            spec: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let (name, args) = match body.split_once('(') {
            None => (body, BTreeMap::new()),
            Some((name, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| malformed("missing closing parenthesis"))?;
                let mut args = BTreeMap::new();
                for pair in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let (key, value) = pair
                        .split_once('=')
                        .ok_or_else(|| malformed("arguments must be key=value"))?;
                    let value = value
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| malformed("argument values must be numeric"))?;
                    args.insert(key.trim().to_owned(), value);
                }
                (name.trim(), args)
            }
        };
        if name.is_empty() {
            return Err(malformed("empty measure name"));
        }

        Ok(Self {
            name: name.to_owned(),
            args,
            dynamic: marked || all_dynamic,
        })
    }

    #[must_use]
    pub fn arg(&self, key: &str) -> Option<f64> {
        self.args.get(key).copied()
    }

    /// Fails if the spec carries any argument outside `allowed`.
    pub fn expect_args(&self, allowed: &[&str]) -> Result<(), MeasureError> {
        match self.args.keys().find(|key| !allowed.contains(&key.as_str())) {
            Some(key) => Err(MeasureError::InvalidArgument {
                spec: self.to_string(),
                arg: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for MeasureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dynamic {
            write!(f, "{}", Self::DYNAMIC_MARKER)?;
        }
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            let args = self
                .args
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>();
            write!(f, "({})", args.join(", "))?;
        }
        Ok(())
    }
}

/// Data a measure is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct MeasureContext<'a> {
    pub trials: &'a [Trial],
    pub layout: &'a ResponseLayout,
    pub velocity: &'a dyn VelocityProvider,
}

/// Values of one evaluated measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureOutput {
    /// Short name used for the regression's predictor list.
    pub name: String,
    pub description: String,
    /// Trials × time points; a single column for fixed measures.
    pub values: DMatrix<f64>,
}

/// Evaluates dynamic measure specs at resolved rows.
pub trait DynamicMeasureProvider: fmt::Debug + Send + Sync {
    fn evaluate(
        &self,
        context: &MeasureContext<'_>,
        spec: &MeasureSpec,
        rows: &RowMatrix,
    ) -> Result<MeasureOutput, MeasureError>;
}

/// Evaluates fixed measure specs, one value per trial.
pub trait FixedMeasureProvider: fmt::Debug + Send + Sync {
    fn evaluate(
        &self,
        context: &MeasureContext<'_>,
        spec: &MeasureSpec,
    ) -> Result<MeasureOutput, MeasureError>;
}

pub type BoxedDynamicMeasureProvider = Box<dyn DynamicMeasureProvider>;
pub type BoxedFixedMeasureProvider = Box<dyn FixedMeasureProvider>;

/// Fails with [`MeasureError::Unset`] unless `output` has the expected shape.
pub(crate) fn check_shape(
    spec: &MeasureSpec,
    output: MeasureOutput,
    n_trials: usize,
    n_time_points: usize,
) -> Result<MeasureOutput, MeasureError> {
    if output.values.nrows() == n_trials && output.values.ncols() == n_time_points {
        Ok(output)
    } else {
        Err(MeasureError::Unset {
            spec: spec.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marker() {
        let spec = MeasureSpec::parse("  #xvel ").unwrap();
        assert!(spec.dynamic);
        assert_eq!(spec.name, "xvel");

        let spec = MeasureSpec::parse("target").unwrap();
        assert!(!spec.dynamic);
        assert_eq!(spec.name, "target");
    }

    #[test]
    fn test_parse_arguments() {
        let spec = MeasureSpec::parse("#dtheta( smooth = 0.05 , order=2)").unwrap();
        assert_eq!(spec.name, "dtheta");
        assert_eq!(spec.arg("smooth"), Some(0.05));
        assert_eq!(spec.arg("order"), Some(2.0));
        assert_eq!(spec.to_string(), "#dtheta(order=2, smooth=0.05)");
    }

    #[test]
    fn test_parse_malformed() {
        for raw in ["", "#", "dtheta(smooth=0.1", "dtheta(smooth)", "dtheta(smooth=abc)"] {
            let err = MeasureSpec::parse(raw).unwrap_err();
            assert!(
                matches!(err, MeasureError::MalformedSpec { .. }),
                "{raw:?} -> {err}"
            );
        }
    }

    #[test]
    fn test_expect_args() {
        let spec = MeasureSpec::parse("x(bogus=1)").unwrap();
        let err = spec.expect_args(&[]).unwrap_err();
        assert_eq!(
            err,
            MeasureError::InvalidArgument {
                spec: "x(bogus=1)".to_owned(),
                arg: "bogus".to_owned()
            }
        );
        assert!(spec.expect_args(&["bogus"]).is_ok());
    }
}
