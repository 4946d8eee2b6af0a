//! Per-time-point regression over movement trajectories
//!
//! This crate runs linear, logistic and correlation regressions over recorded
//! finger or mouse trajectories. Each trial carries a time-sampled trajectory;
//! a regression is repeated at many *time points* (rows, times since trial
//! start, or y coordinates) with predictors and a dependent variable that are
//! either fixed per trial or read from the trajectory at each time point.
//!
//! # Overview
//!
//! Data flows through five layers:
//!
//! 1. **Trajectory access** ([`trajectory`]): trials, their columns, and
//!    row-count bounds
//! 2. **Measures** ([`measure`]): named quantities parsed from specs such as
//!    `#xvel` or `#dtheta(smooth=0.02)`, evaluated by pluggable providers
//! 3. **Time points** ([`time_point`]): generation and per-trial row resolution,
//!    always clamped into each trial
//! 4. **Tensor assembly** ([`tensor`]): predictor and dependent tensors, trial
//!    selection and the inclusion mask
//! 5. **Regression loop** ([`regression`]): one solver call per time point,
//!    aggregated into a [`result::RegressionResult`]
//!
//! Options and caller-supplied hooks live in [`config`]; trial averaging in
//! [`consolidate`]. The solver itself comes from `trajreg-stats`.
//!
//! # Example
//!
//! ```no_run
//! use trajreg_analysis::{
//!     config::{RegressionConfig, RegressionOptions},
//!     regression::regress,
//!     trajectory::Experiment,
//! };
//! use trajreg_stats::regression::RegressionFamily;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let experiment: Experiment = serde_json::from_str(&std::fs::read_to_string("s01.json")?)?;
//! let config = RegressionConfig::new(RegressionOptions {
//!     delta_time: Some(0.05),
//!     ..RegressionOptions::default()
//! })
//! .with_trial_filter(|trial| trial.response.is_some());
//!
//! let predictors = ["#xvel", "#iep"];
//! let result = regress(&experiment, RegressionFamily::Ols, "target", &predictors, &config)?;
//! for (time, r2) in result.times.iter().zip(&result.r_squared) {
//!     println!("{time:.2}s: R² = {r2:.3}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consolidate;
pub mod measure;
pub mod regression;
pub mod result;
pub mod tensor;
pub mod time_point;
pub mod trajectory;

#[cfg(test)]
mod testing;

/// Any fatal error of a regression call.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum RegressionError {
    #[display("{_0}")]
    Measure(measure::MeasureError),
    #[display("{_0}")]
    Config(config::ConfigError),
}
