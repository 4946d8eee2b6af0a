//! Regression results.
//!
//! A [`RegressionResult`] holds one entry per time point in every per-time-point
//! array, including time points that could not be regressed (those hold `NaN`).
//! It serializes with `NaN` written as `null`.

use std::collections::BTreeMap;

use serde::Serialize;
use trajreg_stats::regression::{RegressionFamily, SolverOutput};

use crate::{
    tensor::AssembledTensors,
    time_point::{TimePointKind, TimePointSource, TimePoints},
    trajectory::{TrajColumn, Trial},
};

/// Statistics of one predictor, one entry per time point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictorStats {
    pub name: String,
    pub description: String,
    pub coefficients: Vec<f64>,
    /// `coefficient / sd(dependent) * sd(predictor)`; 0 for the intercept.
    pub standardized_coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub p_values: Vec<f64>,
    /// R² contribution of the predictor.
    pub r_squared: Vec<f64>,
    pub adj_r_squared: Vec<f64>,
}

impl PredictorStats {
    fn new(name: String, description: String, n_time_points: usize) -> Self {
        let nan = vec![f64::NAN; n_time_points];
        Self {
            name,
            description,
            coefficients: nan.clone(),
            standardized_coefficients: nan.clone(),
            std_errors: nan.clone(),
            p_values: nan.clone(),
            r_squared: nan.clone(),
            adj_r_squared: nan,
        }
    }
}

/// How the result was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionProvenance {
    pub predictor_specs: Vec<String>,
    pub dependent_spec: String,
    pub dynamic_predictors: Vec<bool>,
    pub dynamic_dependent: bool,
    pub used_averaged_trials: bool,
    pub consolidator: Option<String>,
    pub time_point_source: Option<TimePointSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionResult {
    pub subject_id: String,
    pub family: RegressionFamily,
    pub dependent: String,
    pub dependent_description: String,
    pub time_points: TimePoints,
    /// Absolute time of each time point, in seconds.
    pub times: Vec<f64>,
    pub r_squared: Vec<f64>,
    pub p_values: Vec<f64>,
    pub df: Vec<f64>,
    pub mse: Vec<f64>,
    /// Trials that entered each time point's regression.
    pub included_counts: Vec<usize>,
    /// Intercept first.
    pub predictors: Vec<PredictorStats>,
    /// Full solver diagnostics per time point, when requested.
    pub diagnostics: Option<Vec<Option<BTreeMap<String, f64>>>>,
    pub provenance: RegressionProvenance,
}

impl RegressionResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.time_points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time_points.is_empty()
    }

    #[must_use]
    pub fn predictor(&self, name: &str) -> Option<&PredictorStats> {
        self.predictors.iter().find(|stats| stats.name == name)
    }

    pub fn predictor_names(&self) -> impl Iterator<Item = &str> {
        self.predictors.iter().map(|stats| stats.name.as_str())
    }
}

/// Per-time-point result writer used by the regression loop.
#[derive(Debug)]
pub(crate) struct ResultAggregator {
    r_squared: Vec<f64>,
    p_values: Vec<f64>,
    df: Vec<f64>,
    mse: Vec<f64>,
    included_counts: Vec<usize>,
    predictors: Vec<PredictorStats>,
    diagnostics: Option<Vec<Option<BTreeMap<String, f64>>>>,
}

impl ResultAggregator {
    pub(crate) fn new(
        names: &[String],
        descriptions: &[String],
        n_time_points: usize,
        full_diagnostics: bool,
    ) -> Self {
        let nan = vec![f64::NAN; n_time_points];
        Self {
            r_squared: nan.clone(),
            p_values: nan.clone(),
            df: nan.clone(),
            mse: nan,
            included_counts: vec![0; n_time_points],
            predictors: names
                .iter()
                .zip(descriptions)
                .map(|(name, description)| {
                    PredictorStats::new(name.clone(), description.clone(), n_time_points)
                })
                .collect(),
            diagnostics: full_diagnostics.then(|| vec![None; n_time_points]),
        }
    }

    /// Records a time point that was not regressed; its statistics stay `NaN`.
    pub(crate) fn mark_invalid(&mut self, time_point: usize, included: usize) {
        self.included_counts[time_point] = included;
    }

    /// Records a solver output.
    ///
    /// `predictor_sd` has one entry per predictor (without the intercept).
    pub(crate) fn fold(
        &mut self,
        time_point: usize,
        included: usize,
        output: SolverOutput,
        dependent_sd: f64,
        predictor_sd: &[f64],
    ) {
        self.included_counts[time_point] = included;
        self.r_squared[time_point] = output.r_squared;
        self.p_values[time_point] = output.p_value;
        self.df[time_point] = output.df;
        self.mse[time_point] = output.mse.unwrap_or(f64::NAN);
        for (index, (stats, coefficient)) in
            self.predictors.iter_mut().zip(&output.coefficients).enumerate()
        {
            stats.coefficients[time_point] = coefficient.estimate;
            stats.standardized_coefficients[time_point] = match index {
                0 => 0.0,
                _ => coefficient.estimate / dependent_sd * predictor_sd[index - 1],
            };
            stats.std_errors[time_point] = coefficient.std_error;
            stats.p_values[time_point] = coefficient.p_value;
            stats.r_squared[time_point] = coefficient.r_squared;
            stats.adj_r_squared[time_point] = coefficient.adj_r_squared;
        }
        if let Some(diagnostics) = &mut self.diagnostics {
            diagnostics[time_point] = output.diagnostics;
        }
    }

    pub(crate) fn finish(
        self,
        subject_id: &str,
        family: RegressionFamily,
        tensors: &AssembledTensors,
        provenance: RegressionProvenance,
    ) -> RegressionResult {
        RegressionResult {
            subject_id: subject_id.to_owned(),
            family,
            dependent: tensors.dependent_name.clone(),
            dependent_description: tensors.dependent_description.clone(),
            time_points: tensors.time_points.clone(),
            times: time_labels(tensors),
            r_squared: self.r_squared,
            p_values: self.p_values,
            df: self.df,
            mse: self.mse,
            included_counts: self.included_counts,
            predictors: self.predictors,
            diagnostics: self.diagnostics,
            provenance,
        }
    }
}

/// Absolute time of every time point.
///
/// Row and time-based time points read the longest trial's clock (a time
/// point's value is its own time for time-based points). Y-coordinate time
/// points differ in time per trial and report the mean over the trials.
fn time_labels(tensors: &AssembledTensors) -> Vec<f64> {
    let trials = &tensors.trials;
    let n_time_points = tensors.time_points.len();
    match tensors.time_points.kind {
        TimePointKind::Time => tensors.time_points.values.clone(),
        TimePointKind::Row => {
            let longest = trials
                .iter()
                .enumerate()
                .max_by_key(|(_, trial)| trial.row_count());
            match longest {
                Some((index, trial)) => tensors
                    .rows
                    .trial_rows(index)
                    .iter()
                    .map(|&row| clock(trial, row))
                    .collect(),
                None => vec![f64::NAN; n_time_points],
            }
        }
        TimePointKind::YCoordinate => (0..n_time_points)
            .map(|tp| {
                let times = trials
                    .iter()
                    .enumerate()
                    .map(|(index, trial)| clock(trial, tensors.rows.get(index, tp)))
                    .filter(|time| !time.is_nan())
                    .collect::<Vec<_>>();
                #[expect(clippy::cast_precision_loss)]
                let count = times.len() as f64;
                if times.is_empty() {
                    f64::NAN
                } else {
                    times.iter().sum::<f64>() / count
                }
            })
            .collect(),
    }
}

fn clock(trial: &Trial, row: usize) -> f64 {
    trial.trajectory.value(TrajColumn::AbsTime, row)
}
