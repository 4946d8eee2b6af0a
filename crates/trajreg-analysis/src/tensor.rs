//! Predictor and dependent-variable tensor assembly
//!
//! [`assemble`] turns an experiment, measure specs and a configuration into the
//! numeric input of the regression loop:
//!
//! 1. Select the working trials (averaging, trial filters, consolidator) and
//!    drop trials the row resolver rejects.
//! 2. Generate time points and resolve them to rows. Time points that lie past
//!    the end of every trial are dropped (unless disabled); the remaining rows
//!    are clamped into each trial.
//! 3. Evaluate every predictor and the dependent variable into a
//!    [`MeasureTensor`]. Fixed measures are stored once and broadcast across
//!    time points.
//! 4. Drop trials that have a `NaN` predictor or dependent value at every time
//!    point, then check the trial count against the predictor count.
//! 5. Build the [`InclusionMask`]: `NaN`-free cells, narrowed by the
//!    time-point filters in order.

use std::{
    fs::File,
    io::{self, BufWriter, Write as _},
    path::Path,
};

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::debug;

use crate::{
    RegressionError,
    config::{ConfigError, RegressionConfig},
    consolidate::average_by_target,
    measure::{MeasureContext, MeasureError, MeasureOutput, MeasureSpec},
    time_point::{RowMatrix, TimePointKind, TimePoints},
    trajectory::{Experiment, Trial},
};

/// Name of the synthetic intercept predictor.
pub const INTERCEPT_NAME: &str = "const";

/// Trials × measures × time points.
///
/// When the tensor is not time-varying only one plane is stored and every
/// time point reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureTensor {
    n_trials: usize,
    n_measures: usize,
    n_time_points: usize,
    time_varying: bool,
    /// Indexed by stored plane, then measure, then trial.
    values: Vec<f64>,
}

impl MeasureTensor {
    /// A tensor filled with `NaN`.
    #[must_use]
    pub fn new(
        n_trials: usize,
        n_measures: usize,
        n_time_points: usize,
        time_varying: bool,
    ) -> Self {
        let planes = if time_varying { n_time_points } else { 1 };
        Self {
            n_trials,
            n_measures,
            n_time_points,
            time_varying,
            values: vec![f64::NAN; planes * n_measures * n_trials],
        }
    }

    /// `(trials, measures, time points)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_trials, self.n_measures, self.n_time_points)
    }

    #[must_use]
    pub fn is_time_varying(&self) -> bool {
        self.time_varying
    }

    /// Number of planes held in storage: the time-point count, or 1.
    #[must_use]
    pub fn stored_time_points(&self) -> usize {
        if self.time_varying { self.n_time_points } else { 1 }
    }

    fn index(&self, trial: usize, measure: usize, time_point: usize) -> usize {
        let plane = if self.time_varying { time_point } else { 0 };
        (plane * self.n_measures + measure) * self.n_trials + trial
    }

    #[must_use]
    pub fn get(&self, trial: usize, measure: usize, time_point: usize) -> f64 {
        self.values[self.index(trial, measure, time_point)]
    }

    /// Values of one measure at one time point, for every trial.
    #[must_use]
    pub fn column(&self, measure: usize, time_point: usize) -> &[f64] {
        let start = self.index(0, measure, time_point);
        &self.values[start..start + self.n_trials]
    }

    /// Writes a trials × time-points (or trials × 1) matrix into `measure`.
    ///
    /// A single column is replicated over every stored plane.
    ///
    /// # Panics
    ///
    /// Panics if `values` has several columns but the tensor is not
    /// time-varying, or if the dimensions do not match.
    pub fn set_measure(&mut self, measure: usize, values: &DMatrix<f64>) {
        assert_eq!(values.nrows(), self.n_trials, "one row per trial");
        let broadcast = values.ncols() == 1;
        assert!(
            broadcast || (self.time_varying && values.ncols() == self.n_time_points),
            "time-varying values need a time-varying tensor"
        );
        for plane in 0..self.stored_time_points() {
            let column = if broadcast { 0 } else { plane };
            for trial in 0..self.n_trials {
                let index = self.index(trial, measure, plane);
                self.values[index] = values[(trial, column)];
            }
        }
    }

    /// Matrix of the `trials` rows at `time_point`: one column per measure.
    #[must_use]
    pub fn plane(&self, trials: &[usize], time_point: usize) -> DMatrix<f64> {
        DMatrix::from_fn(trials.len(), self.n_measures, |row, measure| {
            self.get(trials[row], measure, time_point)
        })
    }

    /// The first measure of the `trials` rows at `time_point`.
    #[must_use]
    pub fn vector(&self, trials: &[usize], time_point: usize) -> DVector<f64> {
        DVector::from_fn(trials.len(), |row, _| self.get(trials[row], 0, time_point))
    }

    /// Keeps only the trials at `indices`.
    #[must_use]
    pub fn select_trials(&self, indices: &[usize]) -> Self {
        let mut selected = Self::new(
            indices.len(),
            self.n_measures,
            self.n_time_points,
            self.time_varying,
        );
        for plane in 0..self.stored_time_points() {
            for measure in 0..self.n_measures {
                for (new, &old) in indices.iter().enumerate() {
                    let index = selected.index(new, measure, plane);
                    selected.values[index] = self.get(old, measure, plane);
                }
            }
        }
        selected
    }
}

/// Trials × time points: whether a trial enters a time point's regression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InclusionMask {
    n_trials: usize,
    n_time_points: usize,
    included: Vec<bool>,
}

impl InclusionMask {
    #[must_use]
    pub fn get(&self, trial: usize, time_point: usize) -> bool {
        self.included[trial * self.n_time_points + time_point]
    }

    /// Indices of the trials included at `time_point`, in trial order.
    #[must_use]
    pub fn included_trials(&self, time_point: usize) -> Vec<usize> {
        (0..self.n_trials)
            .filter(|&trial| self.get(trial, time_point))
            .collect()
    }

    #[must_use]
    pub fn included_count(&self, time_point: usize) -> usize {
        (0..self.n_trials)
            .filter(|&trial| self.get(trial, time_point))
            .count()
    }
}

/// Everything the regression loop needs.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledTensors {
    /// Working trials after selection and the all-`NaN` drop.
    #[serde(skip)]
    pub trials: Vec<Trial>,
    pub trial_nums: Vec<usize>,
    pub time_points: TimePoints,
    pub rows: RowMatrix,
    pub predictors: MeasureTensor,
    /// Intercept first.
    pub predictor_names: Vec<String>,
    /// Intercept first.
    pub predictor_descriptions: Vec<String>,
    pub dependent: MeasureTensor,
    pub dependent_name: String,
    pub dependent_description: String,
    pub inclusion: InclusionMask,
}

/// Builds the regression input.
pub fn assemble(
    experiment: &Experiment,
    predictors: &[MeasureSpec],
    dependent: &MeasureSpec,
    config: &RegressionConfig,
) -> Result<AssembledTensors, RegressionError> {
    config.validate()?;
    let options = &config.options;
    let any_dynamic = dependent.dynamic || predictors.iter().any(|spec| spec.dynamic);
    if !any_dynamic && !config.time_point_filters.is_empty() {
        return Err(ConfigError::FiltersOnFixedRegression.into());
    }

    let source = options.time_point_source()?;
    let kind = source.as_ref().map_or(TimePointKind::Row, |source| source.kind());
    let resolver = config.row_resolver(kind);
    let trials = select_trials(experiment, config)
        .into_iter()
        .filter(|trial| resolver.accepts(trial))
        .collect::<Vec<_>>();
    if trials.is_empty() {
        return Err(ConfigError::NoTrials.into());
    }

    let mut time_points = TimePoints::generate(source.as_ref(), &trials, options.max_time);
    let mut raw_rows = Vec::with_capacity(trials.len());
    for trial in &trials {
        let rows = resolver.resolve(&time_points.values, trial);
        if rows.len() != time_points.len() {
            return Err(ConfigError::ResolvedRowCount {
                trial_num: trial.trial_num,
                expected: time_points.len(),
                found: rows.len(),
            }
            .into());
        }
        raw_rows.push(rows);
    }
    if options.drop_unreachable_time_points {
        let reachable = (0..time_points.len())
            .filter(|&tp| {
                trials
                    .iter()
                    .zip(&raw_rows)
                    .any(|(trial, rows)| (1..=trial.row_count()).contains(&rows[tp]))
            })
            .collect::<Vec<_>>();
        if reachable.len() < time_points.len() {
            debug!(
                dropped = time_points.len() - reachable.len(),
                "dropping unreachable time points"
            );
            time_points = time_points.select(&reachable);
            for rows in &mut raw_rows {
                *rows = reachable.iter().map(|&tp| rows[tp]).collect();
            }
        }
    }
    if time_points.is_empty() {
        return Err(ConfigError::NoTimePoints.into());
    }
    let rows = RowMatrix::from_raw(&trials, &raw_rows);
    let n_time_points = time_points.len();

    let context = MeasureContext {
        trials: &trials,
        layout: &experiment.layout,
        velocity: config.velocity.as_ref(),
    };
    let mut predictor_tensor = MeasureTensor::new(
        trials.len(),
        predictors.len(),
        n_time_points,
        predictors.iter().any(|spec| spec.dynamic),
    );
    let mut predictor_names = vec![INTERCEPT_NAME.to_owned()];
    let mut predictor_descriptions = vec!["intercept".to_owned()];
    for (index, spec) in predictors.iter().enumerate() {
        let output = evaluate(&context, config, spec, &rows)?;
        predictor_tensor.set_measure(index, &output.values);
        predictor_names.push(output.name);
        predictor_descriptions.push(output.description);
    }

    let output = evaluate(&context, config, dependent, &rows)?;
    let mut dependent_tensor =
        MeasureTensor::new(trials.len(), 1, n_time_points, dependent.dynamic);
    dependent_tensor.set_measure(0, &output.values);

    let valid = |trial: usize, tp: usize, predictors: &MeasureTensor, dependent: &MeasureTensor| {
        !dependent.get(trial, 0, tp).is_nan()
            && (0..predictors.shape().1).all(|measure| !predictors.get(trial, measure, tp).is_nan())
    };
    let keep = (0..trials.len())
        .filter(|&trial| {
            (0..n_time_points).any(|tp| valid(trial, tp, &predictor_tensor, &dependent_tensor))
        })
        .collect::<Vec<_>>();
    let (trials, rows, predictor_tensor, dependent_tensor) = if keep.len() < trials.len() {
        debug!(dropped = trials.len() - keep.len(), "dropping trials without valid values");
        (
            keep.iter().map(|&i| trials[i].clone()).collect::<Vec<_>>(),
            rows.select_trials(&keep),
            predictor_tensor.select_trials(&keep),
            dependent_tensor.select_trials(&keep),
        )
    } else {
        (trials, rows, predictor_tensor, dependent_tensor)
    };

    let parameters = predictors.len() + 1;
    #[expect(clippy::cast_precision_loss)]
    let enough_trials =
        trials.len() as f64 >= parameters as f64 * options.min_sample_to_predictor_ratio;
    if trials.is_empty() || !enough_trials {
        return Err(ConfigError::TooFewTrials {
            trials: trials.len(),
            parameters,
            ratio: options.min_sample_to_predictor_ratio,
        }
        .into());
    }

    let mut included = Vec::with_capacity(trials.len() * n_time_points);
    for trial in 0..trials.len() {
        included.extend(
            (0..n_time_points).map(|tp| valid(trial, tp, &predictor_tensor, &dependent_tensor)),
        );
    }
    for filter in &config.time_point_filters {
        for (trial_index, trial) in trials.iter().enumerate() {
            for tp in 0..n_time_points {
                let cell = &mut included[trial_index * n_time_points + tp];
                if *cell {
                    *cell = filter(trial, rows.get(trial_index, tp));
                }
            }
        }
    }
    let inclusion = InclusionMask {
        n_trials: trials.len(),
        n_time_points,
        included,
    };

    let tensors = AssembledTensors {
        trial_nums: trials.iter().map(|trial| trial.trial_num).collect(),
        trials,
        time_points,
        rows,
        predictors: predictor_tensor,
        predictor_names,
        predictor_descriptions,
        dependent: dependent_tensor,
        dependent_name: output.name,
        dependent_description: output.description,
        inclusion,
    };
    if let Some(path) = &options.save_assembled_tensors_to {
        save(&tensors, path)?;
    }
    Ok(tensors)
}

/// Working trial set before row resolution.
fn select_trials(experiment: &Experiment, config: &RegressionConfig) -> Vec<Trial> {
    let base = if config.options.use_averaged_trials {
        experiment
            .averaged_trials
            .clone()
            .unwrap_or_else(|| average_by_target(&experiment.trials))
    } else {
        experiment.trials.clone()
    };
    let filtered = base
        .into_iter()
        .filter(|trial| config.trial_filters.iter().all(|filter| filter(trial)))
        .collect::<Vec<_>>();
    match &config.consolidator {
        Some(consolidator) => consolidator.apply(&filtered),
        None => filtered,
    }
}

fn evaluate(
    context: &MeasureContext<'_>,
    config: &RegressionConfig,
    spec: &MeasureSpec,
    rows: &RowMatrix,
) -> Result<MeasureOutput, MeasureError> {
    let (output, n_columns) = if spec.dynamic {
        (
            config.dynamic_measures.evaluate(context, spec, rows)?,
            rows.n_time_points(),
        )
    } else {
        (config.fixed_measures.evaluate(context, spec)?, 1)
    };
    if output.values.shape() == (context.trials.len(), n_columns) {
        Ok(output)
    } else {
        Err(MeasureError::Unset {
            spec: spec.to_string(),
        })
    }
}

fn save(tensors: &AssembledTensors, path: &Path) -> Result<(), ConfigError> {
    let to_error = |source: io::Error| ConfigError::SaveTensors {
        path: path.to_owned(),
        source,
    };
    let file = File::create(path).map_err(to_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, tensors).map_err(|err| to_error(err.into()))?;
    writer.flush().map_err(to_error)?;
    debug!(path = %path.display(), "saved assembled tensors");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RegressionOptions,
        measure::DynamicMeasureProvider,
        testing::{experiment, trial_with},
        time_point::RowResolver,
        trajectory::TrajColumn,
    };

    fn spec(raw: &str) -> MeasureSpec {
        MeasureSpec::parse(raw).unwrap()
    }

    fn row_value(row: usize) -> f64 {
        f64::from(u32::try_from(row).unwrap())
    }

    /// Trials `1..=n` with target `i`, length `5 + i % 3` and `xvel = target * row`.
    fn trials(n: usize) -> Vec<Trial> {
        (1..=n)
            .map(|i| {
                let target = row_value(i);
                trial_with(i, target, 5 + i % 3, |column, row| match column {
                    TrajColumn::XVel => target * row_value(row),
                    TrajColumn::Y => row_value(row),
                    _ => 0.0,
                })
            })
            .collect()
    }

    #[test]
    fn test_dynamic_predictor_fixed_dependent_shapes() {
        let experiment = experiment(trials(12));
        let config = RegressionConfig::new(RegressionOptions {
            explicit_rows: Some(vec![1, 2, 3]),
            ..RegressionOptions::default()
        });
        let tensors = assemble(&experiment, &[spec("#xvel")], &spec("target"), &config).unwrap();

        assert_eq!(tensors.predictors.shape(), (12, 1, 3));
        assert!(tensors.predictors.is_time_varying());
        assert_eq!(tensors.predictors.stored_time_points(), 3);
        assert!(!tensors.dependent.is_time_varying());
        assert_eq!(tensors.dependent.stored_time_points(), 1);
        assert_eq!(tensors.predictor_names, ["const", "xvel"]);
        assert_eq!(tensors.predictor_descriptions[0], "intercept");
        assert_eq!(tensors.dependent.get(4, 0, 2), 5.0);
        assert_eq!(tensors.predictors.get(4, 0, 2), 15.0);
    }

    #[test]
    fn test_unreachable_time_points_dropped() {
        let experiment = experiment(trials(12));
        // longest trial has 7 rows
        let options = RegressionOptions {
            explicit_rows: Some(vec![2, 7, 9, 20]),
            ..RegressionOptions::default()
        };
        let config = RegressionConfig::new(options.clone());
        let tensors = assemble(&experiment, &[spec("#xvel")], &spec("target"), &config).unwrap();
        assert_eq!(tensors.time_points.values, [2.0, 7.0]);

        let config = RegressionConfig::new(RegressionOptions {
            drop_unreachable_time_points: false,
            ..options
        });
        let tensors = assemble(&experiment, &[spec("#xvel")], &spec("target"), &config).unwrap();
        assert_eq!(tensors.time_points.len(), 4);
        for trial in 0..tensors.trials.len() {
            for tp in 0..4 {
                assert!(tensors.rows.get(trial, tp) <= tensors.trials[trial].row_count());
            }
        }
    }

    #[test]
    fn test_nan_masks_only_affected_time_point() {
        let mut trials = trials(12);
        trials[3].trajectory.x_vel[1] = f64::NAN;
        let config = RegressionConfig::new(RegressionOptions {
            explicit_rows: Some(vec![1, 2, 3]),
            ..RegressionOptions::default()
        });
        let tensors =
            assemble(&experiment(trials), &[spec("#xvel")], &spec("target"), &config).unwrap();
        assert!(tensors.inclusion.get(3, 0));
        assert!(!tensors.inclusion.get(3, 1));
        assert!(tensors.inclusion.get(3, 2));
        assert_eq!(tensors.inclusion.included_count(1), 11);
        assert_eq!(tensors.inclusion.included_trials(1).len(), 11);
    }

    #[test]
    fn test_all_nan_trial_dropped() {
        let mut trials = trials(12);
        trials[0].trajectory.x_vel.fill(f64::NAN);
        let config = RegressionConfig::default();
        let tensors =
            assemble(&experiment(trials), &[spec("#xvel")], &spec("target"), &config).unwrap();
        assert_eq!(tensors.trials.len(), 11);
        assert_eq!(tensors.trial_nums[0], 2);
        assert_eq!(tensors.rows.n_trials(), 11);
    }

    #[test]
    fn test_too_few_trials_is_fatal() {
        let config = RegressionConfig::default();
        // 2 parameters * ratio 3 = 6 trials required
        let err = assemble(&experiment(trials(5)), &[spec("#xvel")], &spec("target"), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            RegressionError::Config(ConfigError::TooFewTrials {
                trials: 5,
                parameters: 2,
                ..
            })
        ));
        assert!(
            assemble(&experiment(trials(6)), &[spec("#xvel")], &spec("target"), &config).is_ok()
        );
    }

    #[test]
    fn test_time_point_filters_applied_in_order() {
        let config = RegressionConfig::new(RegressionOptions {
            explicit_rows: Some(vec![1, 2, 3]),
            ..RegressionOptions::default()
        })
        .with_time_point_filter(|trial, row| !(trial.trial_num == 1 && row == 2))
        .with_time_point_filter(|trial, _| trial.trial_num != 2);
        let tensors =
            assemble(&experiment(trials(12)), &[spec("#xvel")], &spec("target"), &config).unwrap();
        assert!(tensors.inclusion.get(0, 0));
        assert!(!tensors.inclusion.get(0, 1));
        assert!(!tensors.inclusion.get(1, 0));
        assert_eq!(tensors.inclusion.included_count(1), 10);
    }

    #[test]
    fn test_time_point_filters_rejected_for_fixed_regression() {
        let config = RegressionConfig::default().with_time_point_filter(|_, _| true);
        let err = assemble(&experiment(trials(12)), &[spec("target")], &spec("trial_num"), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            RegressionError::Config(ConfigError::FiltersOnFixedRegression)
        ));
    }

    #[test]
    fn test_unknown_measure_is_fatal() {
        let err = assemble(
            &experiment(trials(12)),
            &[spec("#warp")],
            &spec("target"),
            &RegressionConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unknown measure '#warp'");
    }

    #[test]
    fn test_group_by_y_coordinate_rows() {
        let config = RegressionConfig::new(RegressionOptions {
            group_by_y_coordinate: Some(1.0),
            ..RegressionOptions::default()
        });
        let tensors =
            assemble(&experiment(trials(12)), &[spec("#y")], &spec("target"), &config).unwrap();
        // y = row, max y over trials = 7
        assert_eq!(tensors.time_points.values, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        for (index, trial) in tensors.trials.iter().enumerate() {
            for tp in 0..7 {
                assert_eq!(tensors.rows.get(index, tp), (tp + 1).min(trial.row_count()));
            }
        }
    }

    #[test]
    fn test_offset_attribute_excludes_trials_without_it() {
        let mut trials = trials(12);
        for trial in trials.iter_mut().skip(2) {
            trial.custom.insert("onset".to_owned(), 2.0);
        }
        let config = RegressionConfig::new(RegressionOptions {
            explicit_rows: Some(vec![1, 2]),
            per_trial_offset_attribute: Some("onset".to_owned()),
            ..RegressionOptions::default()
        });
        let tensors =
            assemble(&experiment(trials), &[spec("#xvel")], &spec("target"), &config).unwrap();
        assert_eq!(tensors.trials.len(), 10);
        assert_eq!(tensors.rows.trial_rows(0), [2, 3]);
    }

    #[test]
    fn test_save_assembled_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tensors.json");
        let config = RegressionConfig::new(RegressionOptions {
            explicit_rows: Some(vec![1, 2]),
            save_assembled_tensors_to: Some(path.clone()),
            ..RegressionOptions::default()
        });
        assemble(&experiment(trials(12)), &[spec("#xvel")], &spec("target"), &config).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["predictor_names"], serde_json::json!(["const", "xvel"]));
        assert_eq!(saved["trial_nums"].as_array().unwrap().len(), 12);
        assert!(saved.get("trials").is_none());
    }

    /// Returns one column however many time points are requested.
    #[derive(Debug)]
    struct SingleColumnMeasures;

    impl DynamicMeasureProvider for SingleColumnMeasures {
        fn evaluate(
            &self,
            context: &MeasureContext<'_>,
            spec: &MeasureSpec,
            _rows: &RowMatrix,
        ) -> Result<MeasureOutput, MeasureError> {
            Ok(MeasureOutput {
                name: spec.name.clone(),
                description: spec.name.clone(),
                values: DMatrix::zeros(context.trials.len(), 1),
            })
        }
    }

    #[test]
    fn test_unset_measure_is_fatal() {
        let config = RegressionConfig::new(RegressionOptions {
            explicit_rows: Some(vec![1, 2, 3]),
            ..RegressionOptions::default()
        })
        .with_dynamic_measures(SingleColumnMeasures);
        let err = assemble(&experiment(trials(12)), &[spec("#xvel")], &spec("target"), &config)
            .unwrap_err();
        assert!(matches!(
            &err,
            RegressionError::Measure(MeasureError::Unset { spec }) if spec == "#xvel"
        ));
    }

    /// Resolves every trial to a single row.
    #[derive(Debug)]
    struct FirstRowOnly;

    impl RowResolver for FirstRowOnly {
        fn resolve(&self, _time_points: &[f64], _trial: &Trial) -> Vec<usize> {
            vec![1]
        }
    }

    #[test]
    fn test_resolver_row_count_mismatch_is_an_error() {
        for drop_unreachable_time_points in [true, false] {
            let config = RegressionConfig::new(RegressionOptions {
                explicit_rows: Some(vec![1, 2, 3]),
                drop_unreachable_time_points,
                ..RegressionOptions::default()
            })
            .with_row_resolver(FirstRowOnly);
            let err = assemble(
                &experiment(trials(12)),
                &[spec("#xvel")],
                &spec("target"),
                &config,
            )
            .unwrap_err();
            assert!(matches!(
                err,
                RegressionError::Config(ConfigError::ResolvedRowCount {
                    trial_num: 1,
                    expected: 3,
                    found: 1
                })
            ));
        }
    }
}
