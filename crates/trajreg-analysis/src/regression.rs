//! Per-time-point regression loop.
//!
//! [`regress`] assembles the tensors (see [`tensor`](crate::tensor)) and then,
//! for each time point in order:
//!
//! 1. selects the trials the inclusion mask admits,
//! 2. skips the time point (leaving `NaN` statistics) when fewer than
//!    `(predictors + 1) × min_sample_to_predictor_ratio` trials remain,
//! 3. otherwise hands the slice to the configured solver and folds its output
//!    into the result, including standardized coefficients.
//!
//! A solver failure at one time point is logged and leaves that time point
//! `NaN`; it does not fail the call.

use tracing::{debug, info, warn};
use trajreg_stats::{descriptive::nan_std_dev, regression::RegressionFamily};

use crate::{
    RegressionError,
    config::RegressionConfig,
    measure::MeasureSpec,
    result::{RegressionProvenance, RegressionResult, ResultAggregator},
    tensor::{self, MeasureTensor},
    trajectory::Experiment,
};

/// Runs one regression per time point.
///
/// Specs follow the `[#]name[(key=value, ...)]` syntax; with
/// [`all_dynamic`](crate::config::RegressionOptions::all_dynamic) set every spec
/// is dynamic.
///
/// # Example
///
/// ```
/// use trajreg_analysis::{
///     config::{RegressionConfig, RegressionOptions},
///     regression::regress,
///     trajectory::{Experiment, ResponseLayout, Trajectory, Trial},
/// };
/// use trajreg_stats::regression::RegressionFamily;
///
/// let trials = (1..=10)
///     .map(|i| {
///         let target = f64::from(i);
///         Trial {
///             trial_num: i as usize,
///             target,
///             response: None,
///             expected_response: None,
///             movement_time: 0.5,
///             sampling_rate: 0.01,
///             custom: [("score".to_owned(), 2.0 * target)].into(),
///             trajectory: Trajectory::from_fn(5, |_, _| 0.0),
///         }
///     })
///     .collect();
/// let experiment = Experiment {
///     subject_id: "s01".to_owned(),
///     layout: ResponseLayout::Discrete,
///     trials,
///     averaged_trials: None,
/// };
/// let config = RegressionConfig::new(RegressionOptions {
///     explicit_rows: Some(vec![1]),
///     ..RegressionOptions::default()
/// });
///
/// let result = regress(&experiment, RegressionFamily::Ols, "custom.score", &["target"], &config)?;
/// let slope = &result.predictor("target").unwrap().coefficients;
/// assert!((slope[0] - 2.0).abs() < 1e-9);
/// # Ok::<(), trajreg_analysis::RegressionError>(())
/// ```
pub fn regress<S>(
    experiment: &Experiment,
    family: RegressionFamily,
    dependent: &str,
    predictors: &[S],
    config: &RegressionConfig,
) -> Result<RegressionResult, RegressionError>
where
    S: AsRef<str>,
{
    let options = &config.options;
    let dependent_spec = MeasureSpec::parse_with_default(dependent, options.all_dynamic)?;
    let predictor_specs = predictors
        .iter()
        .map(|raw| MeasureSpec::parse_with_default(raw.as_ref(), options.all_dynamic))
        .collect::<Result<Vec<_>, _>>()?;

    let tensors = tensor::assemble(experiment, &predictor_specs, &dependent_spec, config)?;
    let n_time_points = tensors.time_points.len();
    info!(
        "{}",
        options.status_message(
            &experiment.subject_id,
            tensors.trials.len(),
            n_time_points,
            family,
            config.progress,
        )
    );

    let predictor_sd = plane_std_devs(&tensors.predictors);
    let dependent_sd = plane_std_devs(&tensors.dependent);
    let parameters = predictor_specs.len() + 1;
    #[expect(clippy::cast_precision_loss)]
    let min_trials = parameters as f64 * options.min_sample_to_predictor_ratio;
    let solver_options = config.solver_options();

    let mut aggregator = ResultAggregator::new(
        &tensors.predictor_names,
        &tensors.predictor_descriptions,
        n_time_points,
        options.emit_full_diagnostics,
    );
    for tp in 0..n_time_points {
        let included = tensors.inclusion.included_trials(tp);
        #[expect(clippy::cast_precision_loss)]
        let too_few = included.is_empty() || (included.len() as f64) < min_trials;
        if too_few {
            debug!(time_point = tp, included = included.len(), "too few trials, skipped");
            aggregator.mark_invalid(tp, included.len());
            continue;
        }

        let x = tensors.predictors.plane(&included, tp);
        let y = tensors.dependent.vector(&included, tp);
        debug!(time_point = tp, included = included.len(), "regressing");
        match config.solver.solve(family, &x, &y, &solver_options) {
            Ok(output) if output.coefficients.len() == parameters => {
                let predictor_plane = stored_plane(&tensors.predictors, tp);
                let dependent_plane = stored_plane(&tensors.dependent, tp);
                aggregator.fold(
                    tp,
                    included.len(),
                    output,
                    dependent_sd[dependent_plane][0],
                    &predictor_sd[predictor_plane],
                );
            }
            Ok(output) => {
                warn!(
                    time_point = tp,
                    expected = parameters,
                    found = output.coefficients.len(),
                    "solver returned the wrong number of coefficients"
                );
                aggregator.mark_invalid(tp, included.len());
            }
            Err(err) => {
                warn!(time_point = tp, error = %err, "regression failed");
                aggregator.mark_invalid(tp, included.len());
            }
        }
    }

    let provenance = RegressionProvenance {
        predictor_specs: predictors.iter().map(|raw| raw.as_ref().to_owned()).collect(),
        dependent_spec: dependent.to_owned(),
        dynamic_predictors: predictor_specs.iter().map(|spec| spec.dynamic).collect(),
        dynamic_dependent: dependent_spec.dynamic,
        used_averaged_trials: options.use_averaged_trials,
        consolidator: config.consolidator_name().map(str::to_owned),
        time_point_source: options.time_point_source()?,
    };
    Ok(aggregator.finish(&experiment.subject_id, family, &tensors, provenance))
}

/// Standard deviation over all working trials, indexed by stored plane then measure.
fn plane_std_devs(tensor: &MeasureTensor) -> Vec<Vec<f64>> {
    let (_, n_measures, _) = tensor.shape();
    (0..tensor.stored_time_points())
        .map(|plane| {
            (0..n_measures)
                .map(|measure| nan_std_dev(tensor.column(measure, plane).iter().copied()))
                .collect()
        })
        .collect()
}

fn stored_plane(tensor: &MeasureTensor, time_point: usize) -> usize {
    if tensor.is_time_varying() { time_point } else { 0 }
}
