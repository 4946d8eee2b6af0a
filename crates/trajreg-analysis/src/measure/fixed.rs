//! Built-in fixed (per-trial) measures.
//!
//! | Name | Value |
//! |------|-------|
//! | `target` | the trial's target |
//! | `response` | the final response (`NaN` if missing) |
//! | `expected_response` | the required response (`NaN` if missing) |
//! | `movement_time` | movement time in seconds |
//! | `trial_num` | trial number |
//! | `custom.<attr>` | a custom attribute (`NaN` if missing) |
//! | `end_<dynamic>` | any dynamic measure read at the trial's last row |

use nalgebra::DMatrix;

use super::{
    FixedMeasureProvider, MeasureContext, MeasureError, MeasureOutput, MeasureSpec, check_shape,
    dynamic::BuiltinDynamicMeasures,
};
use crate::{time_point::RowMatrix, trajectory::Trial};

pub const CUSTOM_ATTRIBUTE_PREFIX: &str = "custom.";
pub const END_OF_TRIAL_PREFIX: &str = "end_";

/// Names accepted by [`BuiltinFixedMeasures`], besides the prefixed forms.
pub const FIXED_MEASURE_NAMES: &[&str] = &[
    "target",
    "response",
    "expected_response",
    "movement_time",
    "trial_num",
];

/// Built-in registry of fixed measures.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFixedMeasures;

impl BuiltinFixedMeasures {
    fn per_trial<F>(
        context: &MeasureContext<'_>,
        spec: &MeasureSpec,
        description: &str,
        value: F,
    ) -> MeasureOutput
    where
        F: Fn(&Trial) -> f64,
    {
        let values = DMatrix::from_iterator(
            context.trials.len(),
            1,
            context.trials.iter().map(value),
        );
        MeasureOutput {
            name: spec.name.clone(),
            description: description.to_owned(),
            values,
        }
    }

    fn end_of_trial(
        context: &MeasureContext<'_>,
        spec: &MeasureSpec,
        dynamic_name: &str,
    ) -> Result<MeasureOutput, MeasureError> {
        let inner = MeasureSpec {
            name: dynamic_name.to_owned(),
            args: spec.args.clone(),
            dynamic: true,
        };
        let measure = BuiltinDynamicMeasures::resolve(&inner).map_err(|err| match err {
            MeasureError::UnknownMeasure { .. } => MeasureError::UnknownMeasure {
                spec: spec.to_string(),
            },
            err => err,
        })?;
        let rows = RowMatrix::last_rows(context.trials);
        let output = measure
            .evaluate(context, &rows)
            .map_err(|err| match err {
                MeasureError::MissingNumberLine { .. } => MeasureError::MissingNumberLine {
                    spec: spec.to_string(),
                },
                err => err,
            })?;
        Ok(MeasureOutput {
            name: spec.name.clone(),
            description: format!("{} at trial end", output.description),
            values: output.values,
        })
    }
}

impl FixedMeasureProvider for BuiltinFixedMeasures {
    #[expect(clippy::cast_precision_loss)]
    fn evaluate(
        &self,
        context: &MeasureContext<'_>,
        spec: &MeasureSpec,
    ) -> Result<MeasureOutput, MeasureError> {
        let output = if let Some(attribute) = spec.name.strip_prefix(CUSTOM_ATTRIBUTE_PREFIX) {
            spec.expect_args(&[])?;
            let description = format!("custom attribute {attribute}");
            Self::per_trial(context, spec, &description, |trial| {
                trial.attribute(attribute).unwrap_or(f64::NAN)
            })
        } else if let Some(dynamic_name) = spec.name.strip_prefix(END_OF_TRIAL_PREFIX) {
            Self::end_of_trial(context, spec, dynamic_name)?
        } else {
            spec.expect_args(&[])?;
            match spec.name.as_str() {
                "target" => Self::per_trial(context, spec, "target", |trial| trial.target),
                "response" => Self::per_trial(context, spec, "final response", |trial| {
                    trial.response.unwrap_or(f64::NAN)
                }),
                "expected_response" => Self::per_trial(context, spec, "expected response", |trial| {
                    trial.expected_response.unwrap_or(f64::NAN)
                }),
                "movement_time" => {
                    Self::per_trial(context, spec, "movement time", |trial| trial.movement_time)
                }
                "trial_num" => {
                    Self::per_trial(context, spec, "trial number", |trial| trial.trial_num as f64)
                }
                _ => {
                    return Err(MeasureError::UnknownMeasure {
                        spec: spec.to_string(),
                    });
                }
            }
        };
        check_shape(spec, output, context.trials.len(), 1)
    }
}
