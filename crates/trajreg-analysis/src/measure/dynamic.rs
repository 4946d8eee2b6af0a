//! Built-in dynamic measures.
//!
//! Every dynamic measure produces one full-length series per trial, which is
//! then sampled at the requested rows. Rows are clamped to the trial's length
//! first; a series shorter than that (e.g. a speed series) holds its last value.
//!
//! # Measures
//!
//! | Name | Value |
//! |------|-------|
//! | `Traj.<column>` | any trajectory column, verbatim |
//! | `x`, `y`, `xvel`, `yvel`, `yacc` | trajectory column |
//! | `xabsvel` | `abs(xvel)` |
//! | `x_nl` | x mapped to number-line units (reported as `x`) |
//! | `ivel` | instantaneous 2-D speed |
//! | `ep`, `iep` | implied endpoint |
//! | `rldir` | pointing direction: -1, 0, +1 |
//! | `rldir_like_final` | +1 / -1 when the direction matches / mismatches the response, else 0 |
//! | `rldir_like_final01` | 1 on a match, 0 otherwise |
//! | `iep_vs_expected_response` | implied endpoint signed towards the expected response |
//! | `dtheta`, `absdtheta` | angle difference, optionally smoothed (`smooth=<seconds>`) |

use std::{borrow::Cow, fmt};

use nalgebra::DMatrix;
use trajreg_stats::smoothing::gaussian_smooth;

use super::{
    DynamicMeasureProvider, MeasureContext, MeasureError, MeasureOutput, MeasureSpec, check_shape,
};
use crate::{
    time_point::RowMatrix,
    trajectory::{ResponseLayout, TrajColumn, Trial, clamp_row, sample_series, sign},
};

/// Prefix of the trajectory-column passthrough measure.
pub const TRAJ_COLUMN_PREFIX: &str = "Traj.";

/// Names accepted by [`BuiltinDynamicMeasures`], besides `Traj.<column>`.
pub const DYNAMIC_MEASURE_NAMES: &[&str] = &[
    "x",
    "y",
    "xvel",
    "xabsvel",
    "yvel",
    "yacc",
    "x_nl",
    "ivel",
    "ep",
    "iep",
    "rldir",
    "rldir_like_final",
    "rldir_like_final01",
    "iep_vs_expected_response",
    "dtheta",
    "absdtheta",
];

/// A measure evaluated per trial and time point.
pub trait DynamicMeasure: fmt::Debug + Send + Sync {
    /// Name reported in the regression's predictor list.
    fn id(&self) -> &str;

    fn description(&self) -> String;

    /// The measure's value at every row of `trial` (possibly shorter).
    fn series<'a>(
        &self,
        context: &MeasureContext<'_>,
        trial: &'a Trial,
    ) -> Result<Cow<'a, [f64]>, MeasureError>;

    /// Samples the per-trial series at `rows`.
    fn evaluate(
        &self,
        context: &MeasureContext<'_>,
        rows: &RowMatrix,
    ) -> Result<MeasureOutput, MeasureError> {
        let mut values = DMatrix::from_element(rows.n_trials(), rows.n_time_points(), f64::NAN);
        for (i, trial) in context.trials.iter().enumerate() {
            let series = self.series(context, trial)?;
            let row_count = trial.row_count();
            for (j, &row) in rows.trial_rows(i).iter().enumerate() {
                values[(i, j)] = sample_series(&series, clamp_row(row, row_count));
            }
        }
        Ok(MeasureOutput {
            name: self.id().to_owned(),
            description: self.description(),
            values,
        })
    }
}

pub type BoxedDynamicMeasure = Box<dyn DynamicMeasure>;

/// A trajectory column read out verbatim or as an absolute value.
#[derive(Debug, Clone)]
pub struct ColumnReadout {
    pub id: String,
    pub column: TrajColumn,
    pub absolute: bool,
}

impl DynamicMeasure for ColumnReadout {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> String {
        if self.absolute {
            format!("abs({})", self.column)
        } else {
            self.column.to_string()
        }
    }

    fn series<'a>(
        &self,
        _context: &MeasureContext<'_>,
        trial: &'a Trial,
    ) -> Result<Cow<'a, [f64]>, MeasureError> {
        let series = trial.trajectory.column(self.column);
        Ok(if self.absolute {
            Cow::Owned(series.iter().map(|v| v.abs()).collect())
        } else {
            Cow::Borrowed(series)
        })
    }
}

/// x coordinate mapped through the experiment's number line.
#[derive(Debug, Clone, Copy)]
pub struct NumberLineX;

impl DynamicMeasure for NumberLineX {
    fn id(&self) -> &str {
        "x"
    }

    fn description(&self) -> String {
        "x (number-line units)".to_owned()
    }

    fn series<'a>(
        &self,
        context: &MeasureContext<'_>,
        trial: &'a Trial,
    ) -> Result<Cow<'a, [f64]>, MeasureError> {
        let ResponseLayout::NumberLine(line) = context.layout else {
            return Err(MeasureError::MissingNumberLine {
                spec: "x_nl".to_owned(),
            });
        };
        Ok(Cow::Owned(
            trial
                .trajectory
                .column(TrajColumn::X)
                .iter()
                .map(|&x| line.x_to_value(x))
                .collect(),
        ))
    }
}

/// Instantaneous speed from the context's velocity provider.
#[derive(Debug, Clone, Copy)]
pub struct InstantSpeed;

impl DynamicMeasure for InstantSpeed {
    fn id(&self) -> &str {
        "ivel"
    }

    fn description(&self) -> String {
        "instantaneous speed".to_owned()
    }

    fn series<'a>(
        &self,
        context: &MeasureContext<'_>,
        trial: &'a Trial,
    ) -> Result<Cow<'a, [f64]>, MeasureError> {
        Ok(Cow::Owned(context.velocity.speed(trial)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionMode {
    /// The pointing direction itself.
    Current,
    /// +1 match, -1 mismatch with the final response, 0 without direction.
    LikeFinal,
    /// 1 on a match, 0 otherwise.
    LikeFinal01,
}

/// Direction the implied endpoint points to, optionally compared with the
/// trial's final response.
#[derive(Debug, Clone, Copy)]
pub struct Direction {
    pub mode: DirectionMode,
}

impl DynamicMeasure for Direction {
    fn id(&self) -> &str {
        match self.mode {
            DirectionMode::Current => "rldir",
            DirectionMode::LikeFinal => "rldir_like_final",
            DirectionMode::LikeFinal01 => "rldir_like_final01",
        }
    }

    fn description(&self) -> String {
        match self.mode {
            DirectionMode::Current => "pointing direction".to_owned(),
            DirectionMode::LikeFinal => "pointing direction matches final response".to_owned(),
            DirectionMode::LikeFinal01 => {
                "pointing direction matches final response (0/1)".to_owned()
            }
        }
    }

    fn series<'a>(
        &self,
        context: &MeasureContext<'_>,
        trial: &'a Trial,
    ) -> Result<Cow<'a, [f64]>, MeasureError> {
        let layout = context.layout;
        let final_direction = trial
            .response
            .map_or(f64::NAN, |response| layout.response_direction(response));
        let series = trial
            .trajectory
            .column(TrajColumn::ImpliedEp)
            .iter()
            .map(|&iep| {
                let direction = layout.direction(iep);
                match self.mode {
                    DirectionMode::Current => direction,
                    DirectionMode::LikeFinal => compare_direction(direction, final_direction),
                    DirectionMode::LikeFinal01 => {
                        let comparison = compare_direction(direction, final_direction);
                        if comparison.is_nan() {
                            f64::NAN
                        } else if comparison > 0.0 {
                            1.0
                        } else {
                            0.0
                        }
                    }
                }
            })
            .collect();
        Ok(Cow::Owned(series))
    }
}

/// +1 when both directions agree, -1 when they differ, 0 when there is no
/// current direction.
fn compare_direction(direction: f64, final_direction: f64) -> f64 {
    if direction == 0.0 {
        0.0
    } else if direction.is_nan() || final_direction.is_nan() {
        f64::NAN
    } else if direction == final_direction {
        1.0
    } else {
        -1.0
    }
}

/// Implied endpoint multiplied by the side (-1/+1) of the expected response.
#[derive(Debug, Clone, Copy)]
pub struct IepVsExpectedResponse;

impl DynamicMeasure for IepVsExpectedResponse {
    fn id(&self) -> &str {
        "iep_vs_expected_response"
    }

    fn description(&self) -> String {
        "implied endpoint towards expected response".to_owned()
    }

    fn series<'a>(
        &self,
        _context: &MeasureContext<'_>,
        trial: &'a Trial,
    ) -> Result<Cow<'a, [f64]>, MeasureError> {
        let side = trial
            .expected_response
            .map_or(f64::NAN, |expected| sign(expected - 0.5));
        Ok(Cow::Owned(
            trial
                .trajectory
                .column(TrajColumn::ImpliedEp)
                .iter()
                .map(|iep| iep * side)
                .collect(),
        ))
    }
}

/// First difference of the angle column; the first row is 0.
#[derive(Debug, Clone, Copy)]
pub struct AngleChange {
    /// Gaussian smoothing width in seconds, applied before differencing.
    pub smoothing: Option<f64>,
    pub absolute: bool,
}

impl DynamicMeasure for AngleChange {
    fn id(&self) -> &str {
        if self.absolute { "absdtheta" } else { "dtheta" }
    }

    fn description(&self) -> String {
        let base = if self.absolute {
            "abs(angle change)"
        } else {
            "angle change"
        };
        match self.smoothing {
            Some(width) => format!("{base}, smoothed {width}s"),
            None => base.to_owned(),
        }
    }

    fn series<'a>(
        &self,
        _context: &MeasureContext<'_>,
        trial: &'a Trial,
    ) -> Result<Cow<'a, [f64]>, MeasureError> {
        let theta = &trial.trajectory.column(TrajColumn::Theta)[..trial.row_count()];
        let theta = match self.smoothing {
            Some(width) => Cow::Owned(gaussian_smooth(theta, width / trial.sampling_rate)),
            None => Cow::Borrowed(theta),
        };
        let mut series = Vec::with_capacity(theta.len());
        if !theta.is_empty() {
            series.push(0.0);
        }
        series.extend(theta.windows(2).map(|pair| {
            let delta = pair[1] - pair[0];
            if self.absolute { delta.abs() } else { delta }
        }));
        Ok(Cow::Owned(series))
    }
}

/// Built-in registry of dynamic measures.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinDynamicMeasures;

impl BuiltinDynamicMeasures {
    /// Looks up the measure named by `spec`.
    pub fn resolve(spec: &MeasureSpec) -> Result<BoxedDynamicMeasure, MeasureError> {
        if let Some(column_name) = strip_prefix_ignore_case(&spec.name, TRAJ_COLUMN_PREFIX) {
            spec.expect_args(&[])?;
            let column =
                TrajColumn::from_name(column_name).ok_or_else(|| MeasureError::UnknownColumn {
                    column: column_name.to_owned(),
                })?;
            return Ok(Box::new(ColumnReadout {
                id: column.to_string(),
                column,
                absolute: false,
            }));
        }

        let readout = |column: TrajColumn, absolute: bool| -> BoxedDynamicMeasure {
            Box::new(ColumnReadout {
                id: spec.name.clone(),
                column,
                absolute,
            })
        };
        let smoothing_args: &[&str] = &["smooth"];
        spec.expect_args(if spec.name.ends_with("dtheta") {
            smoothing_args
        } else {
            &[]
        })?;

        let measure: BoxedDynamicMeasure = match spec.name.as_str() {
            "x" => readout(TrajColumn::X, false),
            "y" => readout(TrajColumn::Y, false),
            "xvel" => readout(TrajColumn::XVel, false),
            "xabsvel" => readout(TrajColumn::XVel, true),
            "yvel" => readout(TrajColumn::YVel, false),
            "yacc" => readout(TrajColumn::YAcc, false),
            "ep" | "iep" => readout(TrajColumn::ImpliedEp, false),
            "x_nl" => Box::new(NumberLineX),
            "ivel" => Box::new(InstantSpeed),
            "rldir" => Box::new(Direction {
                mode: DirectionMode::Current,
            }),
            "rldir_like_final" => Box::new(Direction {
                mode: DirectionMode::LikeFinal,
            }),
            "rldir_like_final01" => Box::new(Direction {
                mode: DirectionMode::LikeFinal01,
            }),
            "iep_vs_expected_response" => Box::new(IepVsExpectedResponse),
            "dtheta" | "absdtheta" => {
                let smoothing = spec.arg("smooth");
                if smoothing.is_some_and(|width| !width.is_finite() || width < 0.0) {
                    return Err(MeasureError::InvalidArgument {
                        spec: spec.to_string(),
                        arg: "smooth".to_owned(),
                    });
                }
                Box::new(AngleChange {
                    smoothing,
                    absolute: spec.name == "absdtheta",
                })
            }
            _ => {
                return Err(MeasureError::UnknownMeasure {
                    spec: spec.to_string(),
                });
            }
        };
        Ok(measure)
    }
}

impl DynamicMeasureProvider for BuiltinDynamicMeasures {
    fn evaluate(
        &self,
        context: &MeasureContext<'_>,
        spec: &MeasureSpec,
        rows: &RowMatrix,
    ) -> Result<MeasureOutput, MeasureError> {
        let measure = Self::resolve(spec)?;
        let output = measure.evaluate(context, rows).map_err(|err| match err {
            MeasureError::MissingNumberLine { .. } => MeasureError::MissingNumberLine {
                spec: spec.to_string(),
            },
            err => err,
        })?;
        check_shape(spec, output, rows.n_trials(), rows.n_time_points())
    }
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let head = name.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &name[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        measure::velocity::FiniteDifferenceSpeed,
        testing::trial_with,
        time_point::IdentityRows,
        trajectory::NumberLine,
    };

    fn as_f64(row: usize) -> f64 {
        f64::from(u32::try_from(row).unwrap())
    }

    fn evaluate(
        trials: &[Trial],
        layout: &ResponseLayout,
        spec: &str,
        time_points: &[f64],
    ) -> Result<MeasureOutput, MeasureError> {
        let context = MeasureContext {
            trials,
            layout,
            velocity: &FiniteDifferenceSpeed,
        };
        let rows = RowMatrix::resolve(trials, &IdentityRows, time_points);
        BuiltinDynamicMeasures.evaluate(&context, &MeasureSpec::parse(spec)?, &rows)
    }

    #[test]
    fn test_column_passthrough_clamps_rows() {
        let trials = [
            trial_with(1, 0.0, 5, |_, row| as_f64(row) * 10.0),
            trial_with(2, 0.0, 2, |_, row| as_f64(row)),
        ];
        let output =
            evaluate(&trials, &ResponseLayout::Discrete, "#Traj.YVel", &[1.0, 3.0, 8.0]).unwrap();
        assert_eq!(output.name, "yvel");
        assert_eq!(output.values.row(0).iter().copied().collect::<Vec<_>>(), [10.0, 30.0, 50.0]);
        assert_eq!(output.values.row(1).iter().copied().collect::<Vec<_>>(), [1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_unknown_column_names_column() {
        let trials = [trial_with(1, 0.0, 3, |_, _| 0.0)];
        let err =
            evaluate(&trials, &ResponseLayout::Discrete, "#Traj.pressure", &[1.0]).unwrap_err();
        assert_eq!(
            err,
            MeasureError::UnknownColumn {
                column: "pressure".to_owned()
            }
        );
    }

    #[test]
    fn test_unknown_measure_names_spec() {
        let trials = [trial_with(1, 0.0, 3, |_, _| 0.0)];
        let err = evaluate(&trials, &ResponseLayout::Discrete, "#zvel", &[1.0]).unwrap_err();
        assert_eq!(err.to_string(), "unknown measure '#zvel'");
    }

    #[test]
    fn test_xabsvel() {
        let trials = [trial_with(1, 0.0, 3, |column, row| match column {
            TrajColumn::XVel => -as_f64(row),
            _ => 0.0,
        })];
        let output = evaluate(&trials, &ResponseLayout::Discrete, "#xabsvel", &[2.0]).unwrap();
        assert_eq!(output.values[(0, 0)], 2.0);
    }

    #[test]
    fn test_x_nl_requires_number_line() {
        let trials = [trial_with(1, 0.0, 3, |_, _| 0.5)];
        let err = evaluate(&trials, &ResponseLayout::Discrete, "#x_nl", &[1.0]).unwrap_err();
        assert_eq!(
            err,
            MeasureError::MissingNumberLine {
                spec: "#x_nl".to_owned()
            }
        );

        let layout = ResponseLayout::NumberLine(NumberLine {
            max_value: 100.0,
            width: 2.0,
        });
        let output = evaluate(&trials, &layout, "#x_nl", &[1.0]).unwrap();
        assert_eq!(output.name, "x");
        assert_eq!(output.values[(0, 0)], 75.0);
    }

    #[test]
    fn test_ivel_holds_last_value() {
        let trials = [trial_with(1, 0.0, 4, |column, row| match column {
            TrajColumn::X => as_f64(row * row) * 0.01,
            _ => 0.0,
        })];
        let output =
            evaluate(&trials, &ResponseLayout::Discrete, "#ivel", &[1.0, 3.0, 4.0]).unwrap();
        // speeds between rows: 3, 5, 7 (units per second)
        assert!((output.values[(0, 0)] - 3.0).abs() < 1e-9);
        assert!((output.values[(0, 1)] - 7.0).abs() < 1e-9);
        assert!((output.values[(0, 2)] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_rldir_variants() {
        let iep = [-2.0, 0.0, 3.0];
        let mut trial = trial_with(1, 0.0, 3, |column, row| match column {
            TrajColumn::ImpliedEp => iep[row - 1],
            _ => 0.0,
        });
        trial.response = Some(1.0);
        let trials = [trial];
        let layout = ResponseLayout::Discrete;
        let tps = [1.0, 2.0, 3.0];

        let dir = evaluate(&trials, &layout, "#rldir", &tps).unwrap();
        assert_eq!(dir.values.iter().copied().collect::<Vec<_>>(), [-1.0, 0.0, 1.0]);

        let like = evaluate(&trials, &layout, "#rldir_like_final", &tps).unwrap();
        assert_eq!(like.values.iter().copied().collect::<Vec<_>>(), [-1.0, 0.0, 1.0]);

        let like01 = evaluate(&trials, &layout, "#rldir_like_final01", &tps).unwrap();
        assert_eq!(like01.values.iter().copied().collect::<Vec<_>>(), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_rldir_number_line_midpoint() {
        let mut trial = trial_with(1, 0.0, 2, |column, row| match column {
            TrajColumn::ImpliedEp => [20.0, 80.0][row - 1],
            _ => 0.0,
        });
        trial.response = Some(10.0);
        let layout = ResponseLayout::NumberLine(NumberLine {
            max_value: 100.0,
            width: 1.0,
        });
        let like = evaluate(&[trial], &layout, "#rldir_like_final", &[1.0, 2.0]).unwrap();
        assert_eq!(like.values.iter().copied().collect::<Vec<_>>(), [1.0, -1.0]);
    }

    #[test]
    fn test_iep_vs_expected_response() {
        let mut left = trial_with(1, 0.0, 1, |_, _| 4.0);
        left.expected_response = Some(0.0);
        let mut right = trial_with(2, 0.0, 1, |_, _| 4.0);
        right.expected_response = Some(1.0);
        let missing = trial_with(3, 0.0, 1, |_, _| 4.0);
        let output = evaluate(
            &[left, right, missing],
            &ResponseLayout::Discrete,
            "#iep_vs_expected_response",
            &[1.0],
        )
        .unwrap();
        assert_eq!(output.values[(0, 0)], -4.0);
        assert_eq!(output.values[(1, 0)], 4.0);
        assert!(output.values[(2, 0)].is_nan());
    }

    #[test]
    fn test_dtheta_first_column_zero() {
        let trials = [
            trial_with(1, 0.0, 6, |column, row| match column {
                TrajColumn::Theta => as_f64(row).powi(2),
                _ => 0.0,
            }),
            trial_with(2, 0.0, 4, |column, row| match column {
                TrajColumn::Theta => -as_f64(row),
                _ => 0.0,
            }),
        ];
        let tps = [1.0, 2.0, 3.0, 4.0];
        for spec in ["#dtheta", "#dtheta(smooth=0.02)", "#absdtheta(smooth=0.05)"] {
            let output = evaluate(&trials, &ResponseLayout::Discrete, spec, &tps).unwrap();
            for i in 0..trials.len() {
                assert_eq!(output.values[(i, 0)], 0.0, "{spec}");
            }
        }

        let raw = evaluate(&trials, &ResponseLayout::Discrete, "#dtheta", &tps).unwrap();
        assert_eq!(raw.values.row(0).iter().copied().collect::<Vec<_>>(), [0.0, 3.0, 5.0, 7.0]);
        assert_eq!(raw.values.row(1).iter().copied().collect::<Vec<_>>(), [0.0, -1.0, -1.0, -1.0]);

        let abs = evaluate(&trials, &ResponseLayout::Discrete, "#absdtheta", &tps).unwrap();
        assert_eq!(abs.values[(1, 3)], 1.0);
    }

    #[test]
    fn test_dtheta_huge_smoothing_width_flattens_angle() {
        let trials = [trial_with(1, 0.0, 10, |column, row| match column {
            TrajColumn::Theta => as_f64(row),
            _ => 0.0,
        })];
        let output = evaluate(
            &trials,
            &ResponseLayout::Discrete,
            "#dtheta(smooth=1e15)",
            &[1.0, 5.0, 10.0],
        )
        .unwrap();
        for value in output.values.iter() {
            assert!(value.abs() < 1e-9, "{value}");
        }
    }

    #[test]
    fn test_dtheta_rejects_unknown_argument() {
        let trials = [trial_with(1, 0.0, 3, |_, _| 0.0)];
        let err = evaluate(&trials, &ResponseLayout::Discrete, "#dtheta(window=3)", &[1.0])
            .unwrap_err();
        assert!(matches!(err, MeasureError::InvalidArgument { .. }));
    }

    #[test]
    fn test_every_listed_name_resolves() {
        for name in DYNAMIC_MEASURE_NAMES {
            let spec = MeasureSpec::parse(&format!("#{name}")).unwrap();
            assert!(BuiltinDynamicMeasures::resolve(&spec).is_ok(), "{name}");
        }
    }
}
