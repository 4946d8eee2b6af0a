//! Instantaneous speed series for the `ivel` measure.

use std::fmt;

use crate::trajectory::{TrajColumn, Trial};

/// Computes a trial's instantaneous 2-D speed series.
///
/// The series may be shorter than the trajectory; readers hold its last value.
pub trait VelocityProvider: fmt::Debug + Send + Sync {
    fn speed(&self, trial: &Trial) -> Vec<f64>;
}

pub type BoxedVelocityProvider = Box<dyn VelocityProvider>;

/// Speed from consecutive positions: `sqrt(dx² + dy²) / dt`.
///
/// Produces `row_count - 1` values; element `i` is the speed between rows
/// `i + 1` and `i + 2`. `dt` comes from the absolute-time column, falling back
/// to the trial's sampling rate when times do not advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct FiniteDifferenceSpeed;

impl VelocityProvider for FiniteDifferenceSpeed {
    fn speed(&self, trial: &Trial) -> Vec<f64> {
        let row_count = trial.row_count();
        let trajectory = &trial.trajectory;
        let x = &trajectory.column(TrajColumn::X)[..row_count];
        let y = &trajectory.column(TrajColumn::Y)[..row_count];
        let time = &trajectory.column(TrajColumn::AbsTime)[..row_count];

        (1..row_count)
            .map(|i| {
                let dt = match time[i] - time[i - 1] {
                    dt if dt > 0.0 => dt,
                    _ => trial.sampling_rate,
                };
                (x[i] - x[i - 1]).hypot(y[i] - y[i - 1]) / dt
            })
            .collect()
    }
}
