//! Shared trial fixtures for unit tests.

use std::collections::BTreeMap;

use crate::trajectory::{Experiment, ResponseLayout, TrajColumn, Trajectory, Trial};

pub(crate) const SAMPLING_RATE: f64 = 0.01;

/// A trial sampled every 10 ms whose columns are given by `value(column, row)`.
///
/// The absolute-time column always follows the sample clock.
#[expect(clippy::cast_precision_loss)]
pub(crate) fn trial_with<F>(trial_num: usize, target: f64, row_count: usize, mut value: F) -> Trial
where
    F: FnMut(TrajColumn, usize) -> f64,
{
    let trajectory = Trajectory::from_fn(row_count, |column, row| match column {
        TrajColumn::AbsTime => (row - 1) as f64 * SAMPLING_RATE,
        _ => value(column, row),
    });
    Trial {
        trial_num,
        target,
        response: None,
        expected_response: None,
        movement_time: trajectory.row_count() as f64 * SAMPLING_RATE,
        sampling_rate: SAMPLING_RATE,
        custom: BTreeMap::new(),
        trajectory,
    }
}

pub(crate) fn experiment(trials: Vec<Trial>) -> Experiment {
    Experiment {
        subject_id: "test".to_owned(),
        layout: ResponseLayout::Discrete,
        trials,
        averaged_trials: None,
    }
}
