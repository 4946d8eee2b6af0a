//! Trial consolidation: replacing the working trial set before regression.

use std::{collections::BTreeMap, fmt, sync::Arc};

use trajreg_stats::descriptive::DescriptiveStats;

use crate::trajectory::{TrajColumn, Trajectory, Trial, sample_series};

type ConsolidateFn = dyn Fn(&[Trial]) -> Vec<Trial> + Send + Sync;

/// A named `trials -> trials` transformation.
///
/// The name is kept in the regression result's provenance.
#[derive(Clone)]
pub struct TrialConsolidator {
    name: String,
    function: Arc<ConsolidateFn>,
}

impl fmt::Debug for TrialConsolidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialConsolidator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TrialConsolidator {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Trial]) -> Vec<Trial> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
        }
    }

    /// Consolidator wrapping [`average_by_target`].
    #[must_use]
    pub fn average_by_target() -> Self {
        Self::new("average_by_target", average_by_target)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn apply(&self, trials: &[Trial]) -> Vec<Trial> {
        (self.function)(trials)
    }
}

/// Mean of the finite values, `NaN` when there are none.
fn finite_mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    DescriptiveStats::new(values).map_or(f64::NAN, |stats| stats.mean)
}

/// Averages trials with the same target into one trial per target.
///
/// Groups keep the order in which their targets first appear. Each averaged
/// trajectory is as long as the group's longest member; shorter members hold
/// their last row. Scalar fields and custom attributes are averaged over the
/// members that have them. Averaged trials are numbered from 1.
#[must_use]
pub fn average_by_target(trials: &[Trial]) -> Vec<Trial> {
    let mut groups: Vec<(f64, Vec<&Trial>)> = vec![];
    for trial in trials {
        match groups.iter_mut().find(|(target, _)| *target == trial.target) {
            Some((_, members)) => members.push(trial),
            None => groups.push((trial.target, vec![trial])),
        }
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(index, (target, members))| average_group(index + 1, target, &members))
        .collect()
}

fn average_group(trial_num: usize, target: f64, members: &[&Trial]) -> Trial {
    let row_count = members.iter().map(|trial| trial.row_count()).max().unwrap_or(0);
    let trajectory = Trajectory::from_fn(row_count, |column: TrajColumn, row| {
        finite_mean(members.iter().map(|trial| {
            let series = &trial.trajectory.column(column)[..trial.row_count()];
            sample_series(series, row)
        }))
    });

    let optional_mean = |value: fn(&Trial) -> Option<f64>| {
        let present = members.iter().filter_map(|trial| value(trial)).collect::<Vec<_>>();
        (!present.is_empty()).then(|| finite_mean(present))
    };

    let mut custom = BTreeMap::new();
    for name in members.iter().flat_map(|trial| trial.custom.keys()) {
        if !custom.contains_key(name) {
            let mean = finite_mean(members.iter().filter_map(|trial| trial.attribute(name)));
            custom.insert(name.clone(), mean);
        }
    }

    Trial {
        trial_num,
        target,
        response: optional_mean(|trial| trial.response),
        expected_response: optional_mean(|trial| trial.expected_response),
        movement_time: finite_mean(members.iter().map(|trial| trial.movement_time)),
        sampling_rate: finite_mean(members.iter().map(|trial| trial.sampling_rate)),
        custom,
        trajectory,
    }
}
