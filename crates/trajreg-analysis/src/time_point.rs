//! Time-point generation and per-trial row resolution
//!
//! A *time point* is an abstract regression slice: a row number, a time since
//! trial start, or a target y coordinate. The same time point can land on a
//! different trajectory row in every trial, so each time point is resolved
//! per trial by a [`RowResolver`].
//!
//! # Strategies
//!
//! - [`IdentityRows`]: the time point is the row number
//! - [`TimeRows`]: `row = round(t / sampling_rate) + 1`
//! - [`ThresholdRows`]: first row where a column reaches the time-point value,
//!   or the trial's last row when it never does
//! - [`OffsetRows`]: any base strategy shifted by a per-trial offset
//!   (`row = base + offset - 1`); trials without an offset are rejected
//!
//! Resolvers never fail on out-of-range rows. [`RowMatrix::resolve`] clamps
//! every row into `[1, row_count]` of its trial.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::trajectory::{TrajColumn, Trial, clamp_row};

/// How the abstract time points of a regression are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePointSource {
    /// Literal row numbers.
    Rows(Vec<usize>),
    /// Evenly spaced times since trial start, in seconds.
    DeltaTime { step: f64 },
    /// Evenly spaced y coordinates.
    YCoordinate { step: f64 },
}

impl TimePointSource {
    #[must_use]
    pub fn kind(&self) -> TimePointKind {
        match self {
            Self::Rows(_) => TimePointKind::Row,
            Self::DeltaTime { .. } => TimePointKind::Time,
            Self::YCoordinate { .. } => TimePointKind::YCoordinate,
        }
    }
}

/// What the values of [`TimePoints`] denote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePointKind {
    Row,
    Time,
    YCoordinate,
}

/// Abstract time points of a regression, in processing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoints {
    pub kind: TimePointKind,
    pub values: Vec<f64>,
}

impl TimePoints {
    /// Generates time points for `trials`.
    ///
    /// Without a `source`, every row of the longest trial is a time point.
    /// `max_time` bounds generated ranges (seconds for [`TimePointSource::DeltaTime`],
    /// a y coordinate for [`TimePointSource::YCoordinate`], a row number otherwise).
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    #[must_use]
    pub fn generate(
        source: Option<&TimePointSource>,
        trials: &[Trial],
        max_time: Option<f64>,
    ) -> Self {
        match source {
            None => {
                let longest = trials.iter().map(Trial::row_count).max().unwrap_or(0);
                let last = max_time.map_or(longest, |max| (max.floor() as usize).min(longest));
                Self {
                    kind: TimePointKind::Row,
                    values: (1..=last).map(|row| row as f64).collect(),
                }
            }
            Some(TimePointSource::Rows(rows)) => Self {
                kind: TimePointKind::Row,
                values: rows.iter().map(|&row| row as f64).collect(),
            },
            Some(TimePointSource::DeltaTime { step }) => {
                let longest = trials.iter().map(Trial::duration).fold(0.0, f64::max);
                let end = max_time.unwrap_or(longest);
                Self {
                    kind: TimePointKind::Time,
                    values: steps(0.0, *step, end),
                }
            }
            Some(TimePointSource::YCoordinate { step }) => {
                let max_y = trials
                    .iter()
                    .flat_map(|trial| trial.trajectory.column(TrajColumn::Y))
                    .copied()
                    .filter(|y| y.is_finite())
                    .fold(f64::NEG_INFINITY, f64::max);
                let end = max_time.map_or(max_y, |max| max.min(max_y));
                Self {
                    kind: TimePointKind::YCoordinate,
                    values: steps(*step, *step, end),
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keeps only the time points at `indices`.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            kind: self.kind,
            values: indices.iter().map(|&i| self.values[i]).collect(),
        }
    }
}

/// `start, start + step, ...` up to and including `end` (with a small tolerance).
#[expect(clippy::cast_precision_loss)]
fn steps(start: f64, step: f64, end: f64) -> Vec<f64> {
    if step.is_nan() || step <= 0.0 || !end.is_finite() {
        return vec![];
    }
    let tolerance = step * 1e-9;
    (0_usize..)
        .map(|i| start + step * i as f64)
        .take_while(|value| *value <= end + tolerance)
        .collect()
}

/// Maps the abstract time points of a regression to rows of one trial.
pub trait RowResolver: fmt::Debug + Send + Sync {
    /// Whether this trial can be resolved at all. Rejected trials are removed
    /// from the regression before any measure is computed.
    fn accepts(&self, _trial: &Trial) -> bool {
        true
    }

    /// Returns one 1-based row per time point. Rows may exceed the trial's row
    /// count; callers clamp.
    fn resolve(&self, time_points: &[f64], trial: &Trial) -> Vec<usize>;
}

pub type BoxedRowResolver = Box<dyn RowResolver>;

impl<R> RowResolver for Arc<R>
where
    R: RowResolver + ?Sized,
{
    fn accepts(&self, trial: &Trial) -> bool {
        (**self).accepts(trial)
    }

    fn resolve(&self, time_points: &[f64], trial: &Trial) -> Vec<usize> {
        (**self).resolve(time_points, trial)
    }
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_row(value: f64) -> usize {
    if value.is_finite() && value >= 1.0 {
        value.round() as usize
    } else {
        1
    }
}

/// The time point is the row number.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRows;

impl RowResolver for IdentityRows {
    fn resolve(&self, time_points: &[f64], _trial: &Trial) -> Vec<usize> {
        time_points.iter().map(|&tp| to_row(tp)).collect()
    }
}

/// The time point is a time since trial start, in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRows;

impl RowResolver for TimeRows {
    fn resolve(&self, time_points: &[f64], trial: &Trial) -> Vec<usize> {
        time_points
            .iter()
            .map(|&t| to_row(t / trial.sampling_rate + 1.0))
            .collect()
    }
}

/// First row where `column` reaches or exceeds the time-point value.
///
/// Falls back to the trial's last row when the value is never reached.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdRows {
    pub column: TrajColumn,
}

impl RowResolver for ThresholdRows {
    fn resolve(&self, time_points: &[f64], trial: &Trial) -> Vec<usize> {
        let row_count = trial.row_count();
        let series = &trial.trajectory.column(self.column)[..row_count];
        time_points
            .iter()
            .map(|&target| {
                series
                    .iter()
                    .position(|&value| value >= target)
                    .map_or(row_count.max(1), |index| index + 1)
            })
            .collect()
    }
}

/// Where a per-trial row offset comes from.
#[derive(Clone)]
pub enum OffsetSource {
    /// A custom attribute of the trial.
    Attribute(String),
    /// A caller-supplied function; `None` rejects the trial.
    Function(Arc<dyn Fn(&Trial) -> Option<f64> + Send + Sync>),
}

impl fmt::Debug for OffsetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl OffsetSource {
    #[must_use]
    pub fn offset(&self, trial: &Trial) -> Option<f64> {
        let offset = match self {
            Self::Attribute(name) => trial.attribute(name),
            Self::Function(function) => function(trial),
        }?;
        offset.is_finite().then_some(offset)
    }
}

/// Shifts the rows of a base resolver by a per-trial offset: `row = base + offset - 1`.
#[derive(Debug)]
pub struct OffsetRows {
    pub base: BoxedRowResolver,
    pub offset: OffsetSource,
}

impl RowResolver for OffsetRows {
    fn accepts(&self, trial: &Trial) -> bool {
        self.offset.offset(trial).is_some() && self.base.accepts(trial)
    }

    #[expect(clippy::cast_precision_loss)]
    fn resolve(&self, time_points: &[f64], trial: &Trial) -> Vec<usize> {
        let offset = self.offset.offset(trial).unwrap_or(1.0);
        self.base
            .resolve(time_points, trial)
            .into_iter()
            .map(|row| to_row(row as f64 + offset - 1.0))
            .collect()
    }
}

/// Default resolver for a kind of time point.
#[must_use]
pub fn default_resolver(kind: TimePointKind) -> BoxedRowResolver {
    match kind {
        TimePointKind::Row => Box::new(IdentityRows),
        TimePointKind::Time => Box::new(TimeRows),
        TimePointKind::YCoordinate => Box::new(ThresholdRows {
            column: TrajColumn::Y,
        }),
    }
}

/// Trials × time points matrix of 1-based trajectory rows.
///
/// Every entry lies within `[1, row_count]` of its trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowMatrix {
    n_trials: usize,
    n_time_points: usize,
    rows: Vec<usize>,
}

impl RowMatrix {
    /// Clamps unresolved rows (one `Vec` per trial) against each trial's row count.
    ///
    /// # Panics
    ///
    /// Panics if `raw_rows` does not have one entry per trial, or the entries
    /// differ in length.
    #[must_use]
    pub fn from_raw(trials: &[Trial], raw_rows: &[Vec<usize>]) -> Self {
        assert_eq!(trials.len(), raw_rows.len(), "one row list per trial");
        let n_time_points = raw_rows.first().map_or(0, Vec::len);
        let mut rows = Vec::with_capacity(trials.len() * n_time_points);
        for (trial, trial_rows) in trials.iter().zip(raw_rows) {
            assert_eq!(trial_rows.len(), n_time_points, "ragged row lists");
            let row_count = trial.row_count();
            rows.extend(trial_rows.iter().map(|&row| clamp_row(row, row_count)));
        }
        Self {
            n_trials: trials.len(),
            n_time_points,
            rows,
        }
    }

    /// Resolves and clamps `time_points` for every trial.
    #[must_use]
    pub fn resolve(trials: &[Trial], resolver: &dyn RowResolver, time_points: &[f64]) -> Self {
        let raw = trials
            .iter()
            .map(|trial| resolver.resolve(time_points, trial))
            .collect::<Vec<_>>();
        Self::from_raw(trials, &raw)
    }

    /// One row per trial: each trial's last row.
    #[must_use]
    pub fn last_rows(trials: &[Trial]) -> Self {
        let raw = trials
            .iter()
            .map(|trial| vec![trial.row_count()])
            .collect::<Vec<_>>();
        Self::from_raw(trials, &raw)
    }

    #[must_use]
    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    #[must_use]
    pub fn n_time_points(&self) -> usize {
        self.n_time_points
    }

    #[must_use]
    pub fn get(&self, trial: usize, time_point: usize) -> usize {
        self.rows[trial * self.n_time_points + time_point]
    }

    #[must_use]
    pub fn trial_rows(&self, trial: usize) -> &[usize] {
        &self.rows[trial * self.n_time_points..(trial + 1) * self.n_time_points]
    }

    /// Keeps only the trials at `indices`.
    #[must_use]
    pub fn select_trials(&self, indices: &[usize]) -> Self {
        let rows = indices
            .iter()
            .flat_map(|&i| self.trial_rows(i).iter().copied())
            .collect();
        Self {
            n_trials: indices.len(),
            n_time_points: self.n_time_points,
            rows,
        }
    }
}
