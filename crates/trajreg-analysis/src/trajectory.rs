//! Experiment, trial and trajectory data structures
//!
//! This module provides the read-only view the regression engine has over
//! recorded experiment data.
//!
//! # Data Structure
//!
//! ```text
//! Experiment
//! ├─ subject_id
//! ├─ layout (discrete choice or number line)
//! ├─ trials: Vec<Trial>
//! │   ├─ trial_num, target, response, expected_response, movement_time
//! │   ├─ sampling_rate (seconds per sample)
//! │   ├─ custom attributes
//! │   └─ trajectory: Trajectory (one Vec<f64> per TrajColumn)
//! └─ averaged_trials (optional, one per target)
//! ```
//!
//! # Row Numbers
//!
//! Trajectory rows are **1-based** throughout the engine: row 1 is the first
//! sample. [`Trajectory::value`] clamps any requested row into
//! `[1, row_count]`, so reading past the end of a short trial repeats its last
//! sample instead of failing.
//!
//! # Serialization
//!
//! All types implement `serde` traits:
//!
//! ```json
//! {
//!   "subject_id": "s01",
//!   "layout": { "number_line": { "max_value": 100.0, "width": 1.0 } },
//!   "trials": [
//!     {
//!       "trial_num": 1,
//!       "target": 35.0,
//!       "response": 38.2,
//!       "sampling_rate": 0.01,
//!       "trajectory": { "x": [...], "y": [...], ... }
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named trajectory column.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum TrajColumn {
    #[display("x")]
    X,
    #[display("y")]
    Y,
    #[display("xvel")]
    XVel,
    #[display("yvel")]
    YVel,
    #[display("yacc")]
    YAcc,
    #[display("theta")]
    Theta,
    #[display("iep")]
    ImpliedEp,
    #[display("time")]
    AbsTime,
}

impl TrajColumn {
    pub const ALL: [Self; 8] = [
        Self::X,
        Self::Y,
        Self::XVel,
        Self::YVel,
        Self::YAcc,
        Self::Theta,
        Self::ImpliedEp,
        Self::AbsTime,
    ];

    /// Looks up a column by name, ignoring ASCII case.
    ///
    /// ```
    /// use trajreg_analysis::trajectory::TrajColumn;
    ///
    /// assert_eq!(TrajColumn::from_name("XVel"), Some(TrajColumn::XVel));
    /// assert_eq!(TrajColumn::from_name("implied_ep"), Some(TrajColumn::ImpliedEp));
    /// assert_eq!(TrajColumn::from_name("pressure"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let column = match name.trim().to_ascii_lowercase().as_str() {
            "x" => Self::X,
            "y" => Self::Y,
            "xvel" | "vx" | "x_vel" => Self::XVel,
            "yvel" | "vy" | "y_vel" => Self::YVel,
            "yacc" | "ay" | "y_acc" => Self::YAcc,
            "theta" | "angle" => Self::Theta,
            "iep" | "ep" | "implied_ep" => Self::ImpliedEp,
            "time" | "abs_time" => Self::AbsTime,
            _ => return None,
        };
        Some(column)
    }
}

/// Time-sampled trajectory of one trial, stored column by column.
///
/// All columns are expected to have the same length; the row count is taken
/// from the shortest one so every row is readable in every column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub x_vel: Vec<f64>,
    pub y_vel: Vec<f64>,
    pub y_acc: Vec<f64>,
    pub theta: Vec<f64>,
    pub implied_ep: Vec<f64>,
    pub abs_time: Vec<f64>,
}

impl Trajectory {
    /// Builds a trajectory by evaluating `value(column, row)` for rows `1..=row_count`.
    #[must_use]
    pub fn from_fn<F>(row_count: usize, mut value: F) -> Self
    where
        F: FnMut(TrajColumn, usize) -> f64,
    {
        let mut trajectory = Self::default();
        for column in TrajColumn::ALL {
            *trajectory.column_mut(column) =
                (1..=row_count).map(|row| value(column, row)).collect();
        }
        trajectory
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        TrajColumn::ALL
            .iter()
            .map(|&column| self.column(column).len())
            .min()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn column(&self, column: TrajColumn) -> &[f64] {
        match column {
            TrajColumn::X => &self.x,
            TrajColumn::Y => &self.y,
            TrajColumn::XVel => &self.x_vel,
            TrajColumn::YVel => &self.y_vel,
            TrajColumn::YAcc => &self.y_acc,
            TrajColumn::Theta => &self.theta,
            TrajColumn::ImpliedEp => &self.implied_ep,
            TrajColumn::AbsTime => &self.abs_time,
        }
    }

    pub fn column_mut(&mut self, column: TrajColumn) -> &mut Vec<f64> {
        match column {
            TrajColumn::X => &mut self.x,
            TrajColumn::Y => &mut self.y,
            TrajColumn::XVel => &mut self.x_vel,
            TrajColumn::YVel => &mut self.y_vel,
            TrajColumn::YAcc => &mut self.y_acc,
            TrajColumn::Theta => &mut self.theta,
            TrajColumn::ImpliedEp => &mut self.implied_ep,
            TrajColumn::AbsTime => &mut self.abs_time,
        }
    }

    /// Reads `column` at the 1-based `row`, clamped to the trajectory's rows.
    ///
    /// Returns `NaN` for an empty trajectory.
    #[must_use]
    pub fn value(&self, column: TrajColumn, row: usize) -> f64 {
        let row_count = self.row_count();
        if row_count == 0 {
            return f64::NAN;
        }
        self.column(column)[clamp_row(row, row_count) - 1]
    }
}

/// Clamps a 1-based row number into `[1, row_count]`.
///
/// `row_count` must be non-zero.
#[must_use]
pub fn clamp_row(row: usize, row_count: usize) -> usize {
    row.clamp(1, row_count.max(1))
}

/// Reads a series at a 1-based row, holding the last value past its end.
#[must_use]
pub fn sample_series(series: &[f64], row: usize) -> f64 {
    if series.is_empty() {
        return f64::NAN;
    }
    series[clamp_row(row, series.len()) - 1]
}

/// A single recorded trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub trial_num: usize,
    /// Target presented on this trial.
    pub target: f64,
    /// Final recorded response (button index for discrete layouts, number-line
    /// value for number-line layouts).
    #[serde(default)]
    pub response: Option<f64>,
    /// Response the trial required (0 = left, 1 = right).
    #[serde(default)]
    pub expected_response: Option<f64>,
    #[serde(default)]
    pub movement_time: f64,
    /// Seconds between consecutive trajectory samples.
    pub sampling_rate: f64,
    /// Additional per-trial numeric attributes.
    #[serde(default)]
    pub custom: BTreeMap<String, f64>,
    pub trajectory: Trajectory,
}

impl Trial {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.trajectory.row_count()
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.custom.get(name).copied()
    }

    /// Duration covered by the trajectory, in seconds.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.row_count().saturating_sub(1) as f64 * self.sampling_rate
    }
}

/// Geometry of the response area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseLayout {
    /// Two response buttons, left and right of the origin.
    #[default]
    Discrete,
    /// A bounded number line. Implied endpoints are expressed in number-line units.
    NumberLine(NumberLine),
}

impl ResponseLayout {
    /// Direction an implied endpoint points to: -1 (left), 0 (none) or +1 (right).
    #[must_use]
    pub fn direction(&self, implied_ep: f64) -> f64 {
        match self {
            Self::Discrete => sign(implied_ep),
            Self::NumberLine(line) => sign(implied_ep - line.midpoint()),
        }
    }

    /// Side of the final response encoded as -1 (left) or +1 (right).
    #[must_use]
    pub fn response_direction(&self, response: f64) -> f64 {
        match self {
            Self::Discrete => sign(response - 0.5),
            Self::NumberLine(line) => sign(response - line.midpoint()),
        }
    }
}

/// Horizontal number line centered on x = 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberLine {
    /// Value at the right end of the line (the left end is 0).
    pub max_value: f64,
    /// Line length in trajectory x units.
    pub width: f64,
}

impl NumberLine {
    /// Maps a trajectory x coordinate to a number-line value.
    ///
    /// ```
    /// use trajreg_analysis::trajectory::NumberLine;
    ///
    /// let line = NumberLine { max_value: 100.0, width: 2.0 };
    /// assert_eq!(line.x_to_value(-1.0), 0.0);
    /// assert_eq!(line.x_to_value(0.0), 50.0);
    /// assert_eq!(line.x_to_value(1.0), 100.0);
    /// ```
    #[must_use]
    pub fn x_to_value(&self, x: f64) -> f64 {
        (x / self.width + 0.5) * self.max_value
    }

    #[must_use]
    pub fn midpoint(&self) -> f64 {
        self.max_value / 2.0
    }
}

/// Sign with an exact zero for zero input; `NaN` stays `NaN`.
#[must_use]
pub fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else if value == 0.0 {
        0.0
    } else {
        f64::NAN
    }
}

/// All trials recorded for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub subject_id: String,
    #[serde(default)]
    pub layout: ResponseLayout,
    pub trials: Vec<Trial>,
    /// Precomputed per-target averages, if the loader provided them.
    #[serde(default)]
    pub averaged_trials: Option<Vec<Trial>>,
}
