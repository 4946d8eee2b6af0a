//! Regression configuration
//!
//! Configuration has two layers:
//!
//! - [`RegressionOptions`]: plain data, deserializable from JSON. Unknown keys
//!   are rejected with [`ConfigError::UnsupportedKey`].
//! - [`RegressionConfig`]: the options plus caller-supplied hooks (trial
//!   filters, a consolidator, row resolution overrides, time-point filters,
//!   measure providers, the velocity provider and the solver).
//!
//! # Example
//!
//! ```
//! use trajreg_analysis::config::{RegressionConfig, RegressionOptions};
//!
//! let json = r#"{ "delta_time": 0.05, "max_time": 1.0 }"#;
//! let options = RegressionOptions::from_json(json).unwrap();
//! let config = RegressionConfig::new(options)
//!     .with_trial_filter(|trial| trial.target > 0.0);
//! assert!(config.validate().is_ok());
//!
//! let err = RegressionOptions::from_json(r#"{ "delta_tme": 0.05 }"#).unwrap_err();
//! assert_eq!(err.to_string(), "unsupported configuration key 'delta_tme'");
//! ```

use std::{fmt, io, path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use trajreg_stats::regression::{
    BoxedRegressionSolver, ReferenceSolver, RegressionFamily, RegressionSolver, SolverOptions,
};

use crate::{
    consolidate::TrialConsolidator,
    measure::{
        BoxedDynamicMeasureProvider, BoxedFixedMeasureProvider, DynamicMeasureProvider,
        FixedMeasureProvider, dynamic::BuiltinDynamicMeasures, fixed::BuiltinFixedMeasures,
        velocity::{BoxedVelocityProvider, FiniteDifferenceSpeed, VelocityProvider},
    },
    time_point::{
        BoxedRowResolver, OffsetRows, OffsetSource, RowResolver, TimePointKind, TimePointSource,
        default_resolver,
    },
    trajectory::Trial,
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("unsupported configuration key '{key}'")]
    UnsupportedKey { key: String },
    #[display("malformed options: {source}")]
    MalformedOptions { source: serde_json::Error },
    #[display("invalid value for '{key}': {reason}")]
    InvalidOption { key: &'static str, reason: String },
    #[display("'{first}' and '{second}' both define time points")]
    ConflictingTimePoints {
        first: &'static str,
        second: &'static str,
    },
    #[display("a custom row resolver cannot be combined with a per-trial offset")]
    ConflictingRowResolution,
    #[display(
        "row resolver returned {found} rows for {expected} time points on trial {trial_num}"
    )]
    ResolvedRowCount {
        trial_num: usize,
        expected: usize,
        found: usize,
    },
    #[display("time-point filters require a dynamic predictor or dependent variable")]
    FiltersOnFixedRegression,
    #[display("no trials left to regress")]
    NoTrials,
    #[display("no time points to regress")]
    NoTimePoints,
    #[display("too few trials ({trials}) for {parameters} parameters at ratio {ratio}")]
    TooFewTrials {
        trials: usize,
        parameters: usize,
        ratio: f64,
    },
    #[display("failed to save assembled tensors to {}", path.display())]
    SaveTensors { path: PathBuf, source: io::Error },
}

/// Data-only regression options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegressionOptions {
    /// Regress per-target averages instead of individual trials.
    pub use_averaged_trials: bool,
    /// Literal row numbers to use as time points.
    pub explicit_rows: Option<Vec<usize>>,
    /// Time points every `delta_time` seconds from trial start.
    pub delta_time: Option<f64>,
    /// Time points every `step` y units (`step, 2·step, ...`).
    pub group_by_y_coordinate: Option<f64>,
    /// Upper bound of generated time points: seconds, y units or a row number.
    pub max_time: Option<f64>,
    /// Custom attribute holding each trial's row offset.
    pub per_trial_offset_attribute: Option<String>,
    /// Drop time points that lie past the end of every trial.
    pub drop_unreachable_time_points: bool,
    /// Treat every measure spec as dynamic, marked or not.
    pub all_dynamic: bool,
    pub min_sample_to_predictor_ratio: f64,
    pub emit_full_diagnostics: bool,
    /// Debug side channel: write the assembled tensors to this JSON file.
    pub save_assembled_tensors_to: Option<PathBuf>,
    /// Status line logged once per call.
    ///
    /// Tokens: `{subject}`, `{trials}`, `{time_points}`, `{family}`, `{progress}`.
    pub status_template: String,
}

impl Default for RegressionOptions {
    fn default() -> Self {
        Self {
            use_averaged_trials: false,
            explicit_rows: None,
            delta_time: None,
            group_by_y_coordinate: None,
            max_time: None,
            per_trial_offset_attribute: None,
            drop_unreachable_time_points: true,
            all_dynamic: false,
            min_sample_to_predictor_ratio: 3.0,
            emit_full_diagnostics: false,
            save_assembled_tensors_to: None,
            status_template: Self::DEFAULT_STATUS_TEMPLATE.to_owned(),
        }
    }
}

impl RegressionOptions {
    pub const DEFAULT_STATUS_TEMPLATE: &str =
        "{progress}subject {subject}: {trials} trials, {time_points} time points ({family})";

    /// Every recognized JSON key.
    pub const KEYS: &[&str] = &[
        "use_averaged_trials",
        "explicit_rows",
        "delta_time",
        "group_by_y_coordinate",
        "max_time",
        "per_trial_offset_attribute",
        "drop_unreachable_time_points",
        "all_dynamic",
        "min_sample_to_predictor_ratio",
        "emit_full_diagnostics",
        "save_assembled_tensors_to",
        "status_template",
    ];

    /// Parses options from a JSON object; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value = serde_json::from_str::<serde_json::Value>(json)
            .map_err(|source| ConfigError::MalformedOptions { source })?;
        if let Some(object) = value.as_object()
            && let Some(key) = object.keys().find(|key| !Self::KEYS.contains(&key.as_str()))
        {
            return Err(ConfigError::UnsupportedKey { key: key.clone() });
        }
        serde_json::from_value(value).map_err(|source| ConfigError::MalformedOptions { source })
    }

    /// The time-point definition, if any; fails if more than one is given.
    pub fn time_point_source(&self) -> Result<Option<TimePointSource>, ConfigError> {
        let mut defined = vec![];
        if let Some(rows) = &self.explicit_rows {
            defined.push(("explicit_rows", TimePointSource::Rows(rows.clone())));
        }
        if let Some(step) = self.delta_time {
            defined.push(("delta_time", TimePointSource::DeltaTime { step }));
        }
        if let Some(step) = self.group_by_y_coordinate {
            defined.push(("group_by_y_coordinate", TimePointSource::YCoordinate { step }));
        }
        match defined.as_slice() {
            [] => Ok(None),
            [(_, source)] => Ok(Some(source.clone())),
            [(first, _), (second, _), ..] => Err(ConfigError::ConflictingTimePoints {
                first: *first,
                second: *second,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, value: Option<f64>| match value {
            Some(value) if !(value.is_finite() && value > 0.0) => Err(ConfigError::InvalidOption {
                key,
                reason: format!("expected a positive number, got {value}"),
            }),
            _ => Ok(()),
        };
        positive("delta_time", self.delta_time)?;
        positive("group_by_y_coordinate", self.group_by_y_coordinate)?;
        positive("max_time", self.max_time)?;
        positive(
            "min_sample_to_predictor_ratio",
            Some(self.min_sample_to_predictor_ratio),
        )?;
        if let Some(rows) = &self.explicit_rows
            && rows.contains(&0)
        {
            return Err(ConfigError::InvalidOption {
                key: "explicit_rows",
                reason: "rows are numbered from 1".to_owned(),
            });
        }
        self.time_point_source()?;
        Ok(())
    }

    /// Renders the status template.
    #[must_use]
    pub fn status_message(
        &self,
        subject: &str,
        trials: usize,
        time_points: usize,
        family: RegressionFamily,
        progress: Option<(usize, usize)>,
    ) -> String {
        let progress = progress
            .map(|(done, total)| format!("[{done}/{total}] "))
            .unwrap_or_default();
        self.status_template
            .replace("{subject}", subject)
            .replace("{trials}", &trials.to_string())
            .replace("{time_points}", &time_points.to_string())
            .replace("{family}", &family.to_string())
            .replace("{progress}", &progress)
    }
}

pub type TrialFilter = Arc<dyn Fn(&Trial) -> bool + Send + Sync>;
/// Per-time-point predicate on a trial and its resolved row.
pub type TimePointFilter = Arc<dyn Fn(&Trial, usize) -> bool + Send + Sync>;
pub type OffsetFn = Arc<dyn Fn(&Trial) -> Option<f64> + Send + Sync>;

/// Options plus the caller-supplied hooks of a regression call.
pub struct RegressionConfig {
    pub options: RegressionOptions,
    pub(crate) trial_filters: Vec<TrialFilter>,
    pub(crate) consolidator: Option<TrialConsolidator>,
    pub(crate) row_resolver: Option<Arc<dyn RowResolver>>,
    pub(crate) offset_function: Option<OffsetFn>,
    pub(crate) time_point_filters: Vec<TimePointFilter>,
    pub(crate) dynamic_measures: BoxedDynamicMeasureProvider,
    pub(crate) fixed_measures: BoxedFixedMeasureProvider,
    pub(crate) velocity: BoxedVelocityProvider,
    pub(crate) solver: BoxedRegressionSolver,
    pub(crate) progress: Option<(usize, usize)>,
}

impl fmt::Debug for RegressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegressionConfig")
            .field("options", &self.options)
            .field("trial_filters", &self.trial_filters.len())
            .field("consolidator", &self.consolidator)
            .field("row_resolver", &self.row_resolver)
            .field("offset_function", &self.offset_function.is_some())
            .field("time_point_filters", &self.time_point_filters.len())
            .field("dynamic_measures", &self.dynamic_measures)
            .field("fixed_measures", &self.fixed_measures)
            .field("velocity", &self.velocity)
            .field("solver", &self.solver)
            .field("progress", &self.progress)
            .finish()
    }
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self::new(RegressionOptions::default())
    }
}

impl RegressionConfig {
    #[must_use]
    pub fn new(options: RegressionOptions) -> Self {
        Self {
            options,
            trial_filters: vec![],
            consolidator: None,
            row_resolver: None,
            offset_function: None,
            time_point_filters: vec![],
            dynamic_measures: Box::new(BuiltinDynamicMeasures),
            fixed_measures: Box::new(BuiltinFixedMeasures),
            velocity: Box::new(FiniteDifferenceSpeed),
            solver: Box::new(ReferenceSolver),
            progress: None,
        }
    }

    /// Adds a trial filter; trials failing any filter are dropped before consolidation.
    #[must_use]
    pub fn with_trial_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Trial) -> bool + Send + Sync + 'static,
    {
        self.trial_filters.push(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_consolidator(mut self, consolidator: TrialConsolidator) -> Self {
        self.consolidator = Some(consolidator);
        self
    }

    /// Replaces the row resolution strategy for every time point.
    #[must_use]
    pub fn with_row_resolver<R>(mut self, resolver: R) -> Self
    where
        R: RowResolver + 'static,
    {
        self.row_resolver = Some(Arc::new(resolver));
        self
    }

    /// Shifts resolved rows by a per-trial offset; `None` excludes the trial.
    #[must_use]
    pub fn with_offset_function<F>(mut self, offset: F) -> Self
    where
        F: Fn(&Trial) -> Option<f64> + Send + Sync + 'static,
    {
        self.offset_function = Some(Arc::new(offset));
        self
    }

    /// Adds a time-point filter, applied after the filters added before it.
    #[must_use]
    pub fn with_time_point_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Trial, usize) -> bool + Send + Sync + 'static,
    {
        self.time_point_filters.push(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn with_dynamic_measures<P>(mut self, provider: P) -> Self
    where
        P: DynamicMeasureProvider + 'static,
    {
        self.dynamic_measures = Box::new(provider);
        self
    }

    #[must_use]
    pub fn with_fixed_measures<P>(mut self, provider: P) -> Self
    where
        P: FixedMeasureProvider + 'static,
    {
        self.fixed_measures = Box::new(provider);
        self
    }

    #[must_use]
    pub fn with_velocity<V>(mut self, velocity: V) -> Self
    where
        V: VelocityProvider + 'static,
    {
        self.velocity = Box::new(velocity);
        self
    }

    #[must_use]
    pub fn with_solver<S>(mut self, solver: S) -> Self
    where
        S: RegressionSolver + 'static,
    {
        self.solver = Box::new(solver);
        self
    }

    /// Progress pair (`done`, `total`) rendered into the status message.
    #[must_use]
    pub fn with_progress(mut self, done: usize, total: usize) -> Self {
        self.progress = Some((done, total));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;
        let has_offset =
            self.offset_function.is_some() || self.options.per_trial_offset_attribute.is_some();
        if self.row_resolver.is_some() && has_offset {
            return Err(ConfigError::ConflictingRowResolution);
        }
        if self.offset_function.is_some() && self.options.per_trial_offset_attribute.is_some() {
            return Err(ConfigError::ConflictingRowResolution);
        }
        Ok(())
    }

    #[must_use]
    pub fn consolidator_name(&self) -> Option<&str> {
        self.consolidator.as_ref().map(TrialConsolidator::name)
    }

    /// Row resolution for time points of `kind`, with any override applied.
    #[must_use]
    pub fn row_resolver(&self, kind: TimePointKind) -> BoxedRowResolver {
        if let Some(resolver) = &self.row_resolver {
            return Box::new(Arc::clone(resolver));
        }
        let offset = match (&self.offset_function, &self.options.per_trial_offset_attribute) {
            (Some(function), _) => Some(OffsetSource::Function(Arc::clone(function))),
            (None, Some(attribute)) => Some(OffsetSource::Attribute(attribute.clone())),
            (None, None) => None,
        };
        let base = default_resolver(kind);
        match offset {
            Some(offset) => Box::new(OffsetRows { base, offset }),
            None => base,
        }
    }

    #[must_use]
    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            quiet: true,
            full_diagnostics: self.options.emit_full_diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing::trial_with, time_point::IdentityRows};

    #[test]
    fn test_keys_match_fields() {
        let value = serde_json::to_value(RegressionOptions::default()).unwrap();
        let mut fields = value.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        let mut keys = RegressionOptions::KEYS
            .iter()
            .map(|key| (*key).to_owned())
            .collect::<Vec<_>>();
        fields.sort();
        keys.sort();
        assert_eq!(fields, keys);
    }

    #[test]
    fn test_from_json_defaults() {
        let options = RegressionOptions::from_json("{}").unwrap();
        assert_eq!(options, RegressionOptions::default());
        assert_eq!(options.min_sample_to_predictor_ratio, 3.0);
        assert!(options.drop_unreachable_time_points);
    }

    #[test]
    fn test_from_json_unsupported_key() {
        let err = RegressionOptions::from_json(r#"{ "use_averaged_trials": true, "smoothing": 2 }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedKey { key } if key == "smoothing"));
    }

    #[test]
    fn test_from_json_malformed() {
        let err = RegressionOptions::from_json(r#"{ "delta_time": "fast" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedOptions { .. }));
    }

    #[test]
    fn test_conflicting_time_points() {
        let options = RegressionOptions {
            explicit_rows: Some(vec![1, 2]),
            group_by_y_coordinate: Some(0.1),
            ..RegressionOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "'explicit_rows' and 'group_by_y_coordinate' both define time points"
        );
    }

    #[test]
    fn test_invalid_values() {
        let options = RegressionOptions {
            delta_time: Some(0.0),
            ..RegressionOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidOption { key: "delta_time", .. })
        ));

        let options = RegressionOptions {
            explicit_rows: Some(vec![0, 1]),
            ..RegressionOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidOption { key: "explicit_rows", .. })
        ));
    }

    #[test]
    fn test_conflicting_row_resolution() {
        let config = RegressionConfig::default()
            .with_row_resolver(IdentityRows)
            .with_offset_function(|_| Some(2.0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConflictingRowResolution)
        ));
    }

    #[test]
    fn test_offset_attribute_resolver() {
        let config = RegressionConfig::new(RegressionOptions {
            per_trial_offset_attribute: Some("onset".to_owned()),
            ..RegressionOptions::default()
        });
        let resolver = config.row_resolver(TimePointKind::Row);

        let mut with_onset = trial_with(1, 0.0, 10, |_, _| 0.0);
        with_onset.custom.insert("onset".to_owned(), 3.0);
        let without = trial_with(2, 0.0, 10, |_, _| 0.0);

        assert!(resolver.accepts(&with_onset));
        assert!(!resolver.accepts(&without));
        assert_eq!(resolver.resolve(&[1.0, 2.0], &with_onset), [3, 4]);
    }

    #[test]
    fn test_status_message() {
        let options = RegressionOptions::default();
        let message = options.status_message("s01", 40, 12, RegressionFamily::Ols, Some((2, 5)));
        assert_eq!(
            message,
            "[2/5] subject s01: 40 trials, 12 time points (ols)"
        );
        let message = options.status_message("s01", 40, 12, RegressionFamily::Ols, None);
        assert!(message.starts_with("regressing"));
    }
}
