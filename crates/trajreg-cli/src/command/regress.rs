use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use trajreg_analysis::{
    config::{RegressionConfig, RegressionOptions},
    regression::regress,
    result::RegressionResult,
};
use trajreg_stats::regression::RegressionFamily;

use crate::util::{self, Output};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct RegressArg {
    /// Experiment JSON file
    experiment: PathBuf,
    /// Comma-separated predictor specs; prefix a spec with `#` to read it per time point
    #[arg(long, value_delimiter = ',', required = true)]
    predictors: Vec<String>,
    /// Dependent variable spec
    #[arg(long)]
    dependent: String,
    /// Regression family (ols, stepwise, correlation, point_biserial, logistic)
    #[arg(long, default_value = "ols")]
    family: String,
    /// Regression options JSON file
    #[arg(long)]
    options: Option<PathBuf>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RegressionReport {
    generated_at: DateTime<Utc>,
    experiment: PathBuf,
    result: RegressionResult,
}

pub(crate) fn run(arg: &RegressArg) -> anyhow::Result<()> {
    let RegressArg {
        experiment: experiment_path,
        predictors,
        dependent,
        family,
        options,
        output,
    } = arg;

    let family = family
        .parse::<RegressionFamily>()
        .context("Invalid --family")?;
    let options = match options {
        Some(path) => util::read_options_file(path)?,
        None => RegressionOptions::default(),
    };

    eprintln!("Loading experiment from {}...", experiment_path.display());
    let experiment = util::read_experiment_file(experiment_path)?;
    eprintln!(
        "Loaded subject {} with {} trials",
        experiment.subject_id,
        experiment.trials.len()
    );

    let config = RegressionConfig::new(options);
    let result = regress(
        &experiment,
        family,
        dependent,
        predictors.as_slice(),
        &config,
    )
    .with_context(|| {
        format!(
            "Failed to regress {dependent} on [{}] for subject {}",
            predictors.join(", "),
            experiment.subject_id
        )
    })?;

    let regressed = result.r_squared.iter().filter(|r2| !r2.is_nan()).count();
    eprintln!(
        "Regressed {regressed} of {} time points ({} predictors including the intercept)",
        result.len(),
        result.predictors.len()
    );

    let report = RegressionReport {
        generated_at: Utc::now(),
        experiment: experiment_path.clone(),
        result,
    };
    let target = Output::save_json(&report, output.as_deref())?;
    eprintln!("Wrote regression result to {target}");

    Ok(())
}
