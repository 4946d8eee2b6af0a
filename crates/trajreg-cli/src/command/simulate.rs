use std::{collections::BTreeMap, f64::consts::PI, path::PathBuf};

use anyhow::ensure;
use rand::{Rng, SeedableRng as _};
use rand_distr::{Distribution as _, Normal};
use rand_pcg::Pcg32;
use trajreg_analysis::trajectory::{Experiment, NumberLine, ResponseLayout, Trajectory, Trial};

use crate::util::Output;

const SAMPLING_RATE: f64 = 0.01;
const MIN_ROWS: usize = 80;
const MAX_ROWS: usize = 120;
const NUMBER_LINE: NumberLine = NumberLine {
    max_value: 100.0,
    width: 1.0,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SimulateArg {
    /// Number of trials to generate
    #[arg(long, default_value_t = 100)]
    trials: usize,
    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// How strongly the target drives horizontal movement (0 = no relation)
    #[arg(long, default_value_t = 1.0)]
    slope: f64,
    /// Relative noise on the endpoint and on every velocity sample
    #[arg(long, default_value_t = 0.1)]
    noise: f64,
    /// Subject identifier written into the experiment
    #[arg(long, default_value = "sim")]
    subject: String,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Default for SimulateArg {
    fn default() -> Self {
        Self {
            trials: 100,
            seed: 0,
            slope: 1.0,
            noise: 0.1,
            subject: "sim".to_owned(),
            output: None,
        }
    }
}

pub(crate) fn run(arg: &SimulateArg) -> anyhow::Result<()> {
    ensure!(arg.trials > 0, "--trials must be positive");
    ensure!(
        arg.noise.is_finite() && arg.noise >= 0.0,
        "--noise must be a non-negative number"
    );

    eprintln!(
        "Simulating {} trials for subject {} (seed {})...",
        arg.trials, arg.subject, arg.seed
    );
    let mut rng = Pcg32::seed_from_u64(arg.seed);
    let experiment = simulate_experiment(arg, &mut rng)?;
    let total_rows = experiment
        .trials
        .iter()
        .map(Trial::row_count)
        .sum::<usize>();
    eprintln!("Generated {total_rows} trajectory samples");

    let target = Output::save_json(&experiment, arg.output.as_deref())?;
    eprintln!("Wrote experiment to {target}");
    Ok(())
}

fn simulate_experiment<R>(arg: &SimulateArg, rng: &mut R) -> anyhow::Result<Experiment>
where
    R: Rng + ?Sized,
{
    let noise = Normal::new(0.0, arg.noise)?;
    let trials = (1..=arg.trials)
        .map(|trial_num| simulate_trial(trial_num, arg.slope, &noise, &mut *rng))
        .collect();
    Ok(Experiment {
        subject_id: arg.subject.clone(),
        layout: ResponseLayout::NumberLine(NUMBER_LINE),
        trials,
        averaged_trials: None,
    })
}

/// One number-line trial.
///
/// The finger moves upward along `y = (1 - cos(pi t)) / 2` over the normalized
/// time `t`, while its horizontal velocity is proportional to the vertical one
/// so it heads towards an endpoint set by the target.
#[expect(clippy::cast_precision_loss)]
fn simulate_trial<R>(trial_num: usize, slope: f64, noise: &Normal<f64>, rng: &mut R) -> Trial
where
    R: Rng + ?Sized,
{
    let target = rng.random_range(0.0..=NUMBER_LINE.max_value);
    let row_count = rng.random_range(MIN_ROWS..=MAX_ROWS);
    let duration = (row_count - 1) as f64 * SAMPLING_RATE;
    let endpoint = (slope * (target / NUMBER_LINE.max_value - 0.5) + noise.sample(rng))
        * NUMBER_LINE.width;

    let mut time = Vec::with_capacity(row_count);
    let mut y = Vec::with_capacity(row_count);
    let mut y_vel = Vec::with_capacity(row_count);
    let mut y_acc = Vec::with_capacity(row_count);
    let mut x_vel = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let t = row as f64 / (row_count - 1) as f64;
        let vertical = PI / (2.0 * duration) * (PI * t).sin();
        time.push(row as f64 * SAMPLING_RATE);
        y.push((1.0 - (PI * t).cos()) / 2.0);
        y_vel.push(vertical);
        y_acc.push(PI * PI / (2.0 * duration * duration) * (PI * t).cos());
        x_vel.push(endpoint * vertical * (1.0 + noise.sample(rng)));
    }

    let mut x = Vec::with_capacity(row_count);
    let mut position = 0.0;
    for (row, &velocity) in x_vel.iter().enumerate() {
        if row > 0 {
            position += velocity * SAMPLING_RATE;
        }
        x.push(position);
    }

    let theta = x_vel
        .iter()
        .zip(&y_vel)
        .map(|(&vx, &vy)| vx.atan2(vy))
        .collect();
    let implied_ep = (0..row_count)
        .map(|row| {
            if y_vel[row] > 0.0 {
                NUMBER_LINE.x_to_value(x[row] + x_vel[row] / y_vel[row] * (1.0 - y[row]))
            } else {
                f64::NAN
            }
        })
        .collect();
    let final_x = x.last().copied().unwrap_or(0.0);

    let trajectory = Trajectory {
        x,
        y,
        x_vel,
        y_vel,
        y_acc,
        theta,
        implied_ep,
        abs_time: time,
    };
    let mut custom = BTreeMap::new();
    custom.insert(
        "initiation_time".to_owned(),
        rng.random_range(0.15..=0.35),
    );

    Trial {
        trial_num,
        target,
        response: Some(NUMBER_LINE.x_to_value(final_x)),
        expected_response: Some(if target > NUMBER_LINE.midpoint() { 1.0 } else { 0.0 }),
        movement_time: duration,
        sampling_rate: SAMPLING_RATE,
        custom,
        trajectory,
    }
}

#[cfg(test)]
mod tests {
    use trajreg_analysis::{
        config::{RegressionConfig, RegressionOptions},
        regression::regress,
        trajectory::TrajColumn,
    };
    use trajreg_stats::regression::RegressionFamily;

    use super::*;

    fn final_time(trial: &Trial) -> f64 {
        trial
            .trajectory
            .value(TrajColumn::AbsTime, trial.row_count())
    }

    fn simulate(trials: usize, seed: u64, noise: f64) -> Experiment {
        let arg = SimulateArg {
            trials,
            seed,
            noise,
            ..SimulateArg::default()
        };
        simulate_experiment(&arg, &mut Pcg32::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_simulation_is_deterministic_per_seed() {
        // Implied endpoints start with NaN, so compare the serialized form.
        let json = |seed| serde_json::to_value(simulate(5, seed, 0.1).trials).unwrap();
        assert_eq!(json(42), json(42));
        assert_ne!(json(42), json(43));
    }

    #[test]
    fn test_trials_are_well_formed() {
        let experiment = simulate(10, 7, 0.1);
        assert_eq!(experiment.trials.len(), 10);
        for (index, trial) in experiment.trials.iter().enumerate() {
            assert_eq!(trial.trial_num, index + 1);
            let rows = trial.row_count();
            assert!((MIN_ROWS..=MAX_ROWS).contains(&rows));
            assert!((final_time(trial) - trial.movement_time).abs() < 1e-9);
            assert_eq!(trial.trajectory.value(TrajColumn::Y, 1), 0.0);
            assert!((trial.trajectory.value(TrajColumn::Y, rows) - 1.0).abs() < 1e-9);
            assert!(trial.trajectory.value(TrajColumn::ImpliedEp, 1).is_nan());
            assert!(trial.attribute("initiation_time").is_some());
        }
    }

    #[test]
    fn test_noiseless_implied_endpoint_matches_response() {
        let experiment = simulate(3, 1, 0.0);
        for trial in &experiment.trials {
            let middle = trial.row_count() / 2;
            let iep = trial.trajectory.value(TrajColumn::ImpliedEp, middle);
            let expected = NUMBER_LINE.x_to_value(
                (trial.target / NUMBER_LINE.max_value - 0.5) * NUMBER_LINE.width,
            );
            assert!((iep - expected).abs() < 2.0, "iep {iep} vs {expected}");
        }
    }

    #[test]
    fn test_target_drives_x_velocity() {
        let experiment = simulate(60, 3, 0.0);
        let config = RegressionConfig::new(RegressionOptions {
            explicit_rows: Some(vec![40]),
            ..RegressionOptions::default()
        });
        let result = regress(
            &experiment,
            RegressionFamily::Ols,
            "target",
            &["#xvel"],
            &config,
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.r_squared[0] > 0.8);
        assert!(result.predictor("xvel").unwrap().coefficients[0] > 0.0);
    }
}
