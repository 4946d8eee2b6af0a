use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use self::{list_measures::ListMeasuresArg, regress::RegressArg, simulate::SimulateArg};

mod list_measures;
mod regress;
mod simulate;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log per-time-point progress
    #[arg(long, short, global = true)]
    verbose: bool,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Run a per-time-point regression on an experiment file
    Regress(#[clap(flatten)] RegressArg),
    /// Generate a synthetic experiment
    Simulate(#[clap(flatten)] SimulateArg),
    /// Print the registered measure names
    ListMeasures(#[clap(flatten)] ListMeasuresArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_tracing(args.verbose);
    match args.mode {
        Mode::Regress(arg) => regress::run(&arg)?,
        Mode::Simulate(arg) => simulate::run(&arg)?,
        Mode::ListMeasures(arg) => list_measures::run(&arg),
    }
    Ok(())
}

/// Installs a stderr subscriber; `RUST_LOG` directives take precedence over the default level.
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
