use trajreg_analysis::{
    measure::{
        MeasureSpec,
        dynamic::{DYNAMIC_MEASURE_NAMES, TRAJ_COLUMN_PREFIX},
        fixed::{CUSTOM_ATTRIBUTE_PREFIX, END_OF_TRIAL_PREFIX, FIXED_MEASURE_NAMES},
    },
    trajectory::TrajColumn,
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct ListMeasuresArg {}

pub(crate) fn run(_arg: &ListMeasuresArg) {
    let marker = MeasureSpec::DYNAMIC_MARKER;

    println!("Dynamic measures (one value per trial and time point):");
    for name in DYNAMIC_MEASURE_NAMES {
        println!("  {marker}{name}");
    }
    for column in TrajColumn::ALL {
        println!("  {marker}{TRAJ_COLUMN_PREFIX}{column}");
    }
    println!("  {marker}dtheta(smooth=<seconds>), {marker}absdtheta(smooth=<seconds>)");

    println!();
    println!("Fixed measures (one value per trial):");
    for name in FIXED_MEASURE_NAMES {
        println!("  {name}");
    }
    println!("  {CUSTOM_ATTRIBUTE_PREFIX}<attribute>");
    println!("  {END_OF_TRIAL_PREFIX}<dynamic measure>");
}
