/// eng
/// Runnable walkthroughs of the kinetics engine on synthetic data
pub mod kinetics_examples;
