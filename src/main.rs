#[allow(non_snake_case)]
pub mod Examples;
#[allow(non_snake_case)]
pub mod Kinetics;
#[allow(non_snake_case)]
pub mod Utils;
pub mod settings;

use Examples::kinetics_examples::kin_examples;
use settings::with_settings;

pub fn main() {
    //
    with_settings(|s| s.init_logging());
    let task: usize = 1;
    kin_examples(task);
}
