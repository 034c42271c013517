/// eng
/// Numerical helpers shared by the kinetics engine: interpolation (linear and PCHIP),
/// descriptive statistics and ordinary least squares, scalar initial value problems and
/// definite integrals on the RK45 solver of RustedSciThe, and box-bounded robust least
/// squares on the `levenberg-marquardt` crate.
pub mod interpolation;
#[allow(non_snake_case)]
pub mod LM_optimization;
/// logger initialisation (simplelog)
pub mod logger;
pub mod ode;
pub mod statistics;
