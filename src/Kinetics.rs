/// eng
/// Multi-heating-rate series: the immutable input of every analysis. A series holds the
/// temperature, time, conversion α, dα/dT and mass columns of one experiment at heating rate β;
/// construction sorts by temperature and forces α to be non-decreasing.
pub mod heating_rate_series;
/// eng
/// Isoconversional (model-free) analysis: Friedman, Kissinger-Akahira-Sunose, Ozawa-Flynn-Wall
/// and the advanced non-linear Vyazovkin method. Produces the activation-energy profile Eₐ(α)
/// together with the α-T table and the X/Y points of the linear methods.
pub mod isoconversional;
/// eng
/// Rate laws as a closed enumeration: generalised Šesták-Berggren (with Eₐ either fixed or read
/// from an isoconversional curve), Kamal-Sourour, GAI, two parallel channels and the
/// non-parametric rate. Every variant evaluates dα/dt and its analytic parameter gradient.
pub mod rate_laws;
/// eng
/// Non-linear fitting of rate laws to the pooled rate data of all heating rates
/// (GlobalFit, CKA with fixed Eₐ, and the autocatalytic family), with covariance estimation.
pub mod model_fitting;
/// eng
/// Non-parametric analysis: the model-free rate amplitude Z(α) = A(α)f(α).
pub mod npa;
/// eng
/// Leave-one-heating-rate-out cross-validation of fitted models.
pub mod cross_validation;
/// eng
/// Isothermal time-to-conversion prediction with delta-method confidence intervals.
pub mod uncertainty;
/// eng
/// Integration of a fitted rate law back to α(T) and the mass-loss curve of one heating rate.
pub mod curve_reconstruction;
/// eng
/// Library of classical solid-state reaction models f(α) and comparison of a fitted model's
/// shape against them.
pub mod ideal_mechanisms;
/// eng
/// Characteristic points of TG/DTG curves: onset, peak and endset temperatures, mass loss and
/// maximal loss rate.
pub mod thermal_events;
/// eng
/// Noise-free multi-heating-rate data generated from a known rate law.
pub mod synthetic;
/// eng
/// Immutable analysis session threaded through the stages of a workflow.
pub mod session;
/// eng
/// Tabular console output of the analysis results.
pub mod pretty_print;
pub mod diagnostics;
pub mod kinetics_error;

#[cfg(test)]
mod isoconversional_tests;
#[cfg(test)]
mod model_fitting_tests;
#[cfg(test)]
mod validation_tests;

/// Universal gas constant, J/(mol·K)
pub const R: f64 = 8.314462618;
/// Clipping margin for conversion and guard for divisions
pub const EPS: f64 = 1e-6;
