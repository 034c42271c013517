//! # Rate laws
//!
//! All rate laws share the Arrhenius temperature dependence and differ in the conversion
//! function. Rates are returned per minute (the unit the fits work in); [`RateFunction::rate_per_s`]
//! converts for lifetime prediction and curve reconstruction.
//!
//! | Model | dα/dt | Parameters |
//! |-------|-------|------------|
//! | Šesták-Berggren | A·exp(−Eₐ/RT)·αᵐ·(1−α)ⁿ·(−ln(1−α))ᵖ | m, n, p, lnA |
//! | Kamal-Sourour | (k₁ + k₂·αᵐ)·(1−α)ⁿ | lnA₁, E₁, lnA₂, E₂, m, n |
//! | GAI | k·(1−α)ⁿ¹·(z₀ + αⁿ²) | lnA, E, n₁, z₀, n₂ |
//! | PAR | k₁·(1−α)ⁿ¹ + k₂·(1−α)ⁿ² | lnA₁, E₁, n₁, lnA₂, E₂, n₂ |
//! | NPA | Z(α)·exp(−Eₐ(α)/RT) | none |
//!
//! with kᵢ = exp(lnAᵢ)·exp(−Eᵢ/RT), A in 1/min and energies in J/mol.
//!
//! The Šesták-Berggren law takes Eₐ either as a single fixed value (CKA) or from an
//! isoconversional curve interpolated at α (GlobalFit); [`EaSource`] records which one.
//!
//! Conversion is clipped to [ε, 1−ε] before evaluation, and 1−α is floored at ε, so
//! logarithms and negative powers stay finite at the ends of the conversion range.
//!
//! Every parametric model also provides the analytic gradient of its rate with respect to
//! its fitted parameters; the fitter uses it as the Jacobian and the lifetime prediction
//! integrates it for the time sensitivities.
//!
//! [`RateFunction::rate_expr`] and [`RateFunction::gradient_expr`] give the same rate and
//! gradient as symbolic expressions in α and T, the form the RK45 solver integrates. The
//! expressions are not clipped: callers start the integration at α ≥ ε and stop it short
//! of α = 1.

use crate::Kinetics::isoconversional::EaCurve;
use crate::Kinetics::{EPS, R};
use crate::Utils::interpolation::{Pchip, interp_expr};
use RustedSciThe::symbolic::symbolic_engine::Expr;
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Display)]
pub enum ModelKind {
    #[strum(serialize = "GlobalFit")]
    GlobalFit,
    #[strum(serialize = "CKA")]
    Cka,
    #[strum(serialize = "Kamal-Sourour")]
    KamalSourour,
    #[strum(serialize = "GAI")]
    Gai,
    #[strum(serialize = "PAR")]
    Par,
    #[strum(serialize = "NPA")]
    Npa,
}

impl ModelKind {
    pub fn is_autocatalytic(&self) -> bool {
        matches!(
            self,
            ModelKind::KamalSourour | ModelKind::Gai | ModelKind::Par
        )
    }
}

/// (α clipped to [ε, 1−ε], 1−α floored at ε)
#[inline]
pub fn clip_alpha(alpha: f64) -> (f64, f64) {
    let a = alpha.clamp(EPS, 1.0 - EPS);
    (a, (1.0 - a).max(EPS))
}

#[inline]
fn arrhenius(ln_a: f64, e_j: f64, temp_k: f64) -> f64 {
    (ln_a - e_j / (R * temp_k)).exp()
}

fn arrhenius_expr(ln_a: f64, e_j: Expr, temp: &Expr) -> Expr {
    Expr::Exp(Box::new(
        Expr::Const(ln_a) - e_j / (Expr::Const(R) * temp.clone()),
    ))
}

fn pow_expr(base: Expr, exponent: f64) -> Expr {
    if exponent == 0.0 {
        return Expr::Const(1.0);
    }
    Expr::Pow(Box::new(base), Box::new(Expr::Const(exponent)))
}

fn one_minus(alpha: &Expr) -> Expr {
    Expr::Const(1.0) - alpha.clone()
}

#[enum_dispatch]
pub trait RateFunction {
    fn kind(&self) -> ModelKind;
    /// Names of the fitted parameters, in the order of [`RateFunction::params`].
    fn param_names(&self) -> Vec<&'static str>;
    fn params(&self) -> Vec<f64>;
    /// dα/dt in 1/min.
    fn rate_per_min(&self, alpha: f64, temp_k: f64) -> f64;
    /// ∂(dα/dt)/∂θ in 1/min for every fitted parameter θ; empty for non-parametric models.
    fn gradient_per_min(&self, alpha: f64, temp_k: f64) -> Vec<f64>;
    /// dα/dt in 1/min as an expression in the conversion `alpha` and temperature `temp`.
    fn rate_expr(&self, alpha: &Expr, temp: &Expr) -> Expr;
    /// [`RateFunction::gradient_per_min`] as expressions in `alpha` and `temp`.
    fn gradient_expr(&self, alpha: &Expr, temp: &Expr) -> Vec<Expr>;

    /// dα/dt in 1/s.
    fn rate_per_s(&self, alpha: f64, temp_k: f64) -> f64 {
        self.rate_per_min(alpha, temp_k) / 60.0
    }
}

/// Where the Šesták-Berggren law takes its activation energy from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EaSource {
    /// single value, J/mol
    Fixed { ea_j: f64 },
    /// Eₐ(α) interpolated linearly from the curve
    Isoconversional(EaCurve),
}

impl EaSource {
    pub fn ea_j(&self, alpha: f64) -> f64 {
        match self {
            EaSource::Fixed { ea_j } => *ea_j,
            EaSource::Isoconversional(curve) => curve.ea_j_at(alpha),
        }
    }

    pub fn ea_j_expr(&self, alpha: &Expr) -> Expr {
        match self {
            EaSource::Fixed { ea_j } => Expr::Const(*ea_j),
            EaSource::Isoconversional(curve) => {
                let ea_j: Vec<f64> = curve.ea_kj().iter().map(|e| e * 1000.0).collect();
                interp_expr(alpha, &curve.alphas(), &ea_j)
            }
        }
    }
}

/// Generalised Šesták-Berggren law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SestakBerggren {
    pub m: f64,
    pub n: f64,
    pub p: f64,
    /// ln of the prefactor in 1/min
    pub ln_a: f64,
    pub ea: EaSource,
}

impl SestakBerggren {
    pub fn new(m: f64, n: f64, p: f64, ln_a: f64, ea: EaSource) -> Self {
        Self { m, n, p, ln_a, ea }
    }

    /// Conversion function αᵐ(1−α)ⁿ(−ln(1−α))ᵖ.
    pub fn f_alpha(&self, alpha: f64) -> f64 {
        let (a, a1) = clip_alpha(alpha);
        a.powf(self.m) * a1.powf(self.n) * (-a1.ln()).powf(self.p)
    }
}

impl RateFunction for SestakBerggren {
    fn kind(&self) -> ModelKind {
        match self.ea {
            EaSource::Fixed { .. } => ModelKind::Cka,
            EaSource::Isoconversional(_) => ModelKind::GlobalFit,
        }
    }

    fn param_names(&self) -> Vec<&'static str> {
        vec!["m", "n", "p", "logA"]
    }

    fn params(&self) -> Vec<f64> {
        vec![self.m, self.n, self.p, self.ln_a]
    }

    fn rate_per_min(&self, alpha: f64, temp_k: f64) -> f64 {
        arrhenius(self.ln_a, self.ea.ea_j(alpha), temp_k) * self.f_alpha(alpha)
    }

    fn gradient_per_min(&self, alpha: f64, temp_k: f64) -> Vec<f64> {
        let (a, a1) = clip_alpha(alpha);
        let r = self.rate_per_min(alpha, temp_k);
        vec![r * a.ln(), r * a1.ln(), r * (-a1.ln()).ln(), r]
    }

    fn rate_expr(&self, alpha: &Expr, temp: &Expr) -> Expr {
        arrhenius_expr(self.ln_a, self.ea.ea_j_expr(alpha), temp)
            * pow_expr(alpha.clone(), self.m)
            * pow_expr(one_minus(alpha), self.n)
            * pow_expr(-Expr::ln(one_minus(alpha)), self.p)
    }

    fn gradient_expr(&self, alpha: &Expr, temp: &Expr) -> Vec<Expr> {
        let r = self.rate_expr(alpha, temp);
        vec![
            r.clone() * Expr::ln(alpha.clone()),
            r.clone() * Expr::ln(one_minus(alpha)),
            r.clone() * Expr::ln(-Expr::ln(one_minus(alpha))),
            r,
        ]
    }
}

/// Kamal-Sourour autocatalytic law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KamalSourour {
    pub ln_a1: f64,
    pub e1: f64,
    pub ln_a2: f64,
    pub e2: f64,
    pub m: f64,
    pub n: f64,
}

impl KamalSourour {
    pub fn from_params(p: &[f64]) -> Self {
        Self {
            ln_a1: p[0],
            e1: p[1],
            ln_a2: p[2],
            e2: p[3],
            m: p[4],
            n: p[5],
        }
    }
}

impl RateFunction for KamalSourour {
    fn kind(&self) -> ModelKind {
        ModelKind::KamalSourour
    }

    fn param_names(&self) -> Vec<&'static str> {
        vec!["logA1", "E1_J", "logA2", "E2_J", "m", "n"]
    }

    fn params(&self) -> Vec<f64> {
        vec![self.ln_a1, self.e1, self.ln_a2, self.e2, self.m, self.n]
    }

    fn rate_per_min(&self, alpha: f64, temp_k: f64) -> f64 {
        let (a, a1) = clip_alpha(alpha);
        let k1 = arrhenius(self.ln_a1, self.e1, temp_k);
        let k2 = arrhenius(self.ln_a2, self.e2, temp_k);
        (k1 + k2 * a.powf(self.m)) * a1.powf(self.n)
    }

    fn gradient_per_min(&self, alpha: f64, temp_k: f64) -> Vec<f64> {
        let (a, a1) = clip_alpha(alpha);
        let rt = R * temp_k;
        let k1 = arrhenius(self.ln_a1, self.e1, temp_k);
        let k2 = arrhenius(self.ln_a2, self.e2, temp_k);
        let a1n = a1.powf(self.n);
        let am = a.powf(self.m);
        let rate = (k1 + k2 * am) * a1n;
        vec![
            k1 * a1n,
            -k1 * a1n / rt,
            k2 * am * a1n,
            -k2 * am * a1n / rt,
            k2 * am * a.ln() * a1n,
            rate * a1.ln(),
        ]
    }

    fn rate_expr(&self, alpha: &Expr, temp: &Expr) -> Expr {
        let k1 = arrhenius_expr(self.ln_a1, Expr::Const(self.e1), temp);
        let k2 = arrhenius_expr(self.ln_a2, Expr::Const(self.e2), temp);
        (k1 + k2 * pow_expr(alpha.clone(), self.m)) * pow_expr(one_minus(alpha), self.n)
    }

    fn gradient_expr(&self, alpha: &Expr, temp: &Expr) -> Vec<Expr> {
        let rt = Expr::Const(R) * temp.clone();
        let k1 = arrhenius_expr(self.ln_a1, Expr::Const(self.e1), temp);
        let k2 = arrhenius_expr(self.ln_a2, Expr::Const(self.e2), temp);
        let a1n = pow_expr(one_minus(alpha), self.n);
        let k2_am_a1n = k2 * pow_expr(alpha.clone(), self.m) * a1n.clone();
        vec![
            k1.clone() * a1n.clone(),
            -(k1 * a1n) / rt.clone(),
            k2_am_a1n.clone(),
            -k2_am_a1n.clone() / rt,
            k2_am_a1n * Expr::ln(alpha.clone()),
            self.rate_expr(alpha, temp) * Expr::ln(one_minus(alpha)),
        ]
    }
}

/// Generalised autocatalytic model with an initiation term z₀.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gai {
    pub ln_a: f64,
    pub e: f64,
    pub n1: f64,
    pub z0: f64,
    pub n2: f64,
}

impl Gai {
    pub fn from_params(p: &[f64]) -> Self {
        Self {
            ln_a: p[0],
            e: p[1],
            n1: p[2],
            z0: p[3],
            n2: p[4],
        }
    }
}

impl RateFunction for Gai {
    fn kind(&self) -> ModelKind {
        ModelKind::Gai
    }

    fn param_names(&self) -> Vec<&'static str> {
        vec!["logA", "E_J", "n1", "z0", "n2"]
    }

    fn params(&self) -> Vec<f64> {
        vec![self.ln_a, self.e, self.n1, self.z0, self.n2]
    }

    fn rate_per_min(&self, alpha: f64, temp_k: f64) -> f64 {
        let (a, a1) = clip_alpha(alpha);
        arrhenius(self.ln_a, self.e, temp_k) * a1.powf(self.n1) * (self.z0 + a.powf(self.n2))
    }

    fn gradient_per_min(&self, alpha: f64, temp_k: f64) -> Vec<f64> {
        let (a, a1) = clip_alpha(alpha);
        let k = arrhenius(self.ln_a, self.e, temp_k);
        let a1n = a1.powf(self.n1);
        let an2 = a.powf(self.n2);
        let rate = k * a1n * (self.z0 + an2);
        vec![
            rate,
            -rate / (R * temp_k),
            rate * a1.ln(),
            k * a1n,
            k * a1n * an2 * a.ln(),
        ]
    }

    fn rate_expr(&self, alpha: &Expr, temp: &Expr) -> Expr {
        arrhenius_expr(self.ln_a, Expr::Const(self.e), temp)
            * pow_expr(one_minus(alpha), self.n1)
            * (Expr::Const(self.z0) + pow_expr(alpha.clone(), self.n2))
    }

    fn gradient_expr(&self, alpha: &Expr, temp: &Expr) -> Vec<Expr> {
        let k_a1n = arrhenius_expr(self.ln_a, Expr::Const(self.e), temp)
            * pow_expr(one_minus(alpha), self.n1);
        let rate = self.rate_expr(alpha, temp);
        vec![
            rate.clone(),
            -rate.clone() / (Expr::Const(R) * temp.clone()),
            rate * Expr::ln(one_minus(alpha)),
            k_a1n.clone(),
            k_a1n * pow_expr(alpha.clone(), self.n2) * Expr::ln(alpha.clone()),
        ]
    }
}

/// Two independent n-th order channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelReactions {
    pub ln_a1: f64,
    pub e1: f64,
    pub n1: f64,
    pub ln_a2: f64,
    pub e2: f64,
    pub n2: f64,
}

impl ParallelReactions {
    pub fn from_params(p: &[f64]) -> Self {
        Self {
            ln_a1: p[0],
            e1: p[1],
            n1: p[2],
            ln_a2: p[3],
            e2: p[4],
            n2: p[5],
        }
    }
}

impl RateFunction for ParallelReactions {
    fn kind(&self) -> ModelKind {
        ModelKind::Par
    }

    fn param_names(&self) -> Vec<&'static str> {
        vec!["logA1", "E1_J", "n1", "logA2", "E2_J", "n2"]
    }

    fn params(&self) -> Vec<f64> {
        vec![self.ln_a1, self.e1, self.n1, self.ln_a2, self.e2, self.n2]
    }

    fn rate_per_min(&self, alpha: f64, temp_k: f64) -> f64 {
        let (_, a1) = clip_alpha(alpha);
        arrhenius(self.ln_a1, self.e1, temp_k) * a1.powf(self.n1)
            + arrhenius(self.ln_a2, self.e2, temp_k) * a1.powf(self.n2)
    }

    fn gradient_per_min(&self, alpha: f64, temp_k: f64) -> Vec<f64> {
        let (_, a1) = clip_alpha(alpha);
        let rt = R * temp_k;
        let r1 = arrhenius(self.ln_a1, self.e1, temp_k) * a1.powf(self.n1);
        let r2 = arrhenius(self.ln_a2, self.e2, temp_k) * a1.powf(self.n2);
        vec![r1, -r1 / rt, r1 * a1.ln(), r2, -r2 / rt, r2 * a1.ln()]
    }

    fn rate_expr(&self, alpha: &Expr, temp: &Expr) -> Expr {
        arrhenius_expr(self.ln_a1, Expr::Const(self.e1), temp) * pow_expr(one_minus(alpha), self.n1)
            + arrhenius_expr(self.ln_a2, Expr::Const(self.e2), temp)
                * pow_expr(one_minus(alpha), self.n2)
    }

    fn gradient_expr(&self, alpha: &Expr, temp: &Expr) -> Vec<Expr> {
        let rt = Expr::Const(R) * temp.clone();
        let r1 = arrhenius_expr(self.ln_a1, Expr::Const(self.e1), temp)
            * pow_expr(one_minus(alpha), self.n1);
        let r2 = arrhenius_expr(self.ln_a2, Expr::Const(self.e2), temp)
            * pow_expr(one_minus(alpha), self.n2);
        vec![
            r1.clone(),
            -r1.clone() / rt.clone(),
            r1 * Expr::ln(one_minus(alpha)),
            r2.clone(),
            -r2.clone() / rt,
            r2 * Expr::ln(one_minus(alpha)),
        ]
    }
}

/// Rate built from a tabulated amplitude Z(α) (1/s) and Eₐ(α), both interpolated with PCHIP
/// (ln Z and Eₐ in J/mol) and extrapolated beyond the tabulated range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonParametricRate {
    ln_z: Pchip,
    ea_j: Pchip,
}

impl NonParametricRate {
    pub fn new(ln_z: Pchip, ea_j: Pchip) -> Self {
        Self { ln_z, ea_j }
    }

    /// Z(α) in 1/s.
    pub fn z(&self, alpha: f64) -> f64 {
        self.ln_z.eval(alpha).exp()
    }
}

impl RateFunction for NonParametricRate {
    fn kind(&self) -> ModelKind {
        ModelKind::Npa
    }

    fn param_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn params(&self) -> Vec<f64> {
        Vec::new()
    }

    fn rate_per_min(&self, alpha: f64, temp_k: f64) -> f64 {
        let (a, _) = clip_alpha(alpha);
        60.0 * self.z(a) * (-self.ea_j.eval(a) / (R * temp_k)).exp()
    }

    fn gradient_per_min(&self, _alpha: f64, _temp_k: f64) -> Vec<f64> {
        Vec::new()
    }

    fn rate_expr(&self, alpha: &Expr, temp: &Expr) -> Expr {
        // Z is per second
        Expr::Const(60.0)
            * Expr::Exp(Box::new(
                self.ln_z.expr(alpha) - self.ea_j.expr(alpha) / (Expr::Const(R) * temp.clone()),
            ))
    }

    fn gradient_expr(&self, _alpha: &Expr, _temp: &Expr) -> Vec<Expr> {
        Vec::new()
    }
}

/// Closed set of rate laws.
#[enum_dispatch(RateFunction)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RateModel {
    SestakBerggren(SestakBerggren),
    KamalSourour(KamalSourour),
    Gai(Gai),
    ParallelReactions(ParallelReactions),
    NonParametric(NonParametricRate),
}
