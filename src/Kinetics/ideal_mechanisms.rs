//! # Ideal solid-state reaction models
//!
//! Library of the classical conversion functions f(α) and comparison of a fitted model's
//! shape against them. Shapes are compared after normalisation by f(0.5) on a fixed α grid,
//! and mechanisms are ranked by the coefficient of determination of the normalised curves.
//!
//! Šesták-Berggren fits (GlobalFit, CKA) are compared through their (m, n, p). For the
//! autocatalytic models an equivalent shape is used: with α_max the conversion of the maximal
//! rate at 300 K, m = α_max, n = 1 − α_max, p = 0.

use crate::Kinetics::EPS;
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult};
use crate::Kinetics::model_fitting::FittedModel;
use crate::Kinetics::rate_laws::{ModelKind, RateFunction};
use crate::Utils::statistics::{linspace, r_squared};
use log::debug;
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum MechanismFamily {
    #[strum(serialize = "reaction order")]
    ReactionOrder,
    #[strum(serialize = "nucleation and growth")]
    NucleationGrowth,
    #[strum(serialize = "geometrical contraction")]
    Contraction,
    #[strum(serialize = "power law")]
    PowerLaw,
    #[strum(serialize = "diffusion")]
    Diffusion,
    #[strum(serialize = "chemical reaction")]
    ChemicalReaction,
    #[strum(serialize = "autocatalytic")]
    Autocatalytic,
}

/// Classical reaction models, displayed by their usual codes.
#[allow(non_camel_case_types)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Display, EnumString,
)]
pub enum IdealMechanism {
    F0,
    #[strum(serialize = "F0.5")]
    F0_5,
    F1,
    #[strum(serialize = "F1.5")]
    F1_5,
    F2,
    #[strum(serialize = "F2.5")]
    F2_5,
    F3,
    F4,
    A1,
    #[strum(serialize = "A1.5")]
    A1_5,
    A2,
    #[strum(serialize = "A2.5")]
    A2_5,
    A3,
    #[strum(serialize = "A3.5")]
    A3_5,
    A4,
    A5,
    R1,
    R2,
    R3,
    #[strum(serialize = "SC-RC")]
    SC_RC,
    #[strum(serialize = "P1/5")]
    P1_5,
    #[strum(serialize = "P1/4")]
    P1_4,
    #[strum(serialize = "P1/3")]
    P1_3,
    #[strum(serialize = "P3/5")]
    P3_5,
    #[strum(serialize = "P1/2")]
    P1_2,
    #[strum(serialize = "P2/3")]
    P2_3,
    #[strum(serialize = "P3/4")]
    P3_4,
    #[strum(serialize = "P4/5")]
    P4_5,
    #[strum(serialize = "P3/2")]
    P3_2,
    P2,
    D1,
    D2,
    #[strum(serialize = "D3-J")]
    D3_J,
    #[strum(serialize = "D4-GB")]
    D4_GB,
    #[strum(serialize = "D5-ZL")]
    D5_ZL,
    D6,
    D7,
    #[strum(serialize = "D-AJ")]
    D_AJ,
    #[strum(serialize = "D-AGB")]
    D_AGB,
    #[strum(serialize = "D10-Ash")]
    D10_Ash,
    #[strum(serialize = "SC-DA")]
    SC_DA,
    #[strum(serialize = "D11-Film")]
    D11_Film,
    #[strum(serialize = "SC-FD")]
    SC_FD,
    C1,
    C2,
    C4,
    C5,
    C6,
    C7,
    C8,
    C9,
    C10,
    #[strum(serialize = "PT(1,1)")]
    PT_1_1,
    #[strum(serialize = "AC(0.5,1)")]
    AC_05_1,
    #[strum(serialize = "AC(1.5,1)")]
    AC_15_1,
    #[strum(serialize = "AC(2,1)")]
    AC_2_1,
    #[strum(serialize = "AC(1,0.5)")]
    AC_1_05,
    #[strum(serialize = "AC(1,1.5)")]
    AC_1_15,
    #[strum(serialize = "AC(1,2)")]
    AC_1_2,
    #[strum(serialize = "AC(0.5,2)")]
    AC_05_2,
    #[strum(serialize = "AC(2,0.5)")]
    AC_2_05,
    #[strum(serialize = "AC(2,2)")]
    AC_2_2,
    #[strum(serialize = "SB(0.5,0.5,1)")]
    SB_05_05_1,
    #[strum(serialize = "SB(0.5,1,1)")]
    SB_05_1_1,
    #[strum(serialize = "SB(1,0.5,1)")]
    SB_1_05_1,
    #[strum(serialize = "SB(1,1,0.5)")]
    SB_1_1_05,
    #[strum(serialize = "SB(1,1,1)")]
    SB_1_1_1,
    #[strum(serialize = "SB(1,1,2)")]
    SB_1_1_2,
}

/// m·(1−α)·(−ln(1−α))^(1−1/m)
fn avrami(n: f64, a: f64) -> f64 {
    n * (1.0 - a) * (-(1.0 - a).ln()).powf(1.0 - 1.0 / n)
}

/// αᵐ(1−α)ⁿ(−ln(1−α))ᵖ
fn sestak(m: f64, n: f64, p: f64, a: f64) -> f64 {
    a.powf(m) * (1.0 - a).powf(n) * (-(1.0 - a).ln()).powf(p)
}

/// (1−α)^(1/3)
fn cube_root_left(a: f64) -> f64 {
    (1.0 - a).powf(1.0 / 3.0)
}

impl IdealMechanism {
    pub fn code(&self) -> String {
        self.to_string()
    }

    pub fn name(&self) -> &'static str {
        use IdealMechanism::*;
        match self {
            F0 => "Zero-Order",
            F0_5 => "Reaction Order (n=0.5)",
            F1 => "First-Order / Mampel",
            F1_5 => "Reaction Order (n=1.5)",
            F2 => "Second-Order",
            F2_5 => "Reaction Order (n=2.5)",
            F3 => "Third-Order",
            F4 => "Fourth-Order",
            A1 => "Avrami-Erofeev (n=1, equiv. F1)",
            A1_5 => "Avrami-Erofeev (n=1.5)",
            A2 => "Avrami-Erofeev (n=2)",
            A2_5 => "Avrami-Erofeev (n=2.5)",
            A3 => "Avrami-Erofeev (n=3)",
            A3_5 => "Avrami-Erofeev (n=3.5)",
            A4 => "Avrami-Erofeev (n=4)",
            A5 => "Avrami-Erofeev (n=5)",
            R1 => "Contracting Line / Zero-Order",
            R2 => "Contracting Area / Cylinder",
            R3 => "Contracting Volume / Sphere",
            SC_RC => "Shrinking Core (Reaction)",
            P1_5 => "Power Law (n=1/5)",
            P1_4 => "Power Law (n=1/4)",
            P1_3 => "Power Law (n=1/3)",
            P3_5 => "Power Law (n=3/5)",
            P1_2 => "Power Law (n=1/2)",
            P2_3 => "Power Law (n=2/3)",
            P3_4 => "Power Law (n=3/4)",
            P4_5 => "Power Law (n=4/5)",
            P3_2 => "Power Law (n=3/2)",
            P2 => "Power Law (n=2)",
            D1 => "1D Diffusion",
            D2 => "2D Diffusion (Valensi)",
            D3_J => "3D Diffusion (Jander)",
            D4_GB => "3D Diffusion (Ginstling-Brounshtein)",
            D5_ZL => "3D Diffusion (Zhuravlev-Lesokine)",
            D6 => "3D Diffusion (Variant D3d)",
            D7 => "3D Diffusion (Variant D3g)",
            D_AJ => "Anti-Jander",
            D_AGB => "Anti-Ginstling-Brounshtein",
            D10_Ash | SC_DA => "Shrinking Core (Ash Diffusion)",
            D11_Film | SC_FD => "Shrinking Core (Film Diffusion)",
            C1 => "Chemical Reaction (C1)",
            C2 => "Chemical Reaction (C2)",
            C4 => "Chemical Reaction (C4)",
            C5 => "Chemical Reaction (C5)",
            C6 => "Chemical Reaction (C6)",
            C7 => "Chemical Reaction (C7)",
            C8 => "Chemical Reaction (C8)",
            C9 => "Chemical Reaction (C9)",
            C10 => "Chemical Reaction (C10)",
            PT_1_1 => "Prout-Tompkins (m=1, n=1)",
            AC_05_1 => "Autocatalytic (m=0.5, n=1)",
            AC_15_1 => "Autocatalytic (m=1.5, n=1)",
            AC_2_1 => "Autocatalytic (m=2, n=1)",
            AC_1_05 => "Autocatalytic (m=1, n=0.5)",
            AC_1_15 => "Autocatalytic (m=1, n=1.5)",
            AC_1_2 => "Autocatalytic (m=1, n=2)",
            AC_05_2 => "Autocatalytic (m=0.5, n=2)",
            AC_2_05 => "Autocatalytic (m=2, n=0.5)",
            AC_2_2 => "Autocatalytic (m=2, n=2)",
            SB_05_05_1 => "Sestak-Berggren (0.5,0.5,1)",
            SB_05_1_1 => "Sestak-Berggren (0.5,1,1)",
            SB_1_05_1 => "Sestak-Berggren (1,0.5,1)",
            SB_1_1_05 => "Sestak-Berggren (1,1,0.5)",
            SB_1_1_1 => "Sestak-Berggren (1,1,1)",
            SB_1_1_2 => "Sestak-Berggren (1,1,2)",
        }
    }

    pub fn family(&self) -> MechanismFamily {
        use IdealMechanism::*;
        match self {
            F0 | F0_5 | F1 | F1_5 | F2 | F2_5 | F3 | F4 => MechanismFamily::ReactionOrder,
            A1 | A1_5 | A2 | A2_5 | A3 | A3_5 | A4 | A5 => MechanismFamily::NucleationGrowth,
            R1 | R2 | R3 | SC_RC => MechanismFamily::Contraction,
            P1_5 | P1_4 | P1_3 | P3_5 | P1_2 | P2_3 | P3_4 | P4_5 | P3_2 | P2 => {
                MechanismFamily::PowerLaw
            }
            D1 | D2 | D3_J | D4_GB | D5_ZL | D6 | D7 | D_AJ | D_AGB | D10_Ash | SC_DA
            | D11_Film | SC_FD => MechanismFamily::Diffusion,
            C1 | C2 | C4 | C5 | C6 | C7 | C8 | C9 | C10 => MechanismFamily::ChemicalReaction,
            _ => MechanismFamily::Autocatalytic,
        }
    }

    /// f(α) as a readable expression, `a` standing for α
    pub fn formula(&self) -> &'static str {
        use IdealMechanism::*;
        match self {
            F0 | R1 | D11_Film | SC_FD => "1",
            F0_5 => "(1-a)^(1/2)",
            F1 | A1 => "(1-a)",
            F1_5 => "(1-a)^(3/2)",
            F2 => "(1-a)^2",
            F2_5 => "(1-a)^(5/2)",
            F3 => "(1-a)^3",
            F4 => "(1-a)^4",
            A1_5 => "1.5*(1-a)*(-ln(1-a))^(1/3)",
            A2 => "2*(1-a)*(-ln(1-a))^(1/2)",
            A2_5 => "2.5*(1-a)*(-ln(1-a))^(3/5)",
            A3 => "3*(1-a)*(-ln(1-a))^(2/3)",
            A3_5 => "3.5*(1-a)*(-ln(1-a))^(5/7)",
            A4 => "4*(1-a)*(-ln(1-a))^(3/4)",
            A5 => "5*(1-a)*(-ln(1-a))^(4/5)",
            R2 => "2*(1-a)^(1/2)",
            R3 | SC_RC => "3*(1-a)^(2/3)",
            P1_5 => "5*a^(4/5)",
            P1_4 => "4*a^(3/4)",
            P1_3 => "3*a^(2/3)",
            P3_5 => "(5/3)*a^(2/5)",
            P1_2 => "2*a^(1/2)",
            P2_3 => "(3/2)*a^(1/3)",
            P3_4 => "(4/3)*a^(1/4)",
            P4_5 => "(5/4)*a^(1/5)",
            P3_2 => "(2/3)*a^(-1/2)",
            P2 => "(1/2)*a^(-1)",
            D1 => "(1/2)*a^(-1)",
            D2 => "(-ln(1-a))^(-1)",
            D3_J => "(3/2)*(1-a)^(2/3)*(1-(1-a)^(1/3))^(-1)",
            D4_GB | D10_Ash | SC_DA => "(3/2)*((1-a)^(-1/3)-1)^(-1)",
            D5_ZL => "(3/2)*((1+a)^(1/3)-1)^(-1)",
            D6 => "(3/2)*(1-a)^(1/3)*(1-(1-a)^(1/3))^(-1)",
            D7 => "6*(1-a)*(-ln(1-a))^(1/2)*(1-(1-a)^(1/3))^(-1)",
            D_AJ => "(3/2)*(1-(1-a)^(1/3))^(-1)",
            D_AGB => "(3/2)*(1-a)^(-1/3)",
            C1 => "(3/2)*(1-a)^(1/3)",
            C2 => "4*(1-a)^(3/4)",
            C4 => "(1/2)*(1-a)^(-1/2)",
            C5 => "(1/3)*(1-a)^(-2/3)",
            C6 => "(1/4)*(1-a)^(-3/4)",
            C7 => "(1/2)*(1-a)^(-1)",
            C8 => "(1/3)*(1-a)^(-1)",
            C9 => "(1/5)*(1-a)^(-4/5)",
            C10 => "(1/6)*(1-a)^(-5/6)",
            PT_1_1 => "a*(1-a)",
            AC_05_1 => "a^(1/2)*(1-a)",
            AC_15_1 => "a^(3/2)*(1-a)",
            AC_2_1 => "a^2*(1-a)",
            AC_1_05 => "a*(1-a)^(1/2)",
            AC_1_15 => "a*(1-a)^(3/2)",
            AC_1_2 => "a*(1-a)^2",
            AC_05_2 => "a^(1/2)*(1-a)^2",
            AC_2_05 => "a^2*(1-a)^(1/2)",
            AC_2_2 => "a^2*(1-a)^2",
            SB_05_05_1 => "a^(1/2)*(1-a)^(1/2)*(-ln(1-a))",
            SB_05_1_1 => "a^(1/2)*(1-a)*(-ln(1-a))",
            SB_1_05_1 => "a*(1-a)^(1/2)*(-ln(1-a))",
            SB_1_1_05 => "a*(1-a)*(-ln(1-a))^(1/2)",
            SB_1_1_1 => "a*(1-a)*(-ln(1-a))",
            SB_1_1_2 => "a*(1-a)*(-ln(1-a))^2",
        }
    }

    /// f(α); may be infinite or NaN at α = 0 or 1 for the singular models.
    pub fn f(&self, a: f64) -> f64 {
        use IdealMechanism::*;
        let b = 1.0 - a;
        match self {
            F0 | R1 | D11_Film | SC_FD => 1.0,
            F0_5 => b.sqrt(),
            F1 | A1 => b,
            F1_5 => b.powf(1.5),
            F2 => b.powi(2),
            F2_5 => b.powf(2.5),
            F3 => b.powi(3),
            F4 => b.powi(4),
            A1_5 => avrami(1.5, a),
            A2 => avrami(2.0, a),
            A2_5 => avrami(2.5, a),
            A3 => avrami(3.0, a),
            A3_5 => avrami(3.5, a),
            A4 => avrami(4.0, a),
            A5 => avrami(5.0, a),
            R2 => 2.0 * b.sqrt(),
            R3 | SC_RC => 3.0 * b.powf(2.0 / 3.0),
            P1_5 => 5.0 * a.powf(0.8),
            P1_4 => 4.0 * a.powf(0.75),
            P1_3 => 3.0 * a.powf(2.0 / 3.0),
            P3_5 => 5.0 / 3.0 * a.powf(0.4),
            P1_2 => 2.0 * a.sqrt(),
            P2_3 => 1.5 * a.powf(1.0 / 3.0),
            P3_4 => 4.0 / 3.0 * a.powf(0.25),
            P4_5 => 1.25 * a.powf(0.2),
            P3_2 => 2.0 / 3.0 * a.powf(-0.5),
            P2 | D1 => 0.5 / a,
            D2 => 1.0 / (-b.ln()),
            D3_J => 1.5 * b.powf(2.0 / 3.0) / (1.0 - cube_root_left(a)),
            D4_GB | D10_Ash | SC_DA => 1.5 / (b.powf(-1.0 / 3.0) - 1.0),
            D5_ZL => 1.5 / ((1.0 + a).powf(1.0 / 3.0) - 1.0),
            D6 => 1.5 * cube_root_left(a) / (1.0 - cube_root_left(a)),
            D7 => 6.0 * b * (-b.ln()).sqrt() / (1.0 - cube_root_left(a)),
            D_AJ => 1.5 / (1.0 - cube_root_left(a)),
            D_AGB => 1.5 * b.powf(-1.0 / 3.0),
            C1 => 1.5 * cube_root_left(a),
            C2 => 4.0 * b.powf(0.75),
            C4 => 0.5 * b.powf(-0.5),
            C5 => b.powf(-2.0 / 3.0) / 3.0,
            C6 => 0.25 * b.powf(-0.75),
            C7 => 0.5 / b,
            C8 => 1.0 / (3.0 * b),
            C9 => 0.2 * b.powf(-0.8),
            C10 => b.powf(-5.0 / 6.0) / 6.0,
            PT_1_1 => sestak(1.0, 1.0, 0.0, a),
            AC_05_1 => sestak(0.5, 1.0, 0.0, a),
            AC_15_1 => sestak(1.5, 1.0, 0.0, a),
            AC_2_1 => sestak(2.0, 1.0, 0.0, a),
            AC_1_05 => sestak(1.0, 0.5, 0.0, a),
            AC_1_15 => sestak(1.0, 1.5, 0.0, a),
            AC_1_2 => sestak(1.0, 2.0, 0.0, a),
            AC_05_2 => sestak(0.5, 2.0, 0.0, a),
            AC_2_05 => sestak(2.0, 0.5, 0.0, a),
            AC_2_2 => sestak(2.0, 2.0, 0.0, a),
            SB_05_05_1 => sestak(0.5, 0.5, 1.0, a),
            SB_05_1_1 => sestak(0.5, 1.0, 1.0, a),
            SB_1_05_1 => sestak(1.0, 0.5, 1.0, a),
            SB_1_1_05 => sestak(1.0, 1.0, 0.5, a),
            SB_1_1_1 => sestak(1.0, 1.0, 1.0, a),
            SB_1_1_2 => sestak(1.0, 1.0, 2.0, a),
        }
    }

    /// f(α)/f(0.5), NaN everywhere when f(0.5) vanishes.
    pub fn normalised(&self, a: f64) -> f64 {
        normalise(|x| self.f(x), a)
    }

    pub fn pretty_print() {
        let mut table = Table::new();
        table.add_row(row!["code", "name", "family", "f(a)"]);
        for m in IdealMechanism::iter() {
            table.add_row(row![m.code(), m.name(), m.family(), m.formula()]);
        }
        table.printstd();
    }
}

fn normalise<F: Fn(f64) -> f64>(f: F, a: f64) -> f64 {
    let f05 = f(0.5);
    if f05.abs() > EPS { f(a) / f05 } else { f64::NAN }
}

/// Exponents of a Šesták-Berggren shape αᵐ(1−α)ⁿ(−ln(1−α))ᵖ.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeExponents {
    pub m: f64,
    pub n: f64,
    pub p: f64,
}

impl ShapeExponents {
    pub fn f(&self, a: f64) -> f64 {
        sestak(self.m, self.n, self.p, a)
    }

    /// Shape of a fitted model. Šesták-Berggren fits use their exponents, autocatalytic fits
    /// the equivalent shape; NPA has no closed-form shape.
    pub fn from_fit(fitted: &FittedModel) -> KineticsResult<Self> {
        match fitted.kind {
            ModelKind::GlobalFit | ModelKind::Cka => {
                let get = |name: &str| {
                    fitted.raw_parameter(name).ok_or_else(|| {
                        KineticsError::Configuration(format!(
                            "{} fit has no parameter {}",
                            fitted.kind, name
                        ))
                    })
                };
                Ok(Self {
                    m: get("m")?,
                    n: get("n")?,
                    p: get("p")?,
                })
            }
            ModelKind::KamalSourour | ModelKind::Gai | ModelKind::Par => {
                let alpha_max = alpha_of_max_rate(fitted, 300.0);
                Ok(Self {
                    m: alpha_max,
                    n: 1.0 - alpha_max,
                    p: 0.0,
                })
            }
            ModelKind::Npa => Err(KineticsError::Configuration(
                "NPA has no closed-form conversion function to compare".to_string(),
            )),
        }
    }
}

/// Conversion of the maximal rate at `temp_k` on 200 points over [0.01, 0.99];
/// 0.5 when no rate is positive.
pub fn alpha_of_max_rate(fitted: &FittedModel, temp_k: f64) -> f64 {
    linspace(0.01, 0.99, 200)
        .into_iter()
        .map(|a| (a, fitted.model.rate_per_min(a, temp_k)))
        .filter(|(_, r)| r.is_finite() && *r > 0.0)
        .fold(None, |best: Option<(f64, f64)>, (a, r)| match best {
            Some((_, rb)) if rb >= r => best,
            _ => Some((a, r)),
        })
        .map(|(a, _)| a)
        .unwrap_or(0.5)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismMatch {
    pub mechanism: IdealMechanism,
    pub r_squared: f64,
}

/// Normalised shapes on the comparison grid and the resulting ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismComparison {
    pub alphas: Vec<f64>,
    pub experimental: Vec<f64>,
    pub ideal: Vec<(IdealMechanism, Vec<f64>)>,
    /// best match first, undefined R² last
    pub ranking: Vec<MechanismMatch>,
}

/// Compares a shape against the given mechanisms (all of them when `mechanisms` is empty).
pub fn compare(shape: ShapeExponents, mechanisms: &[IdealMechanism]) -> MechanismComparison {
    let selected: Vec<IdealMechanism> = if mechanisms.is_empty() {
        IdealMechanism::iter().collect()
    } else {
        mechanisms.to_vec()
    };
    let alphas = linspace(0.05, 0.95, 19);
    let experimental: Vec<f64> = alphas.iter().map(|&a| normalise(|x| shape.f(x), a)).collect();
    let mut ideal = Vec::with_capacity(selected.len());
    let mut ranking = Vec::with_capacity(selected.len());
    for m in selected {
        let curve: Vec<f64> = alphas.iter().map(|&a| m.normalised(a)).collect();
        let r2 = r_squared(&experimental, &curve);
        debug!("{}: R2 = {:.4}", m, r2);
        ranking.push(MechanismMatch {
            mechanism: m,
            r_squared: r2,
        });
        ideal.push((m, curve));
    }
    ranking.sort_by(|a, b| match (a.r_squared.is_nan(), b.r_squared.is_nan()) {
        (false, false) => b.r_squared.total_cmp(&a.r_squared),
        (x, y) => x.cmp(&y),
    });
    MechanismComparison {
        alphas,
        experimental,
        ideal,
        ranking,
    }
}

/// Ranks the mechanisms against the shape of a fitted model.
pub fn compare_fit(
    fitted: &FittedModel,
    mechanisms: &[IdealMechanism],
) -> KineticsResult<MechanismComparison> {
    Ok(compare(ShapeExponents::from_fit(fitted)?, mechanisms))
}
