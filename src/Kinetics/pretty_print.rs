//! Console tables for the results of every stage.

use crate::Kinetics::cross_validation::CrossValidationReport;
use crate::Kinetics::curve_reconstruction::ReconstructedCurve;
use crate::Kinetics::diagnostics::Diagnostics;
use crate::Kinetics::ideal_mechanisms::MechanismComparison;
use crate::Kinetics::isoconversional::{EaCurve, IsoconversionalResult};
use crate::Kinetics::model_fitting::FittedModel;
use crate::Kinetics::npa::NpaResult;
use crate::Kinetics::thermal_events::{DscEventTable, ThermalEventTable};
use crate::Kinetics::uncertainty::PredictionCurve;
use prettytable::{Cell, Row, Table, row};

fn fmt(v: f64, digits: usize) -> String {
    if v.is_finite() {
        format!("{:.*}", digits, v)
    } else {
        "-".to_string()
    }
}

/// Anything that can be rendered as a prettytable.
pub trait PrettyPrint {
    fn table(&self) -> Table;

    fn pretty_print(&self) {
        self.table().printstd();
    }
}

impl PrettyPrint for EaCurve {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row![format!("{} activation energy", self.method())]);
        table.add_row(row!["alpha", "Ea, kJ/mol", "R2", "StdErr, kJ/mol"]);
        for p in self.points() {
            table.add_row(row![
                fmt(p.alpha, 3),
                fmt(p.ea_kj, 2),
                fmt(p.r_squared, 4),
                fmt(p.std_err_kj, 2)
            ]);
        }
        table.add_row(row![
            "mean",
            fmt(self.mean_ea_kj(), 2),
            "",
            fmt(self.std_ea_kj(), 2)
        ]);
        table
    }
}

impl PrettyPrint for IsoconversionalResult {
    /// α-T table: one column per heating rate.
    fn table(&self) -> Table {
        let mut table = Table::new();
        let mut header = vec![Cell::new("alpha")];
        if let Some(first) = self.alpha_temperature.first() {
            for (beta, _) in &first.temperatures {
                header.push(Cell::new(&format!("T at {} K/min", beta)));
            }
        }
        table.add_row(Row::new(header));
        for r in &self.alpha_temperature {
            let mut cells = vec![Cell::new(&fmt(r.alpha, 3))];
            for (_, t) in &r.temperatures {
                cells.push(Cell::new(&t.map(|t| fmt(t, 2)).unwrap_or_else(|| "-".to_string())));
            }
            table.add_row(Row::new(cells));
        }
        table
    }
}

impl PrettyPrint for FittedModel {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row![format!(
            "{} fit, alpha in [{}, {}]",
            self.kind, self.alpha_range.0, self.alpha_range.1
        )]);
        table.add_row(row!["parameter", "value", "std. error", "unit"]);
        for d in &self.derived {
            table.add_row(row![d.name, format!("{:.5e}", d.value), format!("{:.3e}", d.std_err), d.unit]);
        }
        table.add_row(row!["R2", fmt(self.r_squared, 5), "", ""]);
        table.add_row(row!["samples", self.n_samples, "", ""]);
        table.add_row(row!["cost", format!("{:.4e}", self.cost), "", ""]);
        table
    }
}

impl PrettyPrint for NpaResult {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row!["alpha", "log10 Z, 1/s", "samples"]);
        for b in &self.bins {
            table.add_row(row![fmt(b.alpha, 4), fmt(b.log10_z, 4), b.n_samples]);
        }
        table
    }
}

impl PrettyPrint for CrossValidationReport {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row![format!("{} leave-one-out validation", self.kind)]);
        table.add_row(row!["held-out beta, K/min", "SSE", "relative SSE", "points", "status"]);
        for f in &self.folds {
            match &f.result {
                Ok(fit) => table.add_row(row![
                    f.held_out_beta,
                    format!("{:.4e}", fit.sse),
                    format!("{:.4e}", fit.relative_sse),
                    fit.n_points,
                    "ok"
                ]),
                Err(reason) => table.add_row(row![f.held_out_beta, "-", "-", "-", reason]),
            };
        }
        table.add_row(row![
            "mean +- std",
            format!("{:.4e} +- {:.4e}", self.mean_sse(), self.std_sse()),
            format!("{:.4e}", self.mean_relative_sse()),
            "",
            ""
        ]);
        for p in self.parameter_spread() {
            table.add_row(row![p.name, format!("{:.5e} +- {:.3e}", p.mean, p.std), "", "", ""]);
        }
        table
    }
}

impl PrettyPrint for PredictionCurve {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row![format!(
            "{} lifetime at {} K",
            self.model_kind, self.temperature_k
        )]);
        if self.has_confidence_interval {
            table.add_row(row!["alpha", "t, days", "95% CI low", "95% CI high"]);
        } else {
            table.add_row(row!["alpha", "t, days"]);
        }
        for p in &self.points {
            if self.has_confidence_interval {
                table.add_row(row![
                    fmt(p.alpha, 3),
                    format!("{:.4e}", p.t_days),
                    format!("{:.4e}", p.ci_lower_days),
                    format!("{:.4e}", p.ci_upper_days)
                ]);
            } else {
                table.add_row(row![fmt(p.alpha, 3), format!("{:.4e}", p.t_days)]);
            }
        }
        table
    }
}

impl PrettyPrint for ReconstructedCurve {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row![format!(
            "{} at {} K/min: RMSE alpha {:.4}, RMSE TG {:.3} %",
            self.model_kind, self.beta, self.rmse_alpha, self.rmse_tg
        )]);
        table.add_row(row!["T, K", "alpha", "TG, %"]);
        // every tenth point keeps the console output readable
        for p in self.points.iter().step_by(10) {
            table.add_row(row![fmt(p.temp_k, 2), fmt(p.alpha_model, 4), fmt(p.tg_pct_model, 3)]);
        }
        table
    }
}

impl PrettyPrint for ThermalEventTable {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row![
            "beta, K/min",
            "T onset, K",
            "T peak, K",
            "T end, K",
            "ML, %",
            "L max, %/min"
        ]);
        for r in &self.rows {
            match &r.result {
                Ok(e) => table.add_row(row![
                    r.beta,
                    fmt(e.t_onset_k, 2),
                    fmt(e.t_peak_k, 2),
                    fmt(e.t_end_k, 2),
                    fmt(e.mass_loss_pct, 3),
                    fmt(e.l_max_pct_min, 4)
                ]),
                Err(reason) => table.add_row(row![r.beta, reason, "", "", "", ""]),
            };
        }
        table
    }
}

impl PrettyPrint for DscEventTable {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row![
            "beta, K/min",
            "T onset, K",
            "T peak, K",
            "T end, K",
            "peak, W/g",
            "dH, J/g"
        ]);
        for r in &self.rows {
            match &r.result {
                Ok(e) => table.add_row(row![
                    r.beta,
                    fmt(e.t_onset_k, 2),
                    fmt(e.t_peak_k, 2),
                    fmt(e.t_end_k, 2),
                    fmt(e.peak_w_g, 4),
                    fmt(e.enthalpy_j_g, 2)
                ]),
                Err(reason) => table.add_row(row![r.beta, reason, "", "", "", ""]),
            };
        }
        table
    }
}

impl PrettyPrint for MechanismComparison {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row!["rank", "code", "name", "R2"]);
        for (i, m) in self.ranking.iter().enumerate() {
            table.add_row(row![i + 1, m.mechanism, m.mechanism.name(), fmt(m.r_squared, 4)]);
        }
        table
    }
}

impl PrettyPrint for Diagnostics {
    fn table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(row!["level", "stage", "message"]);
        for d in self.entries() {
            table.add_row(row![d.level, d.stage, d.message]);
        }
        table
    }
}
