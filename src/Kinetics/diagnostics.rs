//! Diagnostics returned next to every stage result.
//!
//! Conditions that do not stop a computation but change how its result should be read
//! (a fallback was taken, pairs were skipped, a covariance is unusable) are collected
//! here instead of being printed, and mirrored to the log at the same level.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum DiagnosticLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// stage that emitted the message, e.g. "CKA" or "Vyazovkin"
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        info!("[{}] {}", stage, message);
        self.entries.push(Diagnostic {
            level: DiagnosticLevel::Info,
            stage: stage.to_string(),
            message,
        });
    }

    pub fn warning(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", stage, message);
        self.entries.push(Diagnostic {
            level: DiagnosticLevel::Warning,
            stage: stage.to_string(),
            message,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A stage result together with the diagnostics produced while computing it.
#[derive(Debug, Clone)]
pub struct Analysis<T> {
    pub value: T,
    pub diagnostics: Diagnostics,
}

impl<T> Analysis<T> {
    pub fn new(value: T, diagnostics: Diagnostics) -> Self {
        Self { value, diagnostics }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Analysis<U> {
        Analysis {
            value: f(self.value),
            diagnostics: self.diagnostics,
        }
    }
}
