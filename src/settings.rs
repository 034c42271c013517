//! # Analysis settings
//!
//! ## Purpose
//! Central place for the numerical knobs of a kinetic analysis: the α window and grid, the
//! isoconversional method, optimiser settings, RK45 tolerances, the NPA bin count,
//! the prediction temperature and the log level.
//!
//! ## Architecture
//! - **AnalysisSettings**: serializable settings structure with defaults
//! - **SettingsManager**: loads/saves the settings from a JSON file
//! - **Global Access**: process-wide manager behind `OnceLock<Mutex<_>>`
//!
//! ## Configuration Format
//! ```json
//! {
//!   "alpha_min": 0.1,
//!   "alpha_max": 0.9,
//!   "alpha_step": 0.05,
//!   "iso_method": "Friedman",
//!   "npa_bins": 50,
//!   "prediction_temperature_k": 298.15,
//!   "log_level": "info",
//!   ...
//! }
//! ```
//! A missing or unreadable file falls back to the defaults.

use crate::Kinetics::isoconversional::IsoMethod;
use crate::Kinetics::kinetics_error::{KineticsError, KineticsResult, check_alpha_range, check_temperature};
use crate::Kinetics::npa::DEFAULT_NPA_BINS;
use crate::Utils::LM_optimization::LMSettings;
use crate::Utils::logger::{init_logger, parse_level};
use crate::Utils::ode::Tolerances;
use crate::Utils::statistics::arange_inclusive;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, OnceLock};

pub const DEFAULT_CONFIG_FILE: &str = "kinetics_settings.json";
/// finest isoconversional grid spacing; the grid is rounded to four decimals
pub const MIN_ALPHA_STEP: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// fitting window and isoconversional grid, 0 < alpha_min < alpha_max < 1
    pub alpha_min: f64,
    pub alpha_max: f64,
    pub alpha_step: f64,
    pub iso_method: IsoMethod,
    /// iteration budget of the Vyazovkin minimisation
    pub vyazovkin_max_iters: u64,
    /// temperature integrals of the Vyazovkin method
    pub vyazovkin_tolerances: Tolerances,
    pub fit: LMSettings,
    pub npa_bins: usize,
    /// conversion-time integral of the lifetime prediction
    pub prediction_tolerances: Tolerances,
    /// curve reconstruction
    pub ode: Tolerances,
    pub prediction_temperature_k: f64,
    pub log_level: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            alpha_min: 0.1,
            alpha_max: 0.9,
            alpha_step: 0.05,
            iso_method: IsoMethod::Friedman,
            vyazovkin_max_iters: 500,
            vyazovkin_tolerances: Tolerances::new(1e-8, 1e-10),
            fit: LMSettings::default(),
            npa_bins: DEFAULT_NPA_BINS,
            prediction_tolerances: Tolerances::new(1e-8, 1e-12),
            ode: Tolerances::default(),
            prediction_temperature_k: 298.15,
            log_level: "info".to_string(),
        }
    }
}

impl AnalysisSettings {
    /// Conversion targets of the isoconversional analysis.
    pub fn iso_alphas(&self) -> Vec<f64> {
        arange_inclusive(self.alpha_min, self.alpha_max, self.alpha_step)
    }

    pub fn validate(&self) -> KineticsResult<()> {
        check_alpha_range(self.alpha_min, self.alpha_max)?;
        if !(self.alpha_step >= MIN_ALPHA_STEP && self.alpha_step < self.alpha_max - self.alpha_min)
        {
            return Err(KineticsError::Configuration(format!(
                "alpha step {} does not fit into [{}, {}]",
                self.alpha_step, self.alpha_min, self.alpha_max
            )));
        }
        if self.npa_bins == 0 {
            return Err(KineticsError::Configuration(
                "NPA needs at least one bin".to_string(),
            ));
        }
        check_temperature(self.prediction_temperature_k)
    }

    /// Initialises the terminal logger at the configured level.
    pub fn init_logging(&self) {
        init_logger(parse_level(&self.log_level));
    }
}

/// Loads, updates and persists [`AnalysisSettings`].
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings: AnalysisSettings,
    config_file: String,
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsManager {
    /// Manager bound to `kinetics_settings.json` in the working directory.
    pub fn new() -> Self {
        Self::with_config_file(DEFAULT_CONFIG_FILE)
    }

    pub fn with_config_file(config_file: &str) -> Self {
        let settings = Self::load_config(config_file).unwrap_or_else(|e| {
            warn!("settings from {} ignored: {}", config_file, e);
            AnalysisSettings::default()
        });
        Self {
            settings,
            config_file: config_file.to_string(),
        }
    }

    /// Settings stored in `config_file`, defaults when the file does not exist.
    /// A file that parses but fails validation is an error.
    pub fn load_config(config_file: &str) -> KineticsResult<AnalysisSettings> {
        if !Path::new(config_file).exists() {
            return Ok(AnalysisSettings::default());
        }
        let content = fs::read_to_string(config_file)?;
        let settings: AnalysisSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_config(&self) -> KineticsResult<()> {
        let content = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.config_file, content)?;
        info!("settings saved to {}", self.config_file);
        Ok(())
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Replaces the settings after validation and saves them.
    pub fn update(&mut self, settings: AnalysisSettings) -> KineticsResult<()> {
        settings.validate()?;
        self.settings = settings;
        self.save_config()
    }

    pub fn set_alpha_range(&mut self, amin: f64, amax: f64, step: f64) -> KineticsResult<()> {
        let mut s = self.settings.clone();
        s.alpha_min = amin;
        s.alpha_max = amax;
        s.alpha_step = step;
        self.update(s)
    }

    pub fn set_iso_method(&mut self, method: IsoMethod) -> KineticsResult<()> {
        let mut s = self.settings.clone();
        s.iso_method = method;
        self.update(s)
    }

    pub fn reset_to_defaults(&mut self) -> KineticsResult<()> {
        self.settings = AnalysisSettings::default();
        self.save_config()
    }
}

static GLOBAL_SETTINGS_MANAGER: OnceLock<Mutex<SettingsManager>> = OnceLock::new();

/// Guard on the process-wide manager, created from the default file on first use.
pub fn get_settings_manager() -> MutexGuard<'static, SettingsManager> {
    GLOBAL_SETTINGS_MANAGER
        .get_or_init(|| Mutex::new(SettingsManager::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs `f` with read access to the process-wide settings.
pub fn with_settings<F, R>(f: F) -> R
where
    F: FnOnce(&AnalysisSettings) -> R,
{
    let manager = get_settings_manager();
    f(manager.settings())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let s = AnalysisSettings::default();
        assert!(s.validate().is_ok());
        let alphas = s.iso_alphas();
        assert_eq!(alphas.len(), 17);
        assert_eq!(alphas[0], 0.1);
        assert_eq!(*alphas.last().unwrap(), 0.9);
    }

    #[test]
    fn test_alpha_step_below_grid_resolution_is_rejected() {
        let mut s = AnalysisSettings::default();
        s.alpha_step = 5e-5;
        assert!(matches!(s.validate(), Err(KineticsError::Configuration(_))));
        s.alpha_step = MIN_ALPHA_STEP;
        assert!(s.validate().is_ok());
        let alphas = s.iso_alphas();
        assert!(alphas.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(alphas.len(), 8001);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let manager = SettingsManager::with_config_file(path.to_str().unwrap());
        assert_eq!(manager.settings(), &AnalysisSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"alpha_min": 0.2, "iso_method": "Vyazovkin"}"#)
            .unwrap();
        let manager = SettingsManager::with_config_file(file.path().to_str().unwrap());
        assert_eq!(manager.settings().alpha_min, 0.2);
        assert_eq!(manager.settings().iso_method, IsoMethod::Vyazovkin);
        assert_eq!(manager.settings().npa_bins, DEFAULT_NPA_BINS);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"alpha_min": 0.95}"#).unwrap();
        assert!(matches!(
            SettingsManager::load_config(file.path().to_str().unwrap()),
            Err(KineticsError::Configuration(_))
        ));
        let mut broken = NamedTempFile::new().unwrap();
        broken.write_all(b"{not json").unwrap();
        assert!(matches!(
            SettingsManager::load_config(broken.path().to_str().unwrap()),
            Err(KineticsError::Json(_))
        ));
        // the manager itself falls back to defaults
        let manager = SettingsManager::with_config_file(broken.path().to_str().unwrap());
        assert_eq!(manager.settings(), &AnalysisSettings::default());
    }

    #[test]
    fn test_update_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kinetics_settings.json");
        let path = path.to_str().unwrap();
        let mut manager = SettingsManager::with_config_file(path);
        manager.set_alpha_range(0.2, 0.8, 0.1).unwrap();
        manager.set_iso_method(IsoMethod::KAS).unwrap();
        assert!(manager.set_alpha_range(0.8, 0.2, 0.1).is_err());
        let reloaded = SettingsManager::with_config_file(path);
        assert_eq!(reloaded.settings().alpha_min, 0.2);
        assert_eq!(reloaded.settings().iso_method, IsoMethod::KAS);
        manager.reset_to_defaults().unwrap();
        let reset = SettingsManager::with_config_file(path);
        assert_eq!(reset.settings(), &AnalysisSettings::default());
    }
}
