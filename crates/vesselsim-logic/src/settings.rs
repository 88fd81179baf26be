//! Simulation settings - the tunable policy of the engine.
//!
//! Nothing in here changes conservation of resources. The coherency
//! thresholds in particular are a heuristic guard against producers that
//! write to storage behind the engine's back on loaded vessels; they are
//! kept configurable rather than hard-coded.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("setting '{field}' is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Engine-wide tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Detect external producers on loaded vessels and drop time warp.
    pub enforce_coherency: bool,
    /// Minimum unexplained amount change counted as an external producer.
    pub coherency_amount_tolerance: f64,
    /// Capacity growth above this is a flow-state change, not a producer.
    pub coherency_capacity_tolerance: f64,
    /// Warp rate above which the guard is armed, and to which it drops warp.
    pub coherency_warp_rate: f64,
    /// Multiplier on command pod draw while hibernating.
    pub hibernating_ec_factor: f64,
    /// Solar flux at the home planet's orbit, in W/m². Panels deliver their
    /// nominal rate at this flux.
    pub solar_flux_at_home: f64,
    /// Calendar used to convert mission time into years.
    pub hours_in_day: f64,
    pub days_in_year: f64,
    /// Upper bound on recipe solver passes. `None` allows a fixed number
    /// of passes per queued recipe.
    pub max_recipe_passes: Option<usize>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            enforce_coherency: true,
            coherency_amount_tolerance: 1e-5,
            coherency_capacity_tolerance: 1e-5,
            coherency_warp_rate: 1000.0,
            hibernating_ec_factor: 0.1,
            solar_flux_at_home: 1360.0,
            hours_in_day: 6.0,
            days_in_year: 426.0,
            max_recipe_passes: None,
        }
    }
}

impl SimSettings {
    /// Parse and validate settings from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: SimSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.coherency_amount_tolerance < 0.0 {
            return Err(SettingsError::Invalid {
                field: "coherency_amount_tolerance",
                reason: format!("must be >= 0, got {}", self.coherency_amount_tolerance),
            });
        }
        if self.coherency_capacity_tolerance < 0.0 {
            return Err(SettingsError::Invalid {
                field: "coherency_capacity_tolerance",
                reason: format!("must be >= 0, got {}", self.coherency_capacity_tolerance),
            });
        }
        if self.coherency_warp_rate < 1.0 {
            return Err(SettingsError::Invalid {
                field: "coherency_warp_rate",
                reason: format!("must be >= 1, got {}", self.coherency_warp_rate),
            });
        }
        if self.solar_flux_at_home <= 0.0 {
            return Err(SettingsError::Invalid {
                field: "solar_flux_at_home",
                reason: format!("must be > 0, got {}", self.solar_flux_at_home),
            });
        }
        if self.hours_in_day <= 0.0 || self.days_in_year <= 0.0 {
            return Err(SettingsError::Invalid {
                field: "calendar",
                reason: "hours_in_day and days_in_year must be positive".into(),
            });
        }
        if self.max_recipe_passes == Some(0) {
            return Err(SettingsError::Invalid {
                field: "max_recipe_passes",
                reason: "must allow at least one pass".into(),
            });
        }
        Ok(())
    }

    /// Seconds in one calendar year.
    pub fn seconds_per_year(&self) -> f64 {
        3600.0 * self.hours_in_day * self.days_in_year
    }
}
