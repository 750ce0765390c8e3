use serde::{Deserialize, Serialize};
use sketch_solver::SolverConfig;

use crate::InteractionError;

/// Snapping behaviour of point steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Screen-space snap radius; divided by the zoom to get sketch units.
    pub tolerance_px: f64,
    pub grid_enabled: bool,
    pub grid_spacing: f64,
    /// Reuse a snapped point instead of creating a new one plus a
    /// Coincident constraint.
    pub reuse_snapped_points: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            tolerance_px: 10.0,
            grid_enabled: false,
            grid_spacing: 1.0,
            reuse_snapped_points: true,
        }
    }
}

impl SnapConfig {
    /// No snapping except to the grid; every point step creates a new point.
    pub fn grid_only(spacing: f64) -> Self {
        Self {
            tolerance_px: 0.0,
            grid_enabled: true,
            grid_spacing: spacing,
            reuse_snapped_points: false,
        }
    }

    /// Snap radius in sketch units at the given zoom.
    pub fn tolerance(&self, pixels_per_unit: f64) -> f64 {
        if pixels_per_unit > 0.0 {
            self.tolerance_px / pixels_per_unit
        } else {
            0.0
        }
    }
}

/// User preferences of an interactive session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub solver: SolverConfig,
    pub snap: SnapConfig,
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, InteractionError> {
        serde_json::from_str(json).map_err(|e| InteractionError::Config {
            reason: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, InteractionError> {
        serde_json::to_string_pretty(self).map_err(|e| InteractionError::Config {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_scales_with_zoom() {
        let config = SnapConfig::default();
        assert_eq!(config.tolerance(2.0), 5.0);
        assert_eq!(config.tolerance(0.0), 0.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            SessionConfig::from_json(r#"{ "snap": { "grid_enabled": true } }"#).unwrap();
        assert!(config.snap.grid_enabled);
        assert_eq!(config.snap.tolerance_px, 10.0);
        assert_eq!(config.solver, SolverConfig::default());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            SessionConfig::from_json("{ snap"),
            Err(InteractionError::Config { .. })
        ));
    }

    #[test]
    fn json_round_trip_keeps_presets() {
        let config = SessionConfig {
            solver: SolverConfig::precise(),
            snap: SnapConfig::grid_only(0.5),
        };
        let back = SessionConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
