use serde::{Deserialize, Serialize};

/// Configuration for the Levenberg-Marquardt backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Converged once every residual is below this in absolute value.
    pub tolerance: f64,
    /// Singular values below `rank_tolerance * max_singular_value` count as zero.
    pub rank_tolerance: f64,
    /// Step of the central-difference Jacobian.
    pub finite_difference_step: f64,
    pub lambda_initial: f64,
    pub lambda_factor: f64,
    /// Damping above this means no descent direction is left.
    pub lambda_max: f64,
    pub retry_on_divergence: bool,
    pub retry_perturbation: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-9,
            rank_tolerance: 1e-8,
            finite_difference_step: 1e-7,
            lambda_initial: 1e-3,
            lambda_factor: 10.0,
            lambda_max: 1e12,
            retry_on_divergence: true,
            retry_perturbation: 1e-3,
        }
    }
}

impl SolverConfig {
    /// Tighter tolerances and a longer iteration budget.
    pub fn precise() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-12,
            rank_tolerance: 1e-10,
            finite_difference_step: 1e-8,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precise_is_tighter() {
        let default = SolverConfig::default();
        let precise = SolverConfig::precise();
        assert!(precise.tolerance < default.tolerance);
        assert!(precise.max_iterations > default.max_iterations);
        assert_eq!(precise.lambda_factor, default.lambda_factor);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SolverConfig = serde_json::from_str(r#"{"max_iterations": 7}"#).unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.tolerance, SolverConfig::default().tolerance);
    }
}
