use nalgebra::{DMatrix, DVector, SVD};
use sketch_types::SolverState;
use tracing::debug;

use crate::backend::SolverBackend;
use crate::config::SolverConfig;
use crate::types::{BackendReport, Problem, PrimitiveKind};

/// Built-in backend: Gauss-Newton with Levenberg-Marquardt damping.
///
/// Each iteration solves `(JᵀJ + λI) dx = -Jᵀr` on a central-difference
/// Jacobian. λ shrinks after an accepted step and grows after a rejected one;
/// once it exceeds `lambda_max` the solve has stalled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonBackend;

impl SolverBackend for NewtonBackend {
    fn name(&self) -> &str {
        "newton"
    }

    fn supports(&self, _primitive: PrimitiveKind) -> bool {
        true
    }

    fn solve(&self, problem: &Problem, config: &SolverConfig) -> BackendReport {
        levenberg_marquardt(problem, config)
    }
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn max_abs(r: &[f64]) -> f64 {
    r.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

// ── Jacobian ─────────────────────────────────────────────────────────────────

/// Central-difference Jacobian, `rows x n`.
pub fn jacobian(problem: &Problem, x: &[f64], rows: usize, h: f64) -> DMatrix<f64> {
    let n = x.len();
    let mut jac = DMatrix::zeros(rows, n);
    let mut shifted = x.to_vec();
    for j in 0..n {
        let orig = shifted[j];
        shifted[j] = orig + h;
        let plus = problem.residuals(&shifted);
        shifted[j] = orig - h;
        let minus = problem.residuals(&shifted);
        shifted[j] = orig;
        for i in 0..rows {
            jac[(i, j)] = (plus[i] - minus[i]) / (2.0 * h);
        }
    }
    jac
}

/// Numerical rank via SVD with a relative singular-value cutoff.
pub fn jacobian_rank(jac: &DMatrix<f64>, rank_tolerance: f64) -> usize {
    if jac.nrows() == 0 || jac.ncols() == 0 {
        return 0;
    }
    let svd = SVD::new(jac.clone(), false, false);
    let sv = &svd.singular_values;
    let max_sv = sv.iter().cloned().fold(0.0_f64, f64::max);
    if max_sv <= f64::EPSILON {
        return 0;
    }
    let threshold = max_sv * rank_tolerance;
    sv.iter().filter(|&&s| s > threshold).count()
}

// ── Solver Loop ──────────────────────────────────────────────────────────────

const MIN_DECREASE: f64 = 1e-10;

enum Exit {
    Converged,
    Stalled,
    IterationLimit,
}

fn levenberg_marquardt(problem: &Problem, config: &SolverConfig) -> BackendReport {
    let mut x = problem.initial_values();
    let n = x.len();
    let rows = problem.row_count();

    let mut lambda = config.lambda_initial;
    let mut iterations = 0;
    let mut exit = Exit::IterationLimit;

    while iterations < config.max_iterations {
        let r = problem.residuals(&x);
        if max_abs(&r) < config.tolerance {
            exit = Exit::Converged;
            break;
        }
        if n == 0 {
            exit = Exit::Stalled;
            break;
        }
        iterations += 1;

        let jac = jacobian(problem, &x, rows, config.finite_difference_step);
        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let neg_jtr = -(&jt * DVector::from_column_slice(&r));
        let current = sum_sq(&r);

        let mut accepted = false;
        while lambda <= config.lambda_max {
            let damped = &jtj + DMatrix::identity(n, n) * lambda;
            if let Some(dx) = damped.lu().solve(&neg_jtr) {
                let candidate: Vec<f64> = x.iter().zip(dx.iter()).map(|(a, d)| a + d).collect();
                // Steps that no longer make measurable progress count as rejected.
                if sum_sq(&problem.residuals(&candidate)) < current * (1.0 - MIN_DECREASE) {
                    x = candidate;
                    lambda = (lambda / config.lambda_factor).max(1e-15);
                    accepted = true;
                    break;
                }
            }
            lambda *= config.lambda_factor;
        }

        if !accepted {
            exit = Exit::Stalled;
            break;
        }
    }

    // The loop may end on an accepted step without re-testing it.
    let residuals = problem.residuals(&x);
    if matches!(exit, Exit::IterationLimit) && max_abs(&residuals) < config.tolerance {
        exit = Exit::Converged;
    }

    let jac = jacobian(problem, &x, rows, config.finite_difference_step);
    let rank = jacobian_rank(&jac, config.rank_tolerance);

    let status = match exit {
        Exit::Converged => SolverState::Okay,
        Exit::Stalled if rank < rows => SolverState::Inconsistent,
        Exit::Stalled | Exit::IterationLimit => SolverState::DidNotConverge,
    };

    debug!(
        unknowns = n,
        rows,
        rank,
        iterations,
        residual = max_abs(&residuals),
        ?status,
        "levenberg-marquardt finished"
    );

    BackendReport {
        status,
        values: x,
        rank,
        rows,
        residuals,
        iterations,
    }
}
