use sketch_types::{ConstraintId, SolverState};

use crate::types::{BackendReport, EquationSource, Problem, SolveResult};

/// Final classification of a backend report.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub state: SolverState,
    pub dof: Option<i32>,
    pub failed_constraints: Vec<ConstraintId>,
}

/// Classify a backend report into a sketch-level outcome.
///
/// A converged solve with linearly dependent rows is `Redundant` and reports
/// a negative dof. An inconsistent solve implicates the constraints whose
/// rows remain unsatisfied.
pub fn classify(report: &BackendReport, problem: &Problem, tolerance: f64) -> Classification {
    match report.status {
        SolverState::Okay if report.rank < report.rows => Classification {
            state: SolverState::Redundant,
            dof: Some(-((report.rows - report.rank) as i32)),
            failed_constraints: Vec::new(),
        },
        SolverState::Okay => Classification {
            state: SolverState::Okay,
            dof: Some(problem.unknowns.len() as i32 - report.rank as i32),
            failed_constraints: Vec::new(),
        },
        SolverState::Inconsistent => {
            let mut failed: Vec<ConstraintId> = problem
                .row_sources()
                .into_iter()
                .zip(report.residuals.iter())
                .filter(|(_, r)| r.abs() > tolerance)
                .filter_map(|(source, _)| match source {
                    EquationSource::Constraint(id) => Some(id),
                    EquationSource::Entity(_) => None,
                })
                .collect();
            failed.sort();
            failed.dedup();
            Classification {
                state: SolverState::Inconsistent,
                dof: None,
                failed_constraints: failed,
            }
        }
        state => Classification {
            state,
            dof: None,
            failed_constraints: Vec::new(),
        },
    }
}

/// Human-readable solver state for display next to the sketch.
pub fn describe(result: &SolveResult) -> String {
    match result.state {
        SolverState::Okay => match result.dof {
            Some(0) => "Okay: fully constrained".to_string(),
            Some(dof) => format!("Okay: {dof} degrees of freedom"),
            None => "Okay".to_string(),
        },
        SolverState::Redundant => {
            let dependent = result.dof.map_or(0, |d| d.unsigned_abs());
            format!("Redundant: {dependent} dependent equation(s)")
        }
        SolverState::Inconsistent => {
            let names: Vec<String> = result
                .failed_constraints
                .iter()
                .map(ToString::to_string)
                .collect();
            if names.is_empty() {
                "Inconsistent constraints".to_string()
            } else {
                format!("Inconsistent: {} cannot be satisfied", names.join(", "))
            }
        }
        SolverState::DidNotConverge => {
            format!("Did not converge after {} iterations", result.iterations)
        }
        SolverState::Unknown => "Not solved".to_string(),
    }
}
