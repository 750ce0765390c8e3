use sketch_types::{EntityKind, SolverState};
use tracing::{info, instrument, warn};

use crate::backend::SolverBackend;
use crate::config::SolverConfig;
use crate::entity_mapping::{EntityLookup, ProblemBuilder, SketchView};
use crate::status::{classify, describe};
use crate::types::{BackendReport, EquationSource, ParamUpdate, Problem, SolveError, SolveResult};

/// Build the problem for one sketch without solving it.
pub fn build_problem(view: &SketchView<'_>) -> Result<Problem, SolveError> {
    let mut builder = ProblemBuilder::new(view);
    builder.add_entities()?;
    builder.add_constraints()?;
    Ok(builder.problem)
}

/// Solve a sketch: map entities and constraints, run the backend, classify.
///
/// Solver outcomes such as `Inconsistent` are reported in the result; only
/// mapping failures are errors.
#[instrument(skip_all, fields(sketch = %view.sketch, backend = backend.name()))]
pub fn solve_sketch(
    view: &SketchView<'_>,
    backend: &dyn SolverBackend,
    config: &SolverConfig,
) -> Result<SolveResult, SolveError> {
    let mut builder = ProblemBuilder::new(view);
    builder.add_entities()?;
    builder.add_constraints()?;
    check_support(view, &builder.problem, backend)?;

    let problem = &builder.problem;
    let mut report = backend.solve(problem, config);
    let mut retried = false;

    if report.status == SolverState::DidNotConverge
        && config.retry_on_divergence
        && !problem.unknowns.is_empty()
    {
        warn!(iterations = report.iterations, "solve diverged, retrying from a perturbed guess");
        let second = backend.solve(&perturbed(problem, config.retry_perturbation), config);
        report = BackendReport {
            iterations: report.iterations + second.iterations,
            ..second
        };
        retried = true;
    }

    let classification = classify(&report, problem, config.tolerance);
    let updated_params = if classification.state.writes_back() {
        builder
            .slots()
            .filter_map(|(entity, name, index)| {
                report.values.get(index).map(|value| ParamUpdate {
                    entity,
                    param: name.to_string(),
                    value: *value,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut result = SolveResult {
        sketch: view.sketch,
        state: classification.state,
        updated_params,
        dof: classification.dof,
        failed_constraints: classification.failed_constraints,
        iterations: report.iterations,
        message: String::new(),
        retried,
    };
    result.message = describe(&result);

    match result.state {
        SolverState::Okay | SolverState::Redundant => info!(
            state = %result.state,
            dof = ?result.dof,
            iterations = result.iterations,
            "sketch solved"
        ),
        _ => warn!(
            state = %result.state,
            failed = ?result.failed_constraints,
            iterations = result.iterations,
            "sketch did not solve"
        ),
    }

    Ok(result)
}

/// Reject primitives the backend cannot evaluate before solving.
fn check_support(
    view: &SketchView<'_>,
    problem: &Problem,
    backend: &dyn SolverBackend,
) -> Result<(), SolveError> {
    for equation in &problem.equations {
        let primitive = equation.primitive.kind();
        if backend.supports(primitive) {
            continue;
        }
        return Err(match equation.source {
            EquationSource::Constraint(id) => {
                let constraint = view.constraints().iter().find(|c| c.id == id);
                let kind = constraint.map(|c| c.kind);
                let types: Vec<EntityKind> = constraint
                    .map(|c| c.entities.iter().filter_map(|e| view.kind_of(*e)).collect())
                    .unwrap_or_default();
                match kind {
                    Some(kind) => SolveError::UnsupportedConstraintMapping {
                        constraint: id,
                        kind,
                        types,
                    },
                    None => SolveError::UnsupportedPrimitive {
                        entity: view.sketch,
                        primitive,
                    },
                }
            }
            EquationSource::Entity(entity) => SolveError::UnsupportedPrimitive { entity, primitive },
        });
    }
    Ok(())
}

/// Deterministic offset of every initial value, alternating in sign.
fn perturbed(problem: &Problem, magnitude: f64) -> Problem {
    let mut out = problem.clone();
    for (i, unknown) in out.unknowns.iter_mut().enumerate() {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        unknown.initial += sign * magnitude * (1 + i % 3) as f64;
    }
    out
}
