//! Assertion helpers that report expected vs actual with a context label.

use sketch_solver::SolveResult;
use sketch_types::SolverState;

use crate::builder::SketchBuilder;
use crate::helpers::HarnessError;

fn fail(ctx: &str, detail: String) -> HarnessError {
    HarnessError::AssertionFailed {
        detail: format!("[{ctx}] {detail}"),
    }
}

/// Assert a named point sits within `tol` of `expected`.
pub fn assert_point_near(
    sketch: &SketchBuilder,
    name: &str,
    expected: [f64; 2],
    tol: f64,
    ctx: &str,
) -> Result<(), HarnessError> {
    let actual = sketch.position(name)?;
    let off = (actual[0] - expected[0]).hypot(actual[1] - expected[1]);
    if off <= tol {
        Ok(())
    } else {
        Err(fail(
            ctx,
            format!(
                "{name}: expected ({:.6}, {:.6}), got ({:.6}, {:.6}), off by {off:.3e} (tol={tol})",
                expected[0], expected[1], actual[0], actual[1],
            ),
        ))
    }
}

/// Assert the distance between two named points.
pub fn assert_distance(
    sketch: &SketchBuilder,
    a: &str,
    b: &str,
    expected: f64,
    tol: f64,
    ctx: &str,
) -> Result<(), HarnessError> {
    let (pa, pb) = (sketch.position(a)?, sketch.position(b)?);
    let d = (pa[0] - pb[0]).hypot(pa[1] - pb[1]);
    if (d - expected).abs() <= tol {
        Ok(())
    } else {
        Err(fail(
            ctx,
            format!("|{a}{b}|: expected {expected:.6}, got {d:.6} (tol={tol})"),
        ))
    }
}

/// Assert the solver state of a result, including its message on failure.
pub fn assert_state(result: &SolveResult, expected: SolverState, ctx: &str) -> Result<(), HarnessError> {
    if result.state == expected {
        Ok(())
    } else {
        Err(fail(
            ctx,
            format!(
                "expected {expected}, got {} ({})",
                result.state, result.message
            ),
        ))
    }
}

pub fn assert_dof(result: &SolveResult, expected: i32, ctx: &str) -> Result<(), HarnessError> {
    if result.dof == Some(expected) {
        Ok(())
    } else {
        Err(fail(
            ctx,
            format!("expected dof {expected}, got {:?} ({})", result.dof, result.message),
        ))
    }
}
