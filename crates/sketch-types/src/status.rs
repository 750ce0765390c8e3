use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::ConstraintId;

/// Outcome of the last solve of a sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolverState {
    /// Converged with independent equations.
    Okay,
    /// Contradictory constraints; positions were kept.
    Inconsistent,
    /// Converged, but some equations are linearly dependent.
    Redundant,
    /// Neither converged nor proven contradictory.
    DidNotConverge,
    /// Never solved.
    #[default]
    Unknown,
}

impl SolverState {
    /// States whose solved values are written back to the graph.
    pub fn writes_back(self) -> bool {
        matches!(self, SolverState::Okay | SolverState::Redundant)
    }
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SolverState::Okay => "Okay",
            SolverState::Inconsistent => "Inconsistent",
            SolverState::Redundant => "Redundant",
            SolverState::DidNotConverge => "Did not converge",
            SolverState::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

/// Per-sketch solve bookkeeping kept by the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchStatus {
    pub state: SolverState,
    /// Remaining degrees of freedom; negative when redundant.
    pub dof: Option<i32>,
    pub dirty: bool,
    pub message: String,
    pub failed_constraints: Vec<ConstraintId>,
    /// Graph generation observed by the last solve.
    pub last_generation: u64,
}

impl Default for SketchStatus {
    fn default() -> Self {
        Self {
            state: SolverState::Unknown,
            dof: None,
            dirty: true,
            message: String::new(),
            failed_constraints: Vec::new(),
            last_generation: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_status_is_dirty_and_unknown() {
        let status = SketchStatus::default();
        assert!(status.dirty);
        assert_eq!(status.state, SolverState::Unknown);
        assert_eq!(status.dof, None);
    }

    #[test]
    fn only_converged_states_write_back() {
        assert!(SolverState::Okay.writes_back());
        assert!(SolverState::Redundant.writes_back());
        assert!(!SolverState::Inconsistent.writes_back());
        assert!(!SolverState::DidNotConverge.writes_back());
    }
}
