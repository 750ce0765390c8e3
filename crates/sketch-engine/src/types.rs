use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use sketch_solver::SolveError;
use sketch_types::{ConstraintId, ConstraintKind, EntityId, EntityKind};

/// Everything removed by one entity deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Removal {
    pub entity: EntityId,
    /// Dependents removed along with `entity`.
    pub cascaded: BTreeSet<EntityId>,
    /// Constraints that referenced any removed entity.
    pub constraints: Vec<ConstraintId>,
}

/// Errors from the document and its graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("entity not found: {entity}")]
    NotFound { entity: EntityId },

    #[error("constraint not found: {constraint}")]
    ConstraintNotFound { constraint: ConstraintId },

    #[error("{kind} does not accept {found:?}")]
    TypeSignatureMismatch { kind: String, found: Vec<EntityKind> },

    #[error("ownership cycle through {involved:?}")]
    StructuralCycle { involved: Vec<EntityId> },

    #[error("invalid parameter {param} on {entity}: {reason}")]
    InvalidParam {
        entity: EntityId,
        param: String,
        reason: String,
    },

    #[error("{entity} belongs to {found:?}, expected {expected:?}")]
    CrossSketchReference {
        entity: EntityId,
        expected: Option<EntityId>,
        found: Option<EntityId>,
    },

    #[error("{entity} is not a sketch")]
    NotASketch { entity: EntityId },

    #[error("{kind} needs a finite value")]
    MissingValue { kind: ConstraintKind },

    #[error("solve failed: {0}")]
    Solve(#[from] SolveError),
}
