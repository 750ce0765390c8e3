pub mod constraint;
pub mod entity;
pub mod ids;
pub mod signature;
pub mod status;

pub use constraint::{Constraint, ConstraintKind};
pub use entity::{Entity, EntityData, EntityKind, Param};
pub use ids::{ConstraintId, EntityId};
pub use signature::{accepted_types, equal_relation, is_satisfiable, EqualRelation};
pub use status::{SketchStatus, SolverState};
