use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ConstraintId, EntityId};

/// Closed set of constraint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    Coincident,
    Equal,
    Distance,
    Diameter,
    Angle,
    Parallel,
    Perpendicular,
    Tangent,
    Horizontal,
    Vertical,
    Midpoint,
    Symmetric,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 12] = [
        ConstraintKind::Coincident,
        ConstraintKind::Equal,
        ConstraintKind::Distance,
        ConstraintKind::Diameter,
        ConstraintKind::Angle,
        ConstraintKind::Parallel,
        ConstraintKind::Perpendicular,
        ConstraintKind::Tangent,
        ConstraintKind::Horizontal,
        ConstraintKind::Vertical,
        ConstraintKind::Midpoint,
        ConstraintKind::Symmetric,
    ];

    /// Dimensional constraints carry a scalar value; the rest are geometric.
    pub fn is_dimensional(self) -> bool {
        matches!(
            self,
            ConstraintKind::Distance | ConstraintKind::Diameter | ConstraintKind::Angle
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ConstraintKind::Coincident => "Coincident",
            ConstraintKind::Equal => "Equal",
            ConstraintKind::Distance => "Distance",
            ConstraintKind::Diameter => "Diameter",
            ConstraintKind::Angle => "Angle",
            ConstraintKind::Parallel => "Parallel",
            ConstraintKind::Perpendicular => "Perpendicular",
            ConstraintKind::Tangent => "Tangent",
            ConstraintKind::Horizontal => "Horizontal",
            ConstraintKind::Vertical => "Vertical",
            ConstraintKind::Midpoint => "Midpoint",
            ConstraintKind::Symmetric => "Symmetric",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A typed relation between entities of one sketch.
///
/// Constraints never own the entities they reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    /// Ordered entity references, matching one of the kind's signatures.
    pub entities: Vec<EntityId>,
    /// Scalar parameter of dimensional kinds (distance, diameter, angle in degrees).
    pub value: Option<f64>,
    pub sketch: EntityId,
    /// Workplane the relation is evaluated in.
    pub workplane: Option<EntityId>,
    /// Set after a solve found this constraint contradictory.
    pub failed: bool,
    /// Reference constraints only report a measurement.
    pub reference: bool,
    pub visible: bool,
    pub name: String,
}

impl Constraint {
    pub fn references(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Constraints that feed equations into the solver.
    pub fn is_driving(&self) -> bool {
        !self.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensional_split() {
        let dimensional: Vec<_> = ConstraintKind::ALL
            .iter()
            .filter(|k| k.is_dimensional())
            .collect();
        assert_eq!(dimensional.len(), 3);
        assert!(!ConstraintKind::Equal.is_dimensional());
    }
}
