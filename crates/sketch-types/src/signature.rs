//! Per-kind type signatures for constraints.
//!
//! Each constraint kind accepts a fixed list of entity-kind tuples. The same
//! table drives add-time validation, tool slot inference and the solver
//! mapping, so the type rules live in exactly one place.

use serde::{Deserialize, Serialize};

use crate::constraint::ConstraintKind;
use crate::entity::EntityKind::{self, Arc, Circle, Line2D, Point2D};

/// One accepted tuple of entity kinds, in reference order.
pub type Signature = &'static [EntityKind];

const POINT_PAIR: Signature = &[Point2D, Point2D];
const LINE_PAIR: Signature = &[Line2D, Line2D];

/// Accepted entity-kind tuples for a constraint kind.
pub fn signatures(kind: ConstraintKind) -> &'static [Signature] {
    match kind {
        ConstraintKind::Coincident => &[
            POINT_PAIR,
            &[Point2D, Line2D],
            &[Line2D, Point2D],
            &[Point2D, Circle],
            &[Circle, Point2D],
            &[Point2D, Arc],
            &[Arc, Point2D],
        ],
        ConstraintKind::Equal => &[
            LINE_PAIR,
            &[Line2D, Arc],
            &[Arc, Line2D],
            &[Arc, Arc],
            &[Arc, Circle],
            &[Circle, Arc],
            &[Circle, Circle],
        ],
        ConstraintKind::Distance => &[
            POINT_PAIR,
            &[Point2D, Line2D],
            &[Line2D, Point2D],
            &[Line2D],
        ],
        ConstraintKind::Diameter => &[&[Circle], &[Arc]],
        ConstraintKind::Angle | ConstraintKind::Parallel | ConstraintKind::Perpendicular => {
            &[LINE_PAIR]
        }
        ConstraintKind::Tangent => &[
            &[Line2D, Arc],
            &[Arc, Line2D],
            &[Line2D, Circle],
            &[Circle, Line2D],
            &[Arc, Arc],
            &[Arc, Circle],
            &[Circle, Arc],
            &[Circle, Circle],
        ],
        ConstraintKind::Horizontal | ConstraintKind::Vertical => &[&[Line2D], POINT_PAIR],
        ConstraintKind::Midpoint => &[&[Point2D, Line2D], &[Line2D, Point2D]],
        ConstraintKind::Symmetric => &[&[Point2D, Point2D, Line2D]],
    }
}

/// Largest number of entity references the kind accepts.
pub fn max_arity(kind: ConstraintKind) -> usize {
    signatures(kind).iter().map(|s| s.len()).max().unwrap_or(0)
}

/// Whether `types` matches one of the kind's signatures exactly.
pub fn is_satisfiable(kind: ConstraintKind, types: &[EntityKind]) -> bool {
    signatures(kind).iter().any(|sig| *sig == types)
}

/// Kinds accepted in `slot`, inferred from the already resolved slots.
///
/// The result is the union over all signatures consistent with `resolved`.
/// Kinds equal to an already resolved kind come first, so callers that pick
/// the first candidate prefer same-kind pairs.
pub fn accepted_types(
    kind: ConstraintKind,
    slot: usize,
    resolved: &[Option<EntityKind>],
) -> Vec<EntityKind> {
    let mut accepted: Vec<EntityKind> = Vec::new();
    for sig in signatures(kind) {
        let Some(candidate) = sig.get(slot) else {
            continue;
        };
        let consistent = resolved.iter().enumerate().all(|(i, r)| match r {
            Some(k) if i != slot => sig.get(i) == Some(k),
            _ => true,
        });
        if consistent && !accepted.contains(candidate) {
            accepted.push(*candidate);
        }
    }

    let preferred: Vec<EntityKind> = resolved.iter().flatten().copied().collect();
    accepted.sort_by_key(|k| (!preferred.contains(k), *k));
    accepted
}

/// The relation an Equal constraint expresses between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualRelation {
    /// Two line segments of the same length.
    EqualLength,
    /// Two arcs/circles of the same radius.
    EqualRadius,
    /// A line whose length equals an arc's length.
    LineArcLength,
}

/// Resolve which relation Equal expresses for a pair of kinds.
///
/// Radius is never mixed with length: a circle only pairs with arcs or circles.
pub fn equal_relation(a: EntityKind, b: EntityKind) -> Option<EqualRelation> {
    match (a, b) {
        (Line2D, Line2D) => Some(EqualRelation::EqualLength),
        (Arc | Circle, Arc | Circle) => Some(EqualRelation::EqualRadius),
        (Line2D, Arc) | (Arc, Line2D) => Some(EqualRelation::LineArcLength),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_infers_length_family_from_line() {
        let types = accepted_types(ConstraintKind::Equal, 1, &[Some(Line2D), None]);
        assert_eq!(types, vec![Line2D, Arc]);
    }

    #[test]
    fn equal_infers_curve_family_from_circle() {
        let types = accepted_types(ConstraintKind::Equal, 1, &[Some(Circle), None]);
        assert_eq!(types, vec![Circle, Arc]);
    }

    #[test]
    fn equal_unresolved_falls_back_to_signature() {
        let types = accepted_types(ConstraintKind::Equal, 0, &[None, None]);
        assert_eq!(types, vec![Line2D, Arc, Circle]);
    }

    #[test]
    fn equal_rejects_circle_line() {
        assert!(!is_satisfiable(ConstraintKind::Equal, &[Circle, Line2D]));
        assert!(is_satisfiable(ConstraintKind::Equal, &[Line2D, Arc]));
        assert!(is_satisfiable(ConstraintKind::Equal, &[Circle, Circle]));
        assert_eq!(equal_relation(Circle, Line2D), None);
    }

    #[test]
    fn equal_relation_table() {
        assert_eq!(equal_relation(Line2D, Line2D), Some(EqualRelation::EqualLength));
        assert_eq!(equal_relation(Arc, Arc), Some(EqualRelation::EqualRadius));
        assert_eq!(equal_relation(Arc, Circle), Some(EqualRelation::EqualRadius));
        assert_eq!(equal_relation(Arc, Line2D), Some(EqualRelation::LineArcLength));
    }

    #[test]
    fn point_pairs_accept_points() {
        let types = accepted_types(ConstraintKind::Distance, 1, &[Some(Point2D), None]);
        assert_eq!(types, vec![Point2D, Line2D]);
    }

    #[test]
    fn arity_bounds() {
        assert_eq!(max_arity(ConstraintKind::Symmetric), 3);
        assert_eq!(max_arity(ConstraintKind::Diameter), 1);
        assert!(!is_satisfiable(ConstraintKind::Parallel, &[Line2D]));
        assert!(is_satisfiable(ConstraintKind::Distance, &[Line2D]));
    }
}
