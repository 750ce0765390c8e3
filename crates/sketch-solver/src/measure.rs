use sketch_types::{ConstraintKind, EntityData, EntityId, EntityKind};

use crate::entity_mapping::EntityLookup;
use crate::primitives::line_angle;

fn line_points(lookup: &impl EntityLookup, id: EntityId) -> Option<([f64; 2], [f64; 2])> {
    match lookup.entity(id)?.data {
        EntityData::Line2D { p1, p2 } => Some((lookup.position(p1)?, lookup.position(p2)?)),
        _ => None,
    }
}

fn span(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [b[0] - a[0], b[1] - a[1]]
}

fn point_line_distance(p: [f64; 2], (a, b): ([f64; 2], [f64; 2])) -> f64 {
    let d = span(a, b);
    let len = d[0].hypot(d[1]);
    if len < 1e-12 {
        return (p[0] - a[0]).hypot(p[1] - a[1]);
    }
    let ap = span(a, p);
    (d[0] * ap[1] - d[1] * ap[0]).abs() / len
}

/// Current value of a dimensional relation between `entities`.
///
/// Distances and diameters are in model units, angles in degrees. Returns
/// `None` for geometric kinds and for entity combinations without a measure.
pub fn measure(
    kind: ConstraintKind,
    entities: &[EntityId],
    lookup: &impl EntityLookup,
) -> Option<f64> {
    let types: Vec<EntityKind> = entities
        .iter()
        .map(|id| lookup.kind_of(*id))
        .collect::<Option<_>>()?;

    match (kind, types.as_slice()) {
        (ConstraintKind::Distance, [EntityKind::Point2D, EntityKind::Point2D]) => {
            let (a, b) = (lookup.position(entities[0])?, lookup.position(entities[1])?);
            Some((a[0] - b[0]).hypot(a[1] - b[1]))
        }
        (ConstraintKind::Distance, [EntityKind::Line2D]) => {
            let (a, b) = line_points(lookup, entities[0])?;
            Some((a[0] - b[0]).hypot(a[1] - b[1]))
        }
        (ConstraintKind::Distance, [EntityKind::Point2D, EntityKind::Line2D]) => Some(
            point_line_distance(lookup.position(entities[0])?, line_points(lookup, entities[1])?),
        ),
        (ConstraintKind::Distance, [EntityKind::Line2D, EntityKind::Point2D]) => Some(
            point_line_distance(lookup.position(entities[1])?, line_points(lookup, entities[0])?),
        ),
        (ConstraintKind::Diameter, [EntityKind::Circle]) => {
            let radius = lookup.entity(entities[0])?.data.param("radius")?.value;
            Some(2.0 * radius)
        }
        (ConstraintKind::Diameter, [EntityKind::Arc]) => match lookup.entity(entities[0])?.data {
            EntityData::Arc { center, start, .. } => {
                let (c, s) = (lookup.position(center)?, lookup.position(start)?);
                Some(2.0 * (s[0] - c[0]).hypot(s[1] - c[1]))
            }
            _ => None,
        },
        (ConstraintKind::Angle, [EntityKind::Line2D, EntityKind::Line2D]) => {
            let (a0, a1) = line_points(lookup, entities[0])?;
            let (b0, b1) = line_points(lookup, entities[1])?;
            Some(line_angle(span(a0, a1), span(b0, b1)).to_degrees())
        }
        _ => None,
    }
}
