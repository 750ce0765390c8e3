//! Snap candidates for point steps.

use serde::{Deserialize, Serialize};
use sketch_engine::EntityGraph;
use sketch_solver::primitives::arc_sweep;
use sketch_types::{Entity, EntityData, EntityId, EntityKind};

use crate::config::SnapConfig;

/// Candidate kinds in priority order (earlier wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SnapKind {
    ExistingPoint,
    CurveEndpoint,
    CurveNearest,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapTarget {
    pub kind: SnapKind,
    pub position: [f64; 2],
    /// The point for point snaps, the curve for nearest-point snaps.
    pub entity: Option<EntityId>,
    pub distance: f64,
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (b[0] - a[0]).hypot(b[1] - a[1])
}

fn position(graph: &EntityGraph, id: EntityId) -> Option<[f64; 2]> {
    graph.get(id).ok().and_then(|e| e.data.position())
}

fn snappable(entity: &Entity) -> bool {
    entity.visible && !entity.construction
}

/// True when a visible line or arc uses `point` as an endpoint.
fn is_curve_endpoint(graph: &EntityGraph, point: EntityId) -> bool {
    graph.children_of(point).any(|child| {
        graph.get(child).is_ok_and(|e| {
            snappable(e)
                && match e.data {
                    EntityData::Line2D { .. } => true,
                    EntityData::Arc { start, end, .. } => start == point || end == point,
                    _ => false,
                }
        })
    })
}

fn nearest_on_segment(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    let d = [b[0] - a[0], b[1] - a[1]];
    let len_sq = d[0] * d[0] + d[1] * d[1];
    if len_sq == 0.0 {
        return a;
    }
    let t = (((p[0] - a[0]) * d[0] + (p[1] - a[1]) * d[1]) / len_sq).clamp(0.0, 1.0);
    [a[0] + d[0] * t, a[1] + d[1] * t]
}

fn nearest_on_circle(p: [f64; 2], center: [f64; 2], radius: f64) -> Option<[f64; 2]> {
    let d = distance(p, center);
    if d == 0.0 {
        return None;
    }
    let k = radius / d;
    Some([center[0] + (p[0] - center[0]) * k, center[1] + (p[1] - center[1]) * k])
}

/// Nearest point of a curve entity to `p`, if it has one.
pub fn nearest_on_curve(graph: &EntityGraph, curve: &Entity, p: [f64; 2]) -> Option<[f64; 2]> {
    match curve.data {
        EntityData::Line2D { p1, p2 } => Some(nearest_on_segment(
            p,
            position(graph, p1)?,
            position(graph, p2)?,
        )),
        EntityData::Circle { center, radius } => {
            nearest_on_circle(p, position(graph, center)?, radius.value)
        }
        EntityData::Arc {
            center,
            start,
            end,
            invert,
            ..
        } => {
            let (c, s, e) = (
                position(graph, center)?,
                position(graph, start)?,
                position(graph, end)?,
            );
            let q = nearest_on_circle(p, c, distance(c, s))?;
            // Inside the sweep iff start→q does not exceed start→end.
            (arc_sweep(c, s, q, invert) <= arc_sweep(c, s, e, invert)).then_some(q)
        }
        _ => None,
    }
}

/// All candidates of `sketch` within tolerance of `cursor`.
pub fn snap_candidates(
    graph: &EntityGraph,
    sketch: EntityId,
    cursor: [f64; 2],
    pixels_per_unit: f64,
    config: &SnapConfig,
) -> Vec<SnapTarget> {
    let tolerance = config.tolerance(pixels_per_unit);
    let mut out = Vec::new();
    let mut push = |kind, position: [f64; 2], entity| {
        let d = distance(cursor, position);
        if d <= tolerance {
            out.push(SnapTarget {
                kind,
                position,
                entity,
                distance: d,
            });
        }
    };

    for entity in graph.entities_in(sketch).filter(|e| snappable(e)) {
        match entity.kind() {
            EntityKind::Point2D => {
                if let Some(p) = entity.data.position() {
                    let kind = if is_curve_endpoint(graph, entity.id) {
                        SnapKind::CurveEndpoint
                    } else {
                        SnapKind::ExistingPoint
                    };
                    push(kind, p, Some(entity.id));
                }
            }
            kind if kind.is_curve() => {
                if let Some(q) = nearest_on_curve(graph, entity, cursor) {
                    push(SnapKind::CurveNearest, q, Some(entity.id));
                }
            }
            _ => {}
        }
    }

    if config.grid_enabled && config.grid_spacing > 0.0 {
        let g = config.grid_spacing;
        push(
            SnapKind::Grid,
            [(cursor[0] / g).round() * g, (cursor[1] / g).round() * g],
            None,
        );
    }
    out
}

/// The winning candidate: highest priority kind, then lowest entity id.
pub fn find_snap(
    graph: &EntityGraph,
    sketch: EntityId,
    cursor: [f64; 2],
    pixels_per_unit: f64,
    config: &SnapConfig,
) -> Option<SnapTarget> {
    snap_candidates(graph, sketch, cursor, pixels_per_unit, config)
        .into_iter()
        .min_by_key(|t| (t.kind, t.entity.map_or(u32::MAX, |e| e.0)))
}
