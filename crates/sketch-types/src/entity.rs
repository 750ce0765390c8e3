use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::EntityId;

/// Kind tag of a geometric entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Workplane,
    Sketch,
    Point2D,
    Line2D,
    Arc,
    Circle,
}

impl EntityKind {
    /// Entities that must live inside a sketch.
    pub fn is_sketch_scoped(self) -> bool {
        !matches!(self, EntityKind::Workplane | EntityKind::Sketch)
    }

    pub fn is_curve(self) -> bool {
        matches!(self, EntityKind::Line2D | EntityKind::Arc | EntityKind::Circle)
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Workplane => "Workplane",
            EntityKind::Sketch => "Sketch",
            EntityKind::Point2D => "Point",
            EntityKind::Line2D => "Line",
            EntityKind::Arc => "Arc",
            EntityKind::Circle => "Circle",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A scalar entity parameter. Driven parameters are derived from other
/// geometry and can only be written by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub value: f64,
    pub driven: bool,
}

impl Param {
    pub fn free(value: f64) -> Self {
        Self { value, driven: false }
    }

    pub fn driven(value: f64) -> Self {
        Self { value, driven: true }
    }
}

/// Kind-specific parameters and references of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntityData {
    Workplane {
        origin: [Param; 3],
        normal: [Param; 3],
    },
    Sketch {
        name: String,
        workplane: EntityId,
    },
    Point2D {
        x: Param,
        y: Param,
    },
    Line2D {
        p1: EntityId,
        p2: EntityId,
    },
    Circle {
        center: EntityId,
        radius: Param,
    },
    /// Arc swept counter-clockwise from `start` to `end` (clockwise when
    /// `invert` is set). The radius is driven by the start point.
    Arc {
        center: EntityId,
        start: EntityId,
        end: EntityId,
        radius: Param,
        invert: bool,
    },
}

const WORKPLANE_PARAMS: [&str; 6] = [
    "origin_x", "origin_y", "origin_z", "normal_x", "normal_y", "normal_z",
];

impl EntityData {
    pub fn workplane(origin: [f64; 3], normal: [f64; 3]) -> Self {
        EntityData::Workplane {
            origin: origin.map(Param::free),
            normal: normal.map(Param::free),
        }
    }

    pub fn sketch(name: impl Into<String>, workplane: EntityId) -> Self {
        EntityData::Sketch {
            name: name.into(),
            workplane,
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        EntityData::Point2D {
            x: Param::free(x),
            y: Param::free(y),
        }
    }

    pub fn line(p1: EntityId, p2: EntityId) -> Self {
        EntityData::Line2D { p1, p2 }
    }

    pub fn circle(center: EntityId, radius: f64) -> Self {
        EntityData::Circle {
            center,
            radius: Param::free(radius),
        }
    }

    /// The radius is filled in from the referenced points on creation.
    pub fn arc(center: EntityId, start: EntityId, end: EntityId) -> Self {
        EntityData::Arc {
            center,
            start,
            end,
            radius: Param::driven(0.0),
            invert: false,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityData::Workplane { .. } => EntityKind::Workplane,
            EntityData::Sketch { .. } => EntityKind::Sketch,
            EntityData::Point2D { .. } => EntityKind::Point2D,
            EntityData::Line2D { .. } => EntityKind::Line2D,
            EntityData::Circle { .. } => EntityKind::Circle,
            EntityData::Arc { .. } => EntityKind::Arc,
        }
    }

    /// Referenced entities paired with the kind each slot requires.
    pub fn reference_slots(&self) -> Vec<(EntityId, EntityKind)> {
        match self {
            EntityData::Workplane { .. } | EntityData::Point2D { .. } => Vec::new(),
            EntityData::Sketch { workplane, .. } => vec![(*workplane, EntityKind::Workplane)],
            EntityData::Line2D { p1, p2 } => {
                vec![(*p1, EntityKind::Point2D), (*p2, EntityKind::Point2D)]
            }
            EntityData::Circle { center, .. } => vec![(*center, EntityKind::Point2D)],
            EntityData::Arc {
                center, start, end, ..
            } => vec![
                (*center, EntityKind::Point2D),
                (*start, EntityKind::Point2D),
                (*end, EntityKind::Point2D),
            ],
        }
    }

    pub fn references(&self) -> Vec<EntityId> {
        self.reference_slots().into_iter().map(|(id, _)| id).collect()
    }

    /// Named parameters in a stable order.
    pub fn params(&self) -> Vec<(&'static str, Param)> {
        match self {
            EntityData::Workplane { origin, normal } => WORKPLANE_PARAMS
                .iter()
                .zip(origin.iter().chain(normal.iter()))
                .map(|(name, p)| (*name, *p))
                .collect(),
            EntityData::Point2D { x, y } => vec![("x", *x), ("y", *y)],
            EntityData::Circle { radius, .. } | EntityData::Arc { radius, .. } => {
                vec![("radius", *radius)]
            }
            EntityData::Sketch { .. } | EntityData::Line2D { .. } => Vec::new(),
        }
    }

    pub fn param(&self, name: &str) -> Option<Param> {
        self.params()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param> {
        match self {
            EntityData::Workplane { origin, normal } => {
                let index = WORKPLANE_PARAMS.iter().position(|n| *n == name)?;
                if index < 3 {
                    origin.get_mut(index)
                } else {
                    normal.get_mut(index - 3)
                }
            }
            EntityData::Point2D { x, y } => match name {
                "x" => Some(x),
                "y" => Some(y),
                _ => None,
            },
            EntityData::Circle { radius, .. } | EntityData::Arc { radius, .. } => {
                (name == "radius").then_some(radius)
            }
            EntityData::Sketch { .. } | EntityData::Line2D { .. } => None,
        }
    }

    /// Position of a point entity.
    pub fn position(&self) -> Option<[f64; 2]> {
        match self {
            EntityData::Point2D { x, y } => Some([x.value, y.value]),
            _ => None,
        }
    }
}

/// A geometric entity stored in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Owning sketch. `None` only for workplanes and sketches.
    pub sketch: Option<EntityId>,
    pub data: EntityData,
    pub visible: bool,
    pub selected: bool,
    pub construction: bool,
    /// Parameters of a fixed entity enter the solve as constants.
    pub fixed: bool,
    /// Draw order used when rendering the picking buffer.
    pub display_index: u32,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        self.data.kind()
    }

    pub fn references(&self) -> Vec<EntityId> {
        self.data.references()
    }

    pub fn name(&self) -> String {
        match &self.data {
            EntityData::Sketch { name, .. } => name.clone(),
            _ => format!("{} {}", self.kind(), self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_radius_is_driven() {
        let arc = EntityData::arc(EntityId(0), EntityId(1), EntityId(2));
        assert!(arc.param("radius").is_some_and(|p| p.driven));
        assert_eq!(arc.references(), vec![EntityId(0), EntityId(1), EntityId(2)]);
    }

    #[test]
    fn workplane_params_are_addressable() {
        let mut wp = EntityData::workplane([1.0, 2.0, 3.0], [0.0, 0.0, 1.0]);
        assert_eq!(wp.param("origin_y").map(|p| p.value), Some(2.0));
        if let Some(p) = wp.param_mut("normal_z") {
            p.value = -1.0;
        }
        assert_eq!(wp.param("normal_z").map(|p| p.value), Some(-1.0));
        assert!(wp.param_mut("radius").is_none());
    }

    #[test]
    fn entity_data_serializes_with_type_tag() {
        let json = serde_json::to_string(&EntityData::point(1.0, 2.0)).unwrap();
        assert!(json.contains("\"type\":\"Point2D\""));
    }
}
