use std::collections::BTreeMap;

use sketch_types::{Constraint, Entity, EntityData, EntityId, EntityKind};

use crate::types::{
    ArcOps, Equation, EquationSource, LineOps, Operand, PointOps, Primitive, Problem, Unknown,
};
use crate::SolveError;

/// Read access to entities by id.
pub trait EntityLookup {
    fn entity(&self, id: EntityId) -> Option<&Entity>;

    fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        self.entity(id).map(Entity::kind)
    }

    fn position(&self, id: EntityId) -> Option<[f64; 2]> {
        self.entity(id).and_then(|e| e.data.position())
    }
}

impl EntityLookup for BTreeMap<EntityId, Entity> {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.get(&id)
    }
}

fn has_unknown(ops: &[Operand]) -> bool {
    ops.iter().any(|op| matches!(op, Operand::Unknown(_)))
}

/// Snapshot of one sketch's entities and constraints handed to the adapter.
#[derive(Debug, Clone)]
pub struct SketchView<'a> {
    pub sketch: EntityId,
    entities: BTreeMap<EntityId, &'a Entity>,
    constraints: Vec<&'a Constraint>,
}

impl<'a> SketchView<'a> {
    pub fn new(
        sketch: EntityId,
        entities: impl IntoIterator<Item = &'a Entity>,
        constraints: impl IntoIterator<Item = &'a Constraint>,
    ) -> Self {
        let mut constraints: Vec<&'a Constraint> = constraints.into_iter().collect();
        constraints.sort_by_key(|c| c.id);
        SketchView {
            sketch,
            entities: entities.into_iter().map(|e| (e.id, e)).collect(),
            constraints,
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &'a Entity> + '_ {
        self.entities.values().copied()
    }

    pub fn constraints(&self) -> &[&'a Constraint] {
        &self.constraints
    }
}

impl EntityLookup for SketchView<'_> {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id).copied()
    }
}

/// Maps sketch entities onto solver unknowns.
///
/// Free parameters become unknowns and parameters of fixed entities become
/// constants. Driven parameters become unknowns pinned by an intrinsic
/// equation.
pub struct ProblemBuilder<'v, 'a> {
    pub view: &'v SketchView<'a>,
    pub problem: Problem,
    slots: BTreeMap<(EntityId, &'static str), usize>,
}

impl<'v, 'a> ProblemBuilder<'v, 'a> {
    pub fn new(view: &'v SketchView<'a>) -> Self {
        ProblemBuilder {
            view,
            problem: Problem::default(),
            slots: BTreeMap::new(),
        }
    }

    /// Allocate unknowns for every free parameter, then add the intrinsic
    /// equations of arcs.
    ///
    /// An arc radius is an unknown only while its center or start point can
    /// move; an arc whose defining points are all constant contributes no rows.
    pub fn add_entities(&mut self) -> Result<(), SolveError> {
        let view = self.view;
        for entity in view.entities() {
            if !entity.kind().is_sketch_scoped() || entity.fixed {
                continue;
            }
            for (name, param) in entity.data.params() {
                if !param.driven {
                    self.allocate(entity, name, param.value);
                }
            }
        }

        for entity in view.entities() {
            let EntityData::Arc {
                center, start, end, ..
            } = entity.data
            else {
                continue;
            };
            let (c, rim, e) = (self.point(center)?, self.point(start)?, self.point(end)?);
            let source = EquationSource::Entity(entity.id);

            let rim_moves = has_unknown(&[c[0], c[1], rim[0], rim[1]]);
            let radius = if rim_moves && !entity.fixed {
                let value = entity.data.param("radius").map_or(0.0, |p| p.value);
                Operand::Unknown(self.allocate(entity, "radius", value))
            } else {
                self.operand(entity, "radius")
            };
            let radius_moves = has_unknown(&[radius]);

            if rim_moves || radius_moves {
                self.push(
                    Primitive::RadiusDefinition {
                        radius,
                        center: c,
                        rim,
                    },
                    source,
                );
            }
            if radius_moves || has_unknown(&[c[0], c[1], e[0], e[1]]) {
                self.push(
                    Primitive::PtOnCircle {
                        point: e,
                        center: c,
                        radius,
                    },
                    source,
                );
            }
        }
        Ok(())
    }

    fn allocate(&mut self, entity: &Entity, name: &'static str, initial: f64) -> usize {
        let index = self.problem.unknowns.len();
        self.problem.unknowns.push(Unknown {
            initial,
            label: format!("{}.{}", entity.id, name),
        });
        self.slots.insert((entity.id, name), index);
        index
    }

    pub fn push(&mut self, primitive: Primitive, source: EquationSource) {
        self.problem.equations.push(Equation { primitive, source });
    }

    /// Solver index of an entity parameter, if it is an unknown.
    pub fn slot(&self, entity: EntityId, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .find(|((id, n), _)| *id == entity && *n == name)
            .map(|(_, index)| *index)
    }

    /// Unknown slots keyed by entity and parameter name.
    pub fn slots(&self) -> impl Iterator<Item = (EntityId, &'static str, usize)> + '_ {
        self.slots.iter().map(|((id, name), index)| (*id, *name, *index))
    }

    fn operand(&self, entity: &Entity, name: &'static str) -> Operand {
        match self.slots.get(&(entity.id, name)) {
            Some(index) => Operand::Unknown(*index),
            None => Operand::Constant(entity.data.param(name).map_or(0.0, |p| p.value)),
        }
    }

    fn expect(&self, id: EntityId, kind: EntityKind) -> Result<&'a Entity, SolveError> {
        self.view
            .entities
            .get(&id)
            .copied()
            .filter(|e| e.kind() == kind)
            .ok_or(SolveError::MissingEntity { entity: id })
    }

    pub fn point(&self, id: EntityId) -> Result<PointOps, SolveError> {
        let entity = self.expect(id, EntityKind::Point2D)?;
        Ok([self.operand(entity, "x"), self.operand(entity, "y")])
    }

    pub fn line(&self, id: EntityId) -> Result<LineOps, SolveError> {
        match self.expect(id, EntityKind::Line2D)?.data {
            EntityData::Line2D { p1, p2 } => Ok(LineOps {
                a: self.point(p1)?,
                b: self.point(p2)?,
            }),
            _ => Err(SolveError::MissingEntity { entity: id }),
        }
    }

    /// Center and radius operands of an arc or circle.
    pub fn curve(&self, id: EntityId) -> Result<(PointOps, Operand), SolveError> {
        let entity = self
            .view
            .entity(id)
            .ok_or(SolveError::MissingEntity { entity: id })?;
        match entity.data {
            EntityData::Circle { center, .. } | EntityData::Arc { center, .. } => {
                Ok((self.point(center)?, self.operand(entity, "radius")))
            }
            _ => Err(SolveError::MissingEntity { entity: id }),
        }
    }

    pub fn arc(&self, id: EntityId) -> Result<ArcOps, SolveError> {
        let entity = self.expect(id, EntityKind::Arc)?;
        match entity.data {
            EntityData::Arc {
                center,
                start,
                end,
                invert,
                ..
            } => Ok(ArcOps {
                center: self.point(center)?,
                start: self.point(start)?,
                end: self.point(end)?,
                radius: self.operand(entity, "radius"),
                invert,
            }),
            _ => Err(SolveError::MissingEntity { entity: id }),
        }
    }
}
