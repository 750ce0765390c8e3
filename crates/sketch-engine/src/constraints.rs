use std::collections::{BTreeMap, BTreeSet};

use sketch_types::{is_satisfiable, Constraint, ConstraintId, ConstraintKind, EntityData, EntityId, EntityKind};
use tracing::debug;

use crate::graph::EntityGraph;
use crate::types::EngineError;

/// All constraints of a document, keyed by id.
///
/// Constraints reference entities by id and never own them.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: BTreeMap<ConstraintId, Constraint>,
    next_id: u32,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a constraint between entities of one sketch.
    pub fn add(
        &mut self,
        graph: &EntityGraph,
        kind: ConstraintKind,
        refs: &[EntityId],
        value: Option<f64>,
    ) -> Result<ConstraintId, EngineError> {
        let entities = refs
            .iter()
            .map(|id| graph.get(*id))
            .collect::<Result<Vec<_>, _>>()?;

        let types: Vec<EntityKind> = entities.iter().map(|e| e.kind()).collect();
        if !is_satisfiable(kind, &types) {
            return Err(EngineError::TypeSignatureMismatch {
                kind: kind.to_string(),
                found: types,
            });
        }

        let sketch = entities.first().and_then(|e| e.sketch);
        let Some(sketch) = sketch else {
            return Err(EngineError::TypeSignatureMismatch {
                kind: kind.to_string(),
                found: types,
            });
        };
        if let Some(other) = entities.iter().find(|e| e.sketch != Some(sketch)) {
            return Err(EngineError::CrossSketchReference {
                entity: other.id,
                expected: Some(sketch),
                found: other.sketch,
            });
        }

        let value = if kind.is_dimensional() {
            match value {
                Some(v) if v.is_finite() => Some(v),
                _ => return Err(EngineError::MissingValue { kind }),
            }
        } else {
            None
        };

        let workplane = match graph.get(sketch)?.data {
            EntityData::Sketch { workplane, .. } => Some(workplane),
            _ => None,
        };

        let id = ConstraintId(self.next_id);
        self.next_id += 1;
        self.constraints.insert(
            id,
            Constraint {
                id,
                kind,
                entities: refs.to_vec(),
                value,
                sketch,
                workplane,
                failed: false,
                reference: false,
                visible: true,
                name: format!("{kind} {id}"),
            },
        );
        debug!(constraint = %id, %kind, sketch = %sketch, "constraint added");
        Ok(id)
    }

    pub fn remove(&mut self, id: ConstraintId) -> Result<Constraint, EngineError> {
        self.constraints
            .remove(&id)
            .ok_or(EngineError::ConstraintNotFound { constraint: id })
    }

    pub fn get(&self, id: ConstraintId) -> Result<&Constraint, EngineError> {
        self.constraints
            .get(&id)
            .ok_or(EngineError::ConstraintNotFound { constraint: id })
    }

    pub fn get_mut(&mut self, id: ConstraintId) -> Result<&mut Constraint, EngineError> {
        self.constraints
            .get_mut(&id)
            .ok_or(EngineError::ConstraintNotFound { constraint: id })
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    /// Constraints that reference `entity`.
    pub fn by_entity(&self, entity: EntityId) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .values()
            .filter(move |c| c.references(entity))
    }

    pub fn in_sketch(&self, sketch: EntityId) -> impl Iterator<Item = &Constraint> {
        self.constraints.values().filter(move |c| c.sketch == sketch)
    }

    pub fn dimensional(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values().filter(|c| c.kind.is_dimensional())
    }

    pub fn geometric(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values().filter(|c| !c.kind.is_dimensional())
    }

    /// Remove every constraint referencing one of `entities`.
    pub fn remove_referencing(&mut self, entities: &BTreeSet<EntityId>) -> Vec<ConstraintId> {
        let doomed: Vec<ConstraintId> = self
            .constraints
            .values()
            .filter(|c| c.entities.iter().any(|e| entities.contains(e)))
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            self.constraints.remove(id);
        }
        doomed
    }

    pub fn set_value(&mut self, id: ConstraintId, value: f64) -> Result<(), EngineError> {
        let constraint = self.get_mut(id)?;
        if !constraint.kind.is_dimensional() || !value.is_finite() {
            return Err(EngineError::MissingValue {
                kind: constraint.kind,
            });
        }
        constraint.value = Some(value);
        Ok(())
    }

    /// Reference constraints are measured instead of solved.
    pub fn set_reference(&mut self, id: ConstraintId, reference: bool) -> Result<(), EngineError> {
        self.get_mut(id)?.reference = reference;
        Ok(())
    }

    pub fn set_visible(&mut self, id: ConstraintId, visible: bool) -> Result<(), EngineError> {
        self.get_mut(id)?.visible = visible;
        Ok(())
    }

    /// Show or hide every constraint, or only those of one sketch.
    pub fn set_all_visibility(&mut self, sketch: Option<EntityId>, visible: bool) {
        for constraint in self.constraints.values_mut() {
            if sketch.map_or(true, |s| constraint.sketch == s) {
                constraint.visible = visible;
            }
        }
    }

    pub fn set_failed(&mut self, id: ConstraintId, failed: bool) -> Result<(), EngineError> {
        self.get_mut(id)?.failed = failed;
        Ok(())
    }

    pub fn clear_failed(&mut self, sketch: EntityId) {
        for constraint in self.constraints.values_mut() {
            if constraint.sketch == sketch {
                constraint.failed = false;
            }
        }
    }
}
