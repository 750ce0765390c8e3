use std::collections::{BTreeMap, BTreeSet, VecDeque};

use sketch_solver::{EntityLookup, ParamUpdate};
use sketch_types::{Entity, EntityData, EntityId, EntityKind};
use tracing::debug;

use crate::types::EngineError;

/// Arena of entities with a reverse index from each entity to the entities
/// that depend on it (by reference or, for sketches, by ownership).
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    entities: BTreeMap<EntityId, Entity>,
    dependents: BTreeMap<EntityId, BTreeSet<EntityId>>,
    next_id: u32,
    next_display: u32,
    generation: u64,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a new entity. Nothing changes on error.
    pub fn create(
        &mut self,
        data: EntityData,
        parent: Option<EntityId>,
    ) -> Result<EntityId, EngineError> {
        let kind = data.kind();
        let id = EntityId(self.next_id);

        match (kind.is_sketch_scoped(), parent) {
            (true, Some(sketch)) => {
                if self.get(sketch)?.kind() != EntityKind::Sketch {
                    return Err(EngineError::NotASketch { entity: sketch });
                }
            }
            (true, None) => {
                return Err(EngineError::InvalidParam {
                    entity: id,
                    param: "sketch".into(),
                    reason: format!("{kind} must belong to a sketch"),
                })
            }
            (false, Some(sketch)) => {
                return Err(EngineError::InvalidParam {
                    entity: sketch,
                    param: "sketch".into(),
                    reason: format!("{kind} is document-level"),
                })
            }
            (false, None) => {}
        }

        for (reference, expected) in data.reference_slots() {
            let target = self.get(reference)?;
            if target.kind() != expected {
                return Err(EngineError::TypeSignatureMismatch {
                    kind: format!("{kind} reference"),
                    found: vec![target.kind()],
                });
            }
            if kind.is_sketch_scoped() && target.sketch != parent {
                return Err(EngineError::CrossSketchReference {
                    entity: reference,
                    expected: parent,
                    found: target.sketch,
                });
            }
        }

        let mut data = data;
        if let EntityData::Arc {
            center,
            start,
            radius,
            ..
        } = &mut data
        {
            radius.value = self.distance(*center, *start).unwrap_or(0.0);
        }

        for reference in data.references().into_iter().chain(parent) {
            self.dependents.entry(reference).or_default().insert(id);
        }
        self.entities.insert(
            id,
            Entity {
                id,
                sketch: parent,
                data,
                visible: true,
                selected: false,
                construction: false,
                fixed: false,
                display_index: self.next_display,
            },
        );
        self.next_id += 1;
        self.next_display += 1;
        self.generation += 1;
        debug!(entity = %id, %kind, sketch = ?parent, "entity created");
        Ok(id)
    }

    pub fn get(&self, id: EntityId) -> Result<&Entity, EngineError> {
        self.entities
            .get(&id)
            .ok_or(EngineError::NotFound { entity: id })
    }

    fn get_mut(&mut self, id: EntityId) -> Result<&mut Entity, EngineError> {
        self.entities
            .get_mut(&id)
            .ok_or(EngineError::NotFound { entity: id })
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Monotonic counter bumped by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Set a user-editable parameter. Driven parameters are rejected.
    pub fn set_param(&mut self, id: EntityId, name: &str, value: f64) -> Result<(), EngineError> {
        let invalid = |reason: &str| EngineError::InvalidParam {
            entity: id,
            param: name.to_string(),
            reason: reason.to_string(),
        };
        if !value.is_finite() {
            return Err(invalid("value must be finite"));
        }
        let entity = self.get_mut(id)?;
        let param = entity
            .data
            .param_mut(name)
            .ok_or_else(|| invalid("no such parameter"))?;
        if param.driven {
            return Err(invalid("parameter is driven"));
        }
        param.value = value;
        self.refresh_driven(id);
        self.generation += 1;
        Ok(())
    }

    /// Write solved values, driven parameters included.
    pub(crate) fn apply_solution(&mut self, updates: &[ParamUpdate]) {
        for update in updates {
            if let Some(param) = self
                .entities
                .get_mut(&update.entity)
                .and_then(|e| e.data.param_mut(&update.param))
            {
                param.value = update.value;
            }
        }
        self.generation += 1;
    }

    /// Recompute driven arc radii that depend on point `id`.
    fn refresh_driven(&mut self, id: EntityId) {
        let arcs: Vec<EntityId> = self
            .children_of(id)
            .filter(|c| self.entities.get(c).is_some_and(|e| e.kind() == EntityKind::Arc))
            .collect();
        for arc in arcs {
            let Some(EntityData::Arc { center, start, .. }) =
                self.entities.get(&arc).map(|e| e.data.clone())
            else {
                continue;
            };
            let Some(value) = self.distance(center, start) else {
                continue;
            };
            if let Some(radius) = self
                .entities
                .get_mut(&arc)
                .and_then(|e| e.data.param_mut("radius"))
            {
                radius.value = value;
            }
        }
    }

    fn distance(&self, a: EntityId, b: EntityId) -> Option<f64> {
        let (pa, pb) = (self.position(a)?, self.position(b)?);
        Some((pa[0] - pb[0]).hypot(pa[1] - pb[1]))
    }

    fn set_flag(
        &mut self,
        id: EntityId,
        apply: impl FnOnce(&mut Entity),
    ) -> Result<(), EngineError> {
        apply(self.get_mut(id)?);
        self.generation += 1;
        Ok(())
    }

    pub fn set_visible(&mut self, id: EntityId, visible: bool) -> Result<(), EngineError> {
        self.set_flag(id, |e| e.visible = visible)
    }

    pub fn set_selected(&mut self, id: EntityId, selected: bool) -> Result<(), EngineError> {
        self.set_flag(id, |e| e.selected = selected)
    }

    pub fn set_construction(&mut self, id: EntityId, construction: bool) -> Result<(), EngineError> {
        self.set_flag(id, |e| e.construction = construction)
    }

    pub fn set_fixed(&mut self, id: EntityId, fixed: bool) -> Result<(), EngineError> {
        self.set_flag(id, |e| e.fixed = fixed)
    }

    /// Delete an entity and everything that transitively depends on it.
    /// Returns the dependents removed in addition to `id`.
    pub fn delete(&mut self, id: EntityId) -> Result<BTreeSet<EntityId>, EngineError> {
        self.get(id)?;
        let mut removed = self.dependents_closure(id);

        for gone in &removed {
            if let Some(entity) = self.entities.remove(gone) {
                for reference in entity.references().into_iter().chain(entity.sketch) {
                    if let Some(set) = self.dependents.get_mut(&reference) {
                        set.remove(gone);
                    }
                }
            }
            self.dependents.remove(gone);
        }
        self.generation += 1;

        removed.remove(&id);
        debug!(entity = %id, cascaded = removed.len(), "entity deleted");
        Ok(removed)
    }

    /// `id` plus every entity reachable along dependency edges.
    pub fn dependents_closure(&self, id: EntityId) -> BTreeSet<EntityId> {
        let mut seen = BTreeSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        seen
    }

    /// Direct dependents of `id`.
    pub fn children_of(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.dependents.get(&id).into_iter().flatten().copied()
    }

    /// Dependency edges `(referenced, dependent)`.
    pub fn edges(&self) -> impl Iterator<Item = (EntityId, EntityId)> + '_ {
        self.dependents
            .iter()
            .flat_map(|(from, to)| to.iter().map(move |t| (*from, *t)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn sketches(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .values()
            .filter(|e| e.kind() == EntityKind::Sketch)
            .map(|e| e.id)
    }

    pub fn entities_in(&self, sketch: EntityId) -> impl Iterator<Item = &Entity> {
        self.entities
            .values()
            .filter(move |e| e.sketch == Some(sketch))
    }

    /// The sketch an entity is solved in: itself for sketches.
    pub fn owning_sketch(&self, id: EntityId) -> Option<EntityId> {
        let entity = self.entities.get(&id)?;
        match entity.kind() {
            EntityKind::Sketch => Some(id),
            _ => entity.sketch,
        }
    }
}

impl EntityLookup for EntityGraph {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }
}
