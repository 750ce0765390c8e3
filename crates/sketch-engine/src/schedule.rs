use std::collections::{BTreeMap, BTreeSet};

use sketch_types::{Constraint, EntityId};
use tracing::debug;

use crate::graph::EntityGraph;
use crate::types::EngineError;

/// Kahn's algorithm over `(from, to)` edges. Ready nodes are taken in id
/// order so the result is deterministic.
pub fn topological_order(
    nodes: impl IntoIterator<Item = EntityId>,
    edges: impl IntoIterator<Item = (EntityId, EntityId)>,
) -> Result<Vec<EntityId>, EngineError> {
    let mut indegree: BTreeMap<EntityId, usize> = nodes.into_iter().map(|n| (n, 0)).collect();
    let mut outgoing: BTreeMap<EntityId, Vec<EntityId>> = BTreeMap::new();
    for (from, to) in edges {
        indegree.entry(from).or_insert(0);
        *indegree.entry(to).or_insert(0) += 1;
        outgoing.entry(from).or_default().push(to);
    }

    let mut ready: BTreeSet<EntityId> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut order = Vec::with_capacity(indegree.len());

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for next in outgoing.get(&node).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*next);
                }
            }
        }
    }

    if order.len() < indegree.len() {
        let placed: BTreeSet<EntityId> = order.iter().copied().collect();
        let involved = indegree
            .keys()
            .filter(|n| !placed.contains(n))
            .copied()
            .collect();
        return Err(EngineError::StructuralCycle { involved });
    }
    Ok(order)
}

/// Tracks which entities and sketches need re-solving.
///
/// Constraint cycles are legal: all constraints of a sketch are solved
/// simultaneously, so only ownership edges take part in ordering.
#[derive(Debug, Clone, Default)]
pub struct DependencyScheduler {
    dirty_entities: BTreeSet<EntityId>,
    dirty_sketches: BTreeSet<EntityId>,
    observed: Option<u64>,
}

impl DependencyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` and everything downstream of it dirty, with their sketches.
    pub fn mark_entity(&mut self, graph: &EntityGraph, id: EntityId) {
        for entity in graph.dependents_closure(id) {
            if !graph.contains(entity) {
                continue;
            }
            self.dirty_entities.insert(entity);
            if let Some(sketch) = graph.owning_sketch(entity) {
                self.dirty_sketches.insert(sketch);
            }
        }
    }

    pub fn mark_constraint(&mut self, constraint: &Constraint) {
        self.dirty_sketches.insert(constraint.sketch);
    }

    pub fn mark_sketch(&mut self, sketch: EntityId) {
        self.dirty_sketches.insert(sketch);
    }

    pub fn mark_all(&mut self, graph: &EntityGraph) {
        self.dirty_sketches.extend(graph.sketches());
    }

    /// Record the graph generation this scheduler is in sync with.
    pub fn observe(&mut self, graph: &EntityGraph) {
        self.observed = Some(graph.generation());
    }

    /// True when the graph changed without this scheduler being told.
    pub fn is_stale(&self, graph: &EntityGraph) -> bool {
        self.observed != Some(graph.generation())
    }

    pub fn is_dirty(&self, sketch: EntityId) -> bool {
        self.dirty_sketches.contains(&sketch)
    }

    pub fn is_entity_dirty(&self, entity: EntityId) -> bool {
        self.dirty_entities.contains(&entity)
    }

    /// Dirty sketches in dependency order. A stale scheduler first marks
    /// every sketch dirty.
    pub fn dirty_batch(&mut self, graph: &EntityGraph) -> Result<Vec<EntityId>, EngineError> {
        if self.is_stale(graph) {
            debug!(generation = graph.generation(), "scheduler stale, marking all sketches");
            self.mark_all(graph);
            self.observe(graph);
        }
        self.dirty_sketches.retain(|s| graph.contains(*s));

        let order = topological_order(graph.ids(), graph.edges())?;
        Ok(order
            .into_iter()
            .filter(|id| self.dirty_sketches.contains(id))
            .collect())
    }

    /// Clear a solved sketch and its entities.
    pub fn clear(&mut self, graph: &EntityGraph, sketch: EntityId) {
        self.dirty_sketches.remove(&sketch);
        self.dirty_entities
            .retain(|e| graph.owning_sketch(*e) != Some(sketch) && *e != sketch);
    }

    /// Drop all state about a deleted sketch.
    pub fn forget(&mut self, sketch: EntityId) {
        self.dirty_sketches.remove(&sketch);
        self.dirty_entities.remove(&sketch);
    }

    /// Drop deleted entities.
    pub fn prune(&mut self, graph: &EntityGraph) {
        self.dirty_entities.retain(|e| graph.contains(*e));
        self.dirty_sketches.retain(|s| graph.contains(*s));
    }
}
