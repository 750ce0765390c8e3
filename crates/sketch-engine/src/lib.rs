pub mod constraints;
pub mod graph;
pub mod schedule;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};

use sketch_solver::{measure, solve_sketch, NewtonBackend, SketchView, SolveResult, SolverBackend, SolverConfig};
use sketch_types::{
    ConstraintId, ConstraintKind, EntityData, EntityId, EntityKind, SketchStatus, SolverState,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub use crate::constraints::ConstraintSet;
pub use crate::graph::EntityGraph;
pub use crate::schedule::{topological_order, DependencyScheduler};
pub use crate::types::{EngineError, Removal};

/// A sketch document: entities, constraints and per-sketch solve state.
///
/// Every edit marks the scheduler; [`Document::solve_all`] re-solves the dirty
/// sketches independently.
pub struct Document {
    pub id: Uuid,
    graph: EntityGraph,
    constraints: ConstraintSet,
    scheduler: DependencyScheduler,
    status: BTreeMap<EntityId, SketchStatus>,
    active_sketch: Option<EntityId>,
    config: SolverConfig,
    backend: Box<dyn SolverBackend>,
}

impl Document {
    /// Create an empty document solved by the built-in backend.
    pub fn new() -> Self {
        Self::with_backend(Box::new(NewtonBackend), SolverConfig::default())
    }

    pub fn with_backend(backend: Box<dyn SolverBackend>, config: SolverConfig) -> Self {
        let graph = EntityGraph::new();
        let mut scheduler = DependencyScheduler::new();
        scheduler.observe(&graph);
        Self {
            id: Uuid::new_v4(),
            graph,
            constraints: ConstraintSet::new(),
            scheduler,
            status: BTreeMap::new(),
            active_sketch: None,
            config,
            backend,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn status(&self, sketch: EntityId) -> Option<&SketchStatus> {
        self.status.get(&sketch)
    }

    pub fn sketches(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.graph.sketches()
    }

    pub fn is_dirty(&self, sketch: EntityId) -> bool {
        self.scheduler.is_dirty(sketch)
    }

    pub fn active_sketch(&self) -> Option<EntityId> {
        self.active_sketch
    }

    pub fn set_active_sketch(&mut self, sketch: Option<EntityId>) -> Result<(), EngineError> {
        if let Some(id) = sketch {
            self.expect_sketch(id)?;
        }
        self.active_sketch = sketch;
        Ok(())
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn expect_sketch(&self, id: EntityId) -> Result<(), EngineError> {
        if self.graph.get(id)?.kind() != EntityKind::Sketch {
            return Err(EngineError::NotASketch { entity: id });
        }
        Ok(())
    }

    // ── Entities ─────────────────────────────────────────────────────────────

    /// Create any entity. 2D entities need their sketch as `parent`.
    pub fn create(
        &mut self,
        data: EntityData,
        parent: Option<EntityId>,
    ) -> Result<EntityId, EngineError> {
        let id = self.graph.create(data, parent)?;
        if self.graph.get(id)?.kind() == EntityKind::Sketch {
            self.status.insert(id, SketchStatus::default());
        }
        self.touch(id);
        Ok(id)
    }

    pub fn add_workplane(&mut self, origin: [f64; 3], normal: [f64; 3]) -> Result<EntityId, EngineError> {
        self.create(EntityData::workplane(origin, normal), None)
    }

    pub fn add_sketch(&mut self, name: &str, workplane: EntityId) -> Result<EntityId, EngineError> {
        self.create(EntityData::sketch(name, workplane), None)
    }

    pub fn add_point(&mut self, sketch: EntityId, x: f64, y: f64) -> Result<EntityId, EngineError> {
        self.create(EntityData::point(x, y), Some(sketch))
    }

    pub fn add_line(&mut self, sketch: EntityId, p1: EntityId, p2: EntityId) -> Result<EntityId, EngineError> {
        self.create(EntityData::line(p1, p2), Some(sketch))
    }

    pub fn add_circle(&mut self, sketch: EntityId, center: EntityId, radius: f64) -> Result<EntityId, EngineError> {
        self.create(EntityData::circle(center, radius), Some(sketch))
    }

    pub fn add_arc(
        &mut self,
        sketch: EntityId,
        center: EntityId,
        start: EntityId,
        end: EntityId,
    ) -> Result<EntityId, EngineError> {
        self.create(EntityData::arc(center, start, end), Some(sketch))
    }

    pub fn set_param(&mut self, id: EntityId, name: &str, value: f64) -> Result<(), EngineError> {
        self.graph.set_param(id, name, value)?;
        self.touch(id);
        Ok(())
    }

    pub fn set_fixed(&mut self, id: EntityId, fixed: bool) -> Result<(), EngineError> {
        self.graph.set_fixed(id, fixed)?;
        self.touch(id);
        Ok(())
    }

    // Display flags do not affect the solution.

    pub fn set_construction(&mut self, id: EntityId, construction: bool) -> Result<(), EngineError> {
        self.graph.set_construction(id, construction)?;
        self.scheduler.observe(&self.graph);
        Ok(())
    }

    pub fn set_visible(&mut self, id: EntityId, visible: bool) -> Result<(), EngineError> {
        self.graph.set_visible(id, visible)?;
        self.scheduler.observe(&self.graph);
        Ok(())
    }

    pub fn set_selected(&mut self, id: EntityId, selected: bool) -> Result<(), EngineError> {
        self.graph.set_selected(id, selected)?;
        self.scheduler.observe(&self.graph);
        Ok(())
    }

    /// Delete an entity, its dependents and every constraint on them.
    pub fn delete_entity(&mut self, id: EntityId) -> Result<Removal, EngineError> {
        let owner = self.graph.get(id)?.sketch;
        let cascaded = self.graph.delete(id)?;

        let mut removed: BTreeSet<EntityId> = cascaded.clone();
        removed.insert(id);
        let constraints = self.constraints.remove_referencing(&removed);

        for gone in &removed {
            if self.status.remove(gone).is_some() {
                self.scheduler.forget(*gone);
                if self.active_sketch == Some(*gone) {
                    self.active_sketch = None;
                }
            }
        }
        self.scheduler.prune(&self.graph);
        if let Some(sketch) = owner.filter(|s| self.graph.contains(*s)) {
            self.scheduler.mark_sketch(sketch);
        }
        self.scheduler.observe(&self.graph);
        self.sync_dirty();

        debug!(entity = %id, cascaded = cascaded.len(), constraints = constraints.len(), "removed");
        Ok(Removal {
            entity: id,
            cascaded,
            constraints,
        })
    }

    fn touch(&mut self, id: EntityId) {
        self.scheduler.mark_entity(&self.graph, id);
        self.scheduler.observe(&self.graph);
        self.sync_dirty();
    }

    /// Copy the scheduler's dirty set into the stored sketch status.
    fn sync_dirty(&mut self) {
        for (sketch, status) in self.status.iter_mut() {
            status.dirty = self.scheduler.is_dirty(*sketch);
        }
    }

    // ── Constraints ──────────────────────────────────────────────────────────

    pub fn add_constraint(
        &mut self,
        kind: ConstraintKind,
        refs: &[EntityId],
        value: Option<f64>,
    ) -> Result<ConstraintId, EngineError> {
        let id = self.constraints.add(&self.graph, kind, refs, value)?;
        self.scheduler.mark_constraint(self.constraints.get(id)?);
        self.sync_dirty();
        Ok(id)
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), EngineError> {
        let removed = self.constraints.remove(id)?;
        self.scheduler.mark_constraint(&removed);
        self.sync_dirty();
        Ok(())
    }

    pub fn set_constraint_value(&mut self, id: ConstraintId, value: f64) -> Result<(), EngineError> {
        self.constraints.set_value(id, value)?;
        self.scheduler.mark_constraint(self.constraints.get(id)?);
        self.sync_dirty();
        Ok(())
    }

    pub fn set_reference(&mut self, id: ConstraintId, reference: bool) -> Result<(), EngineError> {
        self.constraints.set_reference(id, reference)?;
        self.scheduler.mark_constraint(self.constraints.get(id)?);
        self.sync_dirty();
        Ok(())
    }

    pub fn set_constraint_visible(&mut self, id: ConstraintId, visible: bool) -> Result<(), EngineError> {
        self.constraints.set_visible(id, visible)
    }

    pub fn set_all_constraints_visible(&mut self, sketch: Option<EntityId>, visible: bool) {
        self.constraints.set_all_visibility(sketch, visible);
    }

    // ── Solving ──────────────────────────────────────────────────────────────

    /// Solve one sketch and apply the outcome.
    ///
    /// Okay and Redundant write solved values back. Inconsistent flags the
    /// implicated constraints and keeps positions. DidNotConverge keeps
    /// positions and leaves the sketch dirty.
    #[instrument(skip(self), fields(document = %self.id))]
    pub fn solve(&mut self, sketch: EntityId) -> Result<SolveResult, EngineError> {
        self.expect_sketch(sketch)?;
        let view = SketchView::new(
            sketch,
            self.graph.entities_in(sketch),
            self.constraints.in_sketch(sketch),
        );
        let result = solve_sketch(&view, self.backend.as_ref(), &self.config)?;

        self.constraints.clear_failed(sketch);
        match result.state {
            SolverState::Okay | SolverState::Redundant => {
                self.graph.apply_solution(&result.updated_params);
                self.refresh_reference_values(sketch);
            }
            SolverState::Inconsistent => {
                for id in &result.failed_constraints {
                    self.constraints.set_failed(*id, true)?;
                }
            }
            SolverState::DidNotConverge | SolverState::Unknown => {
                warn!(sketch = %sketch, "keeping previous positions");
            }
        }

        let settled = result.state != SolverState::DidNotConverge;
        if settled {
            self.scheduler.clear(&self.graph, sketch);
        } else {
            self.scheduler.mark_sketch(sketch);
        }
        self.scheduler.observe(&self.graph);

        self.status.insert(
            sketch,
            SketchStatus {
                state: result.state,
                dof: result.dof,
                dirty: !settled,
                message: result.message.clone(),
                failed_constraints: result.failed_constraints.clone(),
                last_generation: self.graph.generation(),
            },
        );
        Ok(result)
    }

    /// Solve every dirty sketch in dependency order.
    pub fn solve_all(&mut self) -> Result<Vec<SolveResult>, EngineError> {
        let batch = self.scheduler.dirty_batch(&self.graph)?;
        self.sync_dirty();
        let mut results = Vec::with_capacity(batch.len());
        for sketch in batch {
            results.push(self.solve(sketch)?);
        }
        Ok(results)
    }

    /// Overwrite reference dimensions with their measured values.
    fn refresh_reference_values(&mut self, sketch: EntityId) {
        let measured: Vec<(ConstraintId, f64)> = self
            .constraints
            .in_sketch(sketch)
            .filter(|c| c.reference)
            .filter_map(|c| measure(c.kind, &c.entities, &self.graph).map(|v| (c.id, v)))
            .collect();
        for (id, value) in measured {
            if let Ok(constraint) = self.constraints.get_mut(id) {
                constraint.value = Some(value);
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
