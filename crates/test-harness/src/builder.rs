//! SketchBuilder: fluent API for scripting sketches in tests.
//!
//! Entities and constraints are addressed by string names instead of ids.

use std::collections::HashMap;

use sketch_engine::Document;
use sketch_solver::SolveResult;
use sketch_types::{ConstraintId, ConstraintKind, EntityData, EntityId};
use tracing::debug;

use crate::helpers::HarnessError;

/// A document with one workplane and one active sketch, plus a name table.
pub struct SketchBuilder {
    doc: Document,
    sketch: EntityId,
    names: HashMap<String, EntityId>,
    constraints: HashMap<String, ConstraintId>,
}

impl SketchBuilder {
    pub fn new() -> Result<Self, HarnessError> {
        Self::with_document(Document::new())
    }

    pub fn with_document(mut doc: Document) -> Result<Self, HarnessError> {
        let wp = doc.add_workplane([0.0; 3], [0.0, 0.0, 1.0])?;
        let sketch = doc.add_sketch("Sketch", wp)?;
        doc.set_active_sketch(Some(sketch))?;
        Ok(Self {
            doc,
            sketch,
            names: HashMap::new(),
            constraints: HashMap::new(),
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    pub fn sketch(&self) -> EntityId {
        self.sketch
    }

    /// Add another sketch on the same workplane and make it the target of
    /// subsequent calls.
    pub fn new_sketch(&mut self, name: &str) -> Result<&mut Self, HarnessError> {
        let workplane = match self.doc.graph().get(self.sketch)?.data {
            EntityData::Sketch { workplane, .. } => workplane,
            _ => {
                return Err(HarnessError::AssertionFailed {
                    detail: format!("{} is not a sketch", self.sketch),
                })
            }
        };
        self.sketch = self.doc.add_sketch(name, workplane)?;
        self.doc.set_active_sketch(Some(self.sketch))?;
        Ok(self)
    }

    // ── Names ───────────────────────────────────────────────────────────

    pub fn id(&self, name: &str) -> Result<EntityId, HarnessError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| HarnessError::UnknownName {
                name: name.to_string(),
            })
    }

    pub fn constraint(&self, name: &str) -> Result<ConstraintId, HarnessError> {
        self.constraints
            .get(name)
            .copied()
            .ok_or_else(|| HarnessError::UnknownName {
                name: name.to_string(),
            })
    }

    fn ids(&self, names: &[&str]) -> Result<Vec<EntityId>, HarnessError> {
        names.iter().map(|n| self.id(n)).collect()
    }

    fn bind(&mut self, name: &str, id: EntityId) -> Result<&mut Self, HarnessError> {
        if self.names.contains_key(name) {
            return Err(HarnessError::DuplicateName {
                name: name.to_string(),
            });
        }
        debug!(name, %id, "bound entity");
        self.names.insert(name.to_string(), id);
        Ok(self)
    }

    // ── Entities ────────────────────────────────────────────────────────

    pub fn point(&mut self, name: &str, x: f64, y: f64) -> Result<&mut Self, HarnessError> {
        let id = self.doc.add_point(self.sketch, x, y)?;
        self.bind(name, id)
    }

    pub fn fixed_point(&mut self, name: &str, x: f64, y: f64) -> Result<&mut Self, HarnessError> {
        let id = self.doc.add_point(self.sketch, x, y)?;
        self.doc.set_fixed(id, true)?;
        self.bind(name, id)
    }

    pub fn line(&mut self, name: &str, p1: &str, p2: &str) -> Result<&mut Self, HarnessError> {
        let (p1, p2) = (self.id(p1)?, self.id(p2)?);
        let id = self.doc.add_line(self.sketch, p1, p2)?;
        self.bind(name, id)
    }

    pub fn circle(&mut self, name: &str, center: &str, radius: f64) -> Result<&mut Self, HarnessError> {
        let center = self.id(center)?;
        let id = self.doc.add_circle(self.sketch, center, radius)?;
        self.bind(name, id)
    }

    pub fn arc(
        &mut self,
        name: &str,
        center: &str,
        start: &str,
        end: &str,
    ) -> Result<&mut Self, HarnessError> {
        let (c, s, e) = (self.id(center)?, self.id(start)?, self.id(end)?);
        let id = self.doc.add_arc(self.sketch, c, s, e)?;
        self.bind(name, id)
    }

    // ── Constraints ─────────────────────────────────────────────────────

    /// Add a constraint under `name`.
    pub fn constrain(
        &mut self,
        name: &str,
        kind: ConstraintKind,
        entities: &[&str],
        value: Option<f64>,
    ) -> Result<&mut Self, HarnessError> {
        if self.constraints.contains_key(name) {
            return Err(HarnessError::DuplicateName {
                name: name.to_string(),
            });
        }
        let refs = self.ids(entities)?;
        let id = self.doc.add_constraint(kind, &refs, value)?;
        debug!(name, %id, %kind, "bound constraint");
        self.constraints.insert(name.to_string(), id);
        Ok(self)
    }

    // ── Solving & Queries ───────────────────────────────────────────────

    pub fn solve(&mut self) -> Result<SolveResult, HarnessError> {
        Ok(self.doc.solve(self.sketch)?)
    }

    pub fn solve_all(&mut self) -> Result<Vec<SolveResult>, HarnessError> {
        Ok(self.doc.solve_all()?)
    }

    pub fn position(&self, name: &str) -> Result<[f64; 2], HarnessError> {
        let id = self.id(name)?;
        self.doc
            .graph()
            .get(id)?
            .data
            .position()
            .ok_or_else(|| HarnessError::AssertionFailed {
                detail: format!("{name} is not a point"),
            })
    }

    pub fn param(&self, name: &str, param: &str) -> Result<f64, HarnessError> {
        let id = self.id(name)?;
        self.doc
            .graph()
            .get(id)?
            .data
            .param(param)
            .map(|p| p.value)
            .ok_or_else(|| HarnessError::AssertionFailed {
                detail: format!("{name} has no parameter {param}"),
            })
    }
}
