//! Multi-step construction tools as an explicit state machine.
//!
//! Step values live in the machine until the last confirm. Only the commit
//! touches the document, and a failed commit removes everything it created.

use serde::{Deserialize, Serialize};
use sketch_engine::Document;
use sketch_solver::{measure, SolveResult};
use sketch_types::{
    accepted_types, is_satisfiable, ConstraintId, ConstraintKind, EntityId, EntityKind,
};
use tracing::{debug, info, instrument, warn};

use crate::config::SnapConfig;
use crate::events::{parse_point, parse_scalar, InputEvent};
use crate::session::SessionContext;
use crate::snap::{find_snap, SnapKind, SnapTarget};
use crate::tool::{StepKind, ToolKind};
use crate::InteractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Idle,
    /// Zero-based `step` of `of` input steps.
    WaitingForInput { step: usize, of: usize },
    Committing,
    Cancelled,
}

/// A sampled or confirmed step value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepValue {
    Point {
        position: [f64; 2],
        snap: Option<SnapTarget>,
    },
    Scalar(f64),
    Entity(EntityId),
}

/// What the host draws as feedback while a tool is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub tool: ToolKind,
    pub step: usize,
    pub confirmed: Vec<StepValue>,
    pub pending: Option<StepValue>,
}

/// Everything one commit created.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub tool: ToolKind,
    pub entities: Vec<EntityId>,
    pub constraints: Vec<ConstraintId>,
    /// The tool's result: the new entity, or the reused point for a snapped
    /// point tool. `None` for constraint tools.
    pub primary: Option<EntityId>,
    pub solve: SolveResult,
}

#[derive(Debug, Clone)]
pub struct InteractionStateMachine {
    state: MachineState,
    tool: Option<ToolKind>,
    steps: Vec<StepKind>,
    step: usize,
    sketch: Option<EntityId>,
    confirmed: Vec<StepValue>,
    pending: Option<StepValue>,
    /// Typed input holds the pending value against pointer motion.
    typed: bool,
    last_commit: Option<Commit>,
}

impl Default for InteractionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionStateMachine {
    pub fn new() -> Self {
        Self {
            state: MachineState::Idle,
            tool: None,
            steps: Vec::new(),
            step: 0,
            sketch: None,
            confirmed: Vec::new(),
            pending: None,
            typed: false,
            last_commit: None,
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn tool(&self) -> Option<ToolKind> {
        self.tool
    }

    pub fn current_step(&self) -> Option<&StepKind> {
        match self.state {
            MachineState::WaitingForInput { .. } => self.steps.get(self.step),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<Preview> {
        match (self.state, self.tool) {
            (MachineState::WaitingForInput { .. }, Some(tool)) => Some(Preview {
                tool,
                step: self.step,
                confirmed: self.confirmed.clone(),
                pending: self.pending.clone(),
            }),
            _ => None,
        }
    }

    pub fn last_commit(&self) -> Option<&Commit> {
        self.last_commit.as_ref()
    }

    /// Start `tool` in the document's active sketch, discarding any running
    /// tool.
    pub fn begin(
        &mut self,
        tool: ToolKind,
        document: &Document,
        context: &mut SessionContext,
    ) -> Result<MachineState, InteractionError> {
        let sketch = document
            .active_sketch()
            .ok_or(InteractionError::NoActiveSketch)?;
        self.discard();
        context.reset();

        self.steps = tool.steps();
        self.tool = Some(tool);
        self.sketch = Some(sketch);
        self.state = MachineState::WaitingForInput {
            step: 0,
            of: self.steps.len(),
        };
        debug!(tool = %tool.label(), sketch = %sketch, "tool started");
        Ok(self.state)
    }

    fn discard(&mut self) {
        self.tool = None;
        self.steps.clear();
        self.step = 0;
        self.sketch = None;
        self.confirmed.clear();
        self.pending = None;
        self.typed = false;
    }

    fn waiting(&self) -> Result<(ToolKind, StepKind), InteractionError> {
        match (self.state, self.tool, self.steps.get(self.step)) {
            (MachineState::WaitingForInput { .. }, Some(tool), Some(step)) => {
                Ok((tool, step.clone()))
            }
            _ => Err(InteractionError::NoActiveTool),
        }
    }

    pub fn handle(
        &mut self,
        event: InputEvent,
        document: &mut Document,
        context: &mut SessionContext,
        snap: &SnapConfig,
    ) -> Result<MachineState, InteractionError> {
        match event {
            InputEvent::Hover { hit } => {
                context.set_hover(hit);
                if let Ok((_, StepKind::Entity { .. })) = self.waiting() {
                    self.pending = hit.map(|h| StepValue::Entity(h.entity));
                }
                Ok(self.state)
            }
            InputEvent::PointerMoved {
                position,
                pixels_per_unit,
            } => {
                if let Ok((_, step)) = self.waiting() {
                    self.sample(&step, document, position, pixels_per_unit, snap);
                }
                Ok(self.state)
            }
            InputEvent::Text { text } => {
                let (_, step) = self.waiting()?;
                self.pending = Some(match step {
                    StepKind::Point => StepValue::Point {
                        position: parse_point(&text)?,
                        snap: None,
                    },
                    StepKind::Scalar { .. } => StepValue::Scalar(parse_scalar(&text)?),
                    StepKind::Entity { .. } => {
                        return Err(InteractionError::InvalidState {
                            reason: "entity steps take no text".into(),
                        })
                    }
                });
                self.typed = true;
                Ok(self.state)
            }
            InputEvent::Confirm => self.confirm(document, snap),
            InputEvent::Cancel => {
                if let MachineState::WaitingForInput { .. } = self.state {
                    debug!(tool = ?self.tool, step = self.step, "tool cancelled");
                    self.discard();
                    self.state = MachineState::Cancelled;
                }
                Ok(self.state)
            }
        }
    }

    /// Update the pending value from the pointer unless it was typed.
    fn sample(
        &mut self,
        step: &StepKind,
        document: &Document,
        position: [f64; 2],
        pixels_per_unit: f64,
        snap: &SnapConfig,
    ) {
        if self.typed {
            return;
        }
        let Some(sketch) = self.sketch else {
            return;
        };
        match step {
            StepKind::Point => {
                let target = find_snap(document.graph(), sketch, position, pixels_per_unit, snap);
                self.pending = Some(StepValue::Point {
                    position: target.map_or(position, |t| t.position),
                    snap: target,
                });
            }
            StepKind::Scalar { .. } => {
                if let Some(StepValue::Point { position: center, .. }) = self.confirmed.first() {
                    if self.tool == Some(ToolKind::AddCircle) {
                        let radius = (position[0] - center[0]).hypot(position[1] - center[1]);
                        self.pending = Some(StepValue::Scalar(radius));
                    }
                }
            }
            StepKind::Entity { .. } => {}
        }
    }

    fn confirm(
        &mut self,
        document: &mut Document,
        snap: &SnapConfig,
    ) -> Result<MachineState, InteractionError> {
        let (tool, step) = self.waiting()?;
        match step {
            StepKind::Entity { slot } => {
                let ToolKind::Constrain(kind) = tool else {
                    return Err(InteractionError::InvalidState {
                        reason: "entity step outside a constraint tool".into(),
                    });
                };
                match self.pending.take() {
                    Some(StepValue::Entity(id)) => {
                        self.accept_entity(document, kind, slot, id)?;
                    }
                    _ => {
                        // Shorter signatures end the entity steps early.
                        let types = self.resolved_types(document)?;
                        if types.is_empty() || !is_satisfiable(kind, &types) {
                            return Err(InteractionError::NothingToConfirm);
                        }
                        self.skip_entity_steps();
                        return self.advance(document, snap);
                    }
                }
            }
            StepKind::Point => match self.pending.take() {
                Some(value @ StepValue::Point { .. }) => self.confirmed.push(value),
                _ => return Err(InteractionError::NothingToConfirm),
            },
            StepKind::Scalar { .. } => {
                let value = match self.pending.take() {
                    Some(StepValue::Scalar(v)) => v,
                    _ => self.default_scalar(document, tool)?,
                };
                self.confirmed.push(StepValue::Scalar(value));
            }
        }
        self.step += 1;
        self.advance(document, snap)
    }

    fn advance(
        &mut self,
        document: &mut Document,
        snap: &SnapConfig,
    ) -> Result<MachineState, InteractionError> {
        self.typed = false;
        self.pending = None;
        if self.step < self.steps.len() {
            self.state = MachineState::WaitingForInput {
                step: self.step,
                of: self.steps.len(),
            };
            return Ok(self.state);
        }
        self.commit(document, snap)
    }

    fn skip_entity_steps(&mut self) {
        while matches!(self.steps.get(self.step), Some(StepKind::Entity { .. })) {
            self.step += 1;
        }
    }

    fn entities(&self) -> Vec<EntityId> {
        self.confirmed
            .iter()
            .filter_map(|v| match v {
                StepValue::Entity(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn resolved_types(&self, document: &Document) -> Result<Vec<EntityKind>, InteractionError> {
        self.entities()
            .into_iter()
            .map(|id| Ok(document.graph().get(id)?.kind()))
            .collect()
    }

    fn accept_entity(
        &mut self,
        document: &Document,
        kind: ConstraintKind,
        slot: usize,
        id: EntityId,
    ) -> Result<(), InteractionError> {
        let found = document.graph().get(id)?.kind();
        let resolved: Vec<Option<EntityKind>> = self
            .resolved_types(document)?
            .into_iter()
            .map(Some)
            .collect();
        let accepted = accepted_types(kind, slot, &resolved);
        if !accepted.contains(&found) {
            return Err(InteractionError::WrongEntityType {
                entity: id,
                found,
                accepted,
            });
        }
        self.confirmed.push(StepValue::Entity(id));
        Ok(())
    }

    /// Dimensions default to the current measurement.
    fn default_scalar(&self, document: &Document, tool: ToolKind) -> Result<f64, InteractionError> {
        match tool {
            ToolKind::Constrain(kind) => measure(kind, &self.entities(), document.graph())
                .ok_or(InteractionError::NothingToConfirm),
            _ => Err(InteractionError::NothingToConfirm),
        }
    }

    // ── Commit ───────────────────────────────────────────────────────────────

    #[instrument(skip_all, fields(tool = ?self.tool))]
    fn commit(
        &mut self,
        document: &mut Document,
        snap: &SnapConfig,
    ) -> Result<MachineState, InteractionError> {
        self.state = MachineState::Committing;
        let (Some(tool), Some(sketch)) = (self.tool, self.sketch) else {
            self.discard();
            self.state = MachineState::Idle;
            return Err(InteractionError::NoActiveTool);
        };

        let mut tx = Transaction::new(sketch, snap.reuse_snapped_points);
        let outcome = tx
            .build(document, tool, &self.confirmed)
            .and_then(|primary| Ok((primary, document.solve(sketch)?)));

        self.discard();
        self.state = MachineState::Idle;
        match outcome {
            Ok((primary, solve)) => {
                info!(
                    entities = tx.entities.len(),
                    constraints = tx.constraints.len(),
                    state = %solve.state,
                    "tool committed"
                );
                self.last_commit = Some(Commit {
                    tool,
                    entities: tx.entities,
                    constraints: tx.constraints,
                    primary,
                    solve,
                });
                Ok(self.state)
            }
            Err(err) => {
                warn!(error = %err, "commit failed, rolling back");
                tx.rollback(document);
                Err(err)
            }
        }
    }
}

/// Entities and constraints created by one commit, for rollback.
struct Transaction {
    sketch: EntityId,
    reuse_snapped_points: bool,
    entities: Vec<EntityId>,
    constraints: Vec<ConstraintId>,
}

impl Transaction {
    fn new(sketch: EntityId, reuse_snapped_points: bool) -> Self {
        Self {
            sketch,
            reuse_snapped_points,
            entities: Vec::new(),
            constraints: Vec::new(),
        }
    }

    fn build(
        &mut self,
        document: &mut Document,
        tool: ToolKind,
        values: &[StepValue],
    ) -> Result<Option<EntityId>, InteractionError> {
        match (tool, values) {
            (ToolKind::AddPoint, [p]) => Ok(Some(self.point(document, p)?)),
            (ToolKind::AddLine, [a, b]) => {
                let (a, b) = (self.point(document, a)?, self.point(document, b)?);
                if a == b {
                    return Err(InteractionError::InvalidState {
                        reason: "line endpoints coincide".into(),
                    });
                }
                let line = document.add_line(self.sketch, a, b)?;
                self.entities.push(line);
                Ok(Some(line))
            }
            (ToolKind::AddCircle, [center, StepValue::Scalar(radius)]) => {
                if *radius <= 0.0 {
                    return Err(InteractionError::InvalidNumericInput {
                        input: radius.to_string(),
                    });
                }
                let center = self.point(document, center)?;
                let circle = document.add_circle(self.sketch, center, *radius)?;
                self.entities.push(circle);
                Ok(Some(circle))
            }
            (ToolKind::AddArc, [c, s, e]) => {
                let (c, s, e) = (
                    self.point(document, c)?,
                    self.point(document, s)?,
                    self.point(document, e)?,
                );
                let arc = document.add_arc(self.sketch, c, s, e)?;
                self.entities.push(arc);
                Ok(Some(arc))
            }
            (ToolKind::Constrain(kind), values) => {
                let mut refs = Vec::new();
                let mut value = None;
                for v in values {
                    match v {
                        StepValue::Entity(id) => refs.push(*id),
                        StepValue::Scalar(s) => value = Some(*s),
                        StepValue::Point { .. } => {}
                    }
                }
                self.constrain(document, kind, &refs, value)?;
                Ok(None)
            }
            _ => Err(InteractionError::InvalidState {
                reason: format!("{} got {} values", tool.label(), values.len()),
            }),
        }
    }

    /// Resolve a point step: reuse or create the point and add the implicit
    /// constraint its snap implies.
    fn point(&mut self, document: &mut Document, value: &StepValue) -> Result<EntityId, InteractionError> {
        let StepValue::Point { position, snap } = value else {
            return Err(InteractionError::InvalidState {
                reason: "expected a point".into(),
            });
        };
        match snap {
            Some(SnapTarget {
                kind: SnapKind::ExistingPoint | SnapKind::CurveEndpoint,
                entity: Some(existing),
                ..
            }) => {
                if self.reuse_snapped_points {
                    document.graph().get(*existing)?;
                    return Ok(*existing);
                }
                let p = self.new_point(document, *position)?;
                self.constrain(document, ConstraintKind::Coincident, &[p, *existing], None)?;
                Ok(p)
            }
            Some(SnapTarget {
                kind: SnapKind::CurveNearest,
                entity: Some(curve),
                ..
            }) => {
                let p = self.new_point(document, *position)?;
                self.constrain(document, ConstraintKind::Coincident, &[p, *curve], None)?;
                Ok(p)
            }
            _ => self.new_point(document, *position),
        }
    }

    fn new_point(&mut self, document: &mut Document, p: [f64; 2]) -> Result<EntityId, InteractionError> {
        let id = document.add_point(self.sketch, p[0], p[1])?;
        self.entities.push(id);
        Ok(id)
    }

    fn constrain(
        &mut self,
        document: &mut Document,
        kind: ConstraintKind,
        refs: &[EntityId],
        value: Option<f64>,
    ) -> Result<ConstraintId, InteractionError> {
        let id = document.add_constraint(kind, refs, value)?;
        self.constraints.push(id);
        Ok(id)
    }

    fn rollback(&self, document: &mut Document) {
        for id in self.constraints.iter().rev() {
            if let Err(err) = document.remove_constraint(*id) {
                debug!(constraint = %id, error = %err, "already gone");
            }
        }
        for id in self.entities.iter().rev() {
            if document.graph().contains(*id) {
                if let Err(err) = document.delete_entity(*id) {
                    warn!(entity = %id, error = %err, "rollback failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picking::PickHit;

    struct Fixture {
        doc: Document,
        ctx: SessionContext,
        machine: InteractionStateMachine,
        snap: SnapConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut doc = Document::new();
            let wp = doc.add_workplane([0.0; 3], [0.0, 0.0, 1.0]).unwrap();
            let sketch = doc.add_sketch("S", wp).unwrap();
            doc.set_active_sketch(Some(sketch)).unwrap();
            Self {
                doc,
                ctx: SessionContext::new(),
                machine: InteractionStateMachine::new(),
                snap: SnapConfig::default(),
            }
        }

        fn sketch(&self) -> EntityId {
            self.doc.active_sketch().unwrap()
        }

        fn begin(&mut self, tool: ToolKind) {
            self.machine.begin(tool, &self.doc, &mut self.ctx).unwrap();
        }

        fn send(&mut self, event: InputEvent) -> Result<MachineState, InteractionError> {
            self.machine
                .handle(event, &mut self.doc, &mut self.ctx, &self.snap)
        }

        fn type_and_confirm(&mut self, text: &str) -> MachineState {
            self.send(InputEvent::Text { text: text.into() }).unwrap();
            self.send(InputEvent::Confirm).unwrap()
        }
    }

    #[test]
    fn begin_needs_an_active_sketch() {
        let doc = Document::new();
        let mut machine = InteractionStateMachine::new();
        assert_eq!(
            machine.begin(ToolKind::AddPoint, &doc, &mut SessionContext::new()),
            Err(InteractionError::NoActiveSketch)
        );
    }

    #[test]
    fn confirm_while_idle_is_an_error() {
        let mut f = Fixture::new();
        assert_eq!(f.send(InputEvent::Confirm), Err(InteractionError::NoActiveTool));
        assert_eq!(f.send(InputEvent::Cancel), Ok(MachineState::Idle));
    }

    #[test]
    fn typed_line_commits_two_points_and_a_line() {
        let mut f = Fixture::new();
        f.begin(ToolKind::AddLine);
        assert_eq!(
            f.type_and_confirm("0,0"),
            MachineState::WaitingForInput { step: 1, of: 2 }
        );
        assert_eq!(f.type_and_confirm("4,0"), MachineState::Idle);

        let commit = f.machine.last_commit().unwrap();
        assert_eq!(commit.entities.len(), 3);
        assert!(commit.constraints.is_empty());
        assert_eq!(commit.solve.dof, Some(4));
        assert_eq!(f.doc.graph().entities_in(f.sketch()).count(), 3);
    }

    #[test]
    fn typed_value_overrides_pointer() {
        let mut f = Fixture::new();
        f.begin(ToolKind::AddPoint);
        f.send(InputEvent::Text { text: "2,3".into() }).unwrap();
        f.send(InputEvent::PointerMoved {
            position: [9.0, 9.0],
            pixels_per_unit: 1.0,
        })
        .unwrap();
        assert_eq!(
            f.machine.preview().unwrap().pending,
            Some(StepValue::Point {
                position: [2.0, 3.0],
                snap: None
            })
        );
    }

    #[test]
    fn circle_radius_follows_pointer() {
        let mut f = Fixture::new();
        f.begin(ToolKind::AddCircle);
        f.type_and_confirm("1,1");
        f.send(InputEvent::PointerMoved {
            position: [4.0, 5.0],
            pixels_per_unit: 1.0,
        })
        .unwrap();
        f.send(InputEvent::Confirm).unwrap();

        let circle = f.machine.last_commit().unwrap().primary.unwrap();
        let radius = f.doc.graph().get(circle).unwrap().data.param("radius").unwrap();
        assert!((radius.value - 5.0).abs() < 1e-12);
    }

    #[test]
    fn non_positive_radius_rolls_back() {
        let mut f = Fixture::new();
        f.begin(ToolKind::AddCircle);
        f.type_and_confirm("1,1");
        f.send(InputEvent::Text { text: "-2".into() }).unwrap();
        let err = f.send(InputEvent::Confirm).unwrap_err();
        assert!(matches!(err, InteractionError::InvalidNumericInput { .. }));
        assert_eq!(f.machine.state(), MachineState::Idle);
        assert_eq!(f.doc.graph().entities_in(f.sketch()).count(), 0);
    }

    #[test]
    fn constraint_tool_checks_entity_types() {
        let mut f = Fixture::new();
        let s = f.sketch();
        let c = f.doc.add_point(s, 0.0, 0.0).unwrap();
        let circle = f.doc.add_circle(s, c, 1.0).unwrap();
        let a = f.doc.add_point(s, 3.0, 0.0).unwrap();
        let b = f.doc.add_point(s, 5.0, 0.0).unwrap();
        let line = f.doc.add_line(s, a, b).unwrap();

        f.begin(ToolKind::Constrain(ConstraintKind::Equal));
        f.send(InputEvent::Hover {
            hit: Some(PickHit::entity(circle)),
        })
        .unwrap();
        f.send(InputEvent::Confirm).unwrap();
        f.send(InputEvent::Hover {
            hit: Some(PickHit::entity(line)),
        })
        .unwrap();
        let err = f.send(InputEvent::Confirm).unwrap_err();
        assert!(matches!(
            err,
            InteractionError::WrongEntityType { found: EntityKind::Line2D, .. }
        ));
        assert!(f.doc.constraints().is_empty());
    }

    #[test]
    fn distance_on_one_line_ends_entity_steps_early() {
        let mut f = Fixture::new();
        let s = f.sketch();
        let a = f.doc.add_point(s, 0.0, 0.0).unwrap();
        let b = f.doc.add_point(s, 3.0, 4.0).unwrap();
        let line = f.doc.add_line(s, a, b).unwrap();
        f.doc.set_fixed(a, true).unwrap();

        f.begin(ToolKind::Constrain(ConstraintKind::Distance));
        f.send(InputEvent::Hover {
            hit: Some(PickHit::entity(line)),
        })
        .unwrap();
        f.send(InputEvent::Confirm).unwrap();
        f.send(InputEvent::Hover { hit: None }).unwrap();
        let state = f.send(InputEvent::Confirm).unwrap();
        assert!(matches!(state, MachineState::WaitingForInput { step: 2, of: 3 }));

        // No typed value: the current length is used.
        f.send(InputEvent::Confirm).unwrap();
        let commit = f.machine.last_commit().unwrap();
        let constraint = f.doc.constraints().get(commit.constraints[0]).unwrap();
        assert!((constraint.value.unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn cancel_mid_tool_discards_preview() {
        let mut f = Fixture::new();
        f.begin(ToolKind::AddArc);
        f.type_and_confirm("0,0");
        assert_eq!(f.send(InputEvent::Cancel).unwrap(), MachineState::Cancelled);
        assert!(f.machine.preview().is_none());
        assert_eq!(f.send(InputEvent::Confirm), Err(InteractionError::NoActiveTool));
    }
}
