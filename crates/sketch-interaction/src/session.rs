use std::collections::BTreeSet;

use sketch_engine::Document;
use sketch_solver::NewtonBackend;
use sketch_types::{ConstraintId, EntityId};
use tracing::debug;

use crate::config::SessionConfig;
use crate::events::InputEvent;
use crate::machine::{InteractionStateMachine, MachineState};
use crate::picking::{pick, IndexRenderTarget, PickHit, Viewport};
use crate::tool::ToolKind;
use crate::InteractionError;

/// Hover, selection and highlight of one interactive session.
///
/// Reset whenever the active tool changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    hover: Option<PickHit>,
    selection: BTreeSet<EntityId>,
    highlighted_constraint: Option<ConstraintId>,
    highlighted_entities: BTreeSet<EntityId>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hover(&self) -> Option<PickHit> {
        self.hover
    }

    /// Every hover sample drops the constraint and entity highlights.
    pub fn set_hover(&mut self, hit: Option<PickHit>) {
        self.highlighted_constraint = None;
        self.highlighted_entities.clear();
        self.hover = hit;
    }

    pub fn selection(&self) -> &BTreeSet<EntityId> {
        &self.selection
    }

    pub fn is_selected(&self, id: EntityId) -> bool {
        self.selection.contains(&id)
    }

    /// Flip selection of `id`; returns the new state.
    pub fn toggle_selection(&mut self, id: EntityId) -> bool {
        if self.selection.remove(&id) {
            false
        } else {
            self.selection.insert(id);
            true
        }
    }

    pub fn highlighted_constraint(&self) -> Option<ConstraintId> {
        self.highlighted_constraint
    }

    pub fn highlight_constraint(&mut self, constraint: Option<ConstraintId>) {
        self.highlighted_constraint = constraint;
    }

    pub fn highlighted_entities(&self) -> &BTreeSet<EntityId> {
        &self.highlighted_entities
    }

    /// Replace the highlighted entities, e.g. the members of a hovered
    /// constraint.
    pub fn highlight_entities(&mut self, entities: impl IntoIterator<Item = EntityId>) {
        self.highlighted_entities = entities.into_iter().collect();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A document plus the interactive state driving it.
pub struct Session {
    document: Document,
    context: SessionContext,
    machine: InteractionStateMachine,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let document = Document::with_backend(Box::new(NewtonBackend), config.solver.clone());
        Self::with_document(document, config)
    }

    pub fn with_document(document: Document, config: SessionConfig) -> Self {
        Self {
            document,
            context: SessionContext::new(),
            machine: InteractionStateMachine::new(),
            config,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn machine(&self) -> &InteractionStateMachine {
        &self.machine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> MachineState {
        self.machine.state()
    }

    pub fn begin_tool(&mut self, tool: ToolKind) -> Result<MachineState, InteractionError> {
        self.machine
            .begin(tool, &self.document, &mut self.context)
    }

    pub fn handle(&mut self, event: InputEvent) -> Result<MachineState, InteractionError> {
        self.machine.handle(
            event,
            &mut self.document,
            &mut self.context,
            &self.config.snap,
        )
    }

    /// Pick the element under pixel `(x, y)` of the active sketch and feed it
    /// to the machine as hover.
    pub fn hover_at(
        &mut self,
        target: &mut dyn IndexRenderTarget,
        viewport: &Viewport,
        x: u32,
        y: u32,
    ) -> Result<Option<PickHit>, InteractionError> {
        let hit = pick(
            target,
            self.document.graph(),
            self.document.active_sketch(),
            viewport,
            x,
            y,
        )?;
        debug!(x, y, ?hit, "picked");
        self.handle(InputEvent::Hover { hit })?;
        Ok(hit)
    }

    /// Toggle selection of the hovered entity, mirrored onto the entity flag.
    pub fn select_hovered(&mut self) -> Result<Option<EntityId>, InteractionError> {
        let Some(hit) = self.context.hover() else {
            return Ok(None);
        };
        let selected = !self.context.is_selected(hit.entity);
        self.document.set_selected(hit.entity, selected)?;
        self.context.toggle_selection(hit.entity);
        Ok(Some(hit.entity))
    }
}
