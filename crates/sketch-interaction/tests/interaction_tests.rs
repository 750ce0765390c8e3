use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use sketch_engine::Document;
use sketch_interaction::{
    IndexBuffer, InputEvent, MachineState, PickHit, Session, SessionConfig, SnapConfig, StepValue,
    ToolKind, Viewport,
};
use sketch_types::{Constraint, ConstraintKind, Entity, EntityId, SolverState};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn session_with(snap: SnapConfig) -> (Session, EntityId) {
    let mut doc = Document::new();
    let wp = doc.add_workplane([0.0; 3], [0.0, 0.0, 1.0]).unwrap();
    let sketch = doc.add_sketch("Sketch", wp).unwrap();
    doc.set_active_sketch(Some(sketch)).unwrap();
    let config = SessionConfig {
        snap,
        ..SessionConfig::default()
    };
    (Session::with_document(doc, config), sketch)
}

fn session() -> (Session, EntityId) {
    session_with(SnapConfig::default())
}

fn snapshot(session: &Session) -> (Vec<Entity>, Vec<Constraint>, u64) {
    let doc = session.document();
    (
        doc.graph().iter().cloned().collect(),
        doc.constraints().iter().cloned().collect(),
        doc.graph().generation(),
    )
}

fn move_to(session: &mut Session, x: f64, y: f64) {
    session
        .handle(InputEvent::PointerMoved {
            position: [x, y],
            pixels_per_unit: 1.0,
        })
        .unwrap();
}

fn position(session: &Session, id: EntityId) -> [f64; 2] {
    session
        .document()
        .graph()
        .get(id)
        .unwrap()
        .data
        .position()
        .unwrap()
}

// ── Cancellation ────────────────────────────────────────────────────────────

#[test]
fn cancelling_snapped_line_leaves_document_untouched() {
    let (mut s, sketch) = session();
    s.document_mut().add_point(sketch, 1.0, 1.0).unwrap();
    let before = snapshot(&s);

    s.begin_tool(ToolKind::AddLine).unwrap();
    move_to(&mut s, 1.5, 1.2);
    let preview = s.machine().preview().unwrap();
    assert!(matches!(
        preview.pending,
        Some(StepValue::Point { snap: Some(_), .. })
    ));
    s.handle(InputEvent::Confirm).unwrap();
    move_to(&mut s, 20.0, 20.0);
    assert_eq!(s.handle(InputEvent::Cancel).unwrap(), MachineState::Cancelled);

    assert_eq!(snapshot(&s), before);
}

// ── Snapped commits ─────────────────────────────────────────────────────────

#[test]
fn snapping_onto_a_point_reuses_it() {
    let (mut s, sketch) = session();
    let existing = s.document_mut().add_point(sketch, 1.0, 1.0).unwrap();

    s.begin_tool(ToolKind::AddLine).unwrap();
    move_to(&mut s, 1.5, 1.2);
    s.handle(InputEvent::Confirm).unwrap();
    s.handle(InputEvent::Text {
        text: "30, 30".into(),
    })
    .unwrap();
    assert_eq!(s.handle(InputEvent::Confirm).unwrap(), MachineState::Idle);

    let commit = s.machine().last_commit().unwrap();
    assert_eq!(commit.entities.len(), 2);
    assert!(commit.constraints.is_empty());
    let line = commit.primary.unwrap();
    assert!(s.document().graph().get(line).unwrap().references().contains(&existing));
}

#[test]
fn snapping_without_reuse_adds_coincident() {
    let (mut s, sketch) = session_with(SnapConfig {
        reuse_snapped_points: false,
        ..SnapConfig::default()
    });
    let existing = s.document_mut().add_point(sketch, 1.0, 1.0).unwrap();

    s.begin_tool(ToolKind::AddPoint).unwrap();
    move_to(&mut s, 1.5, 1.2);
    s.handle(InputEvent::Confirm).unwrap();

    let commit = s.machine().last_commit().unwrap();
    assert_eq!(commit.solve.state, SolverState::Okay);
    let constraint = s
        .document()
        .constraints()
        .get(commit.constraints[0])
        .unwrap();
    assert_eq!(constraint.kind, ConstraintKind::Coincident);
    let point = commit.primary.unwrap();
    assert_eq!(constraint.entities, vec![point, existing]);

    let [x, y] = position(&s, point);
    let [ex, ey] = position(&s, existing);
    assert_abs_diff_eq!(x, ex, epsilon = 1e-6);
    assert_abs_diff_eq!(y, ey, epsilon = 1e-6);
}

#[test]
fn snapping_onto_a_line_constrains_to_it() {
    let (mut s, sketch) = session_with(SnapConfig {
        tolerance_px: 2.0,
        ..SnapConfig::default()
    });
    let doc = s.document_mut();
    let a = doc.add_point(sketch, 0.0, 0.0).unwrap();
    let b = doc.add_point(sketch, 20.0, 0.0).unwrap();
    let line = doc.add_line(sketch, a, b).unwrap();

    s.begin_tool(ToolKind::AddPoint).unwrap();
    move_to(&mut s, 8.0, 1.0);
    s.handle(InputEvent::Confirm).unwrap();

    let commit = s.machine().last_commit().unwrap().clone();
    let point = commit.primary.unwrap();
    let constraint = s
        .document()
        .constraints()
        .get(commit.constraints[0])
        .unwrap();
    assert_eq!(constraint.entities, vec![point, line]);
    let [_, y] = position(&s, point);
    assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
}

#[test]
fn tool_change_resets_context() {
    let (mut s, sketch) = session();
    let p = s.document_mut().add_point(sketch, 0.0, 0.0).unwrap();
    s.handle(InputEvent::Hover {
        hit: Some(PickHit::entity(p)),
    })
    .unwrap();
    s.select_hovered().unwrap();
    assert!(s.context().is_selected(p));

    s.begin_tool(ToolKind::AddPoint).unwrap();
    assert!(s.context().selection().is_empty());
    assert_eq!(s.context().hover(), None);
}

// ── Picking ─────────────────────────────────────────────────────────────────

#[test]
fn picking_resolves_points_over_curves() {
    let (mut s, sketch) = session();
    let doc = s.document_mut();
    let a = doc.add_point(sketch, 10.0, 10.0).unwrap();
    let b = doc.add_point(sketch, 40.0, 10.0).unwrap();
    let line = doc.add_line(sketch, a, b).unwrap();

    let mut buffer = IndexBuffer::new(64, 64);
    let viewport = Viewport::default();

    let hit = s.hover_at(&mut buffer, &viewport, 25, 10).unwrap();
    assert_eq!(hit, Some(PickHit::entity(line)));
    assert_eq!(s.context().hover(), hit);

    let hit = s.hover_at(&mut buffer, &viewport, 10, 10).unwrap();
    assert_eq!(hit, Some(PickHit::entity(a)));

    assert_eq!(s.hover_at(&mut buffer, &viewport, 60, 60).unwrap(), None);
    assert!(s.hover_at(&mut buffer, &viewport, 64, 0).is_err());
}

#[test]
fn hidden_entities_are_not_pickable() {
    let (mut s, sketch) = session();
    let p = s.document_mut().add_point(sketch, 5.0, 5.0).unwrap();
    s.document_mut().set_visible(p, false).unwrap();

    let mut buffer = IndexBuffer::new(16, 16);
    let hit = s.hover_at(&mut buffer, &Viewport::default(), 5, 5).unwrap();
    assert_eq!(hit, None);
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    /// Any number of pointer samples and typed points followed by a cancel
    /// never mutates the document.
    #[test]
    fn cancel_never_mutates(
        moves in prop::collection::vec((-20.0f64..20.0, -20.0f64..20.0), 0..6),
        confirm_first in any::<bool>(),
    ) {
        let (mut s, sketch) = session();
        s.document_mut().add_point(sketch, 0.0, 0.0).unwrap();
        let before = snapshot(&s);

        s.begin_tool(ToolKind::AddArc).unwrap();
        for (x, y) in &moves {
            move_to(&mut s, *x, *y);
        }
        if confirm_first && !moves.is_empty() {
            s.handle(InputEvent::Confirm).unwrap();
        }
        prop_assert_eq!(s.handle(InputEvent::Cancel).unwrap(), MachineState::Cancelled);
        prop_assert_eq!(snapshot(&s), before);
    }
}
