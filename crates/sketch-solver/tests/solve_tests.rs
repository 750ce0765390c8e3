use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use proptest::prelude::*;
use sketch_solver::*;
use sketch_types::{
    Constraint, ConstraintId, ConstraintKind, Entity, EntityData, EntityId, Param, SolverState,
};

// ── Helpers ─────────────────────────────────────────────────────────────────

const SKETCH: EntityId = EntityId(0);

#[derive(Default)]
struct Fixture {
    entities: Vec<Entity>,
    constraints: Vec<Constraint>,
}

impl Fixture {
    fn entity(&mut self, data: EntityData, fixed: bool) -> EntityId {
        let id = EntityId(self.entities.len() as u32 + 1);
        self.entities.push(Entity {
            id,
            sketch: Some(SKETCH),
            data,
            visible: true,
            selected: false,
            construction: false,
            fixed,
            display_index: id.0,
        });
        id
    }

    fn point(&mut self, x: f64, y: f64) -> EntityId {
        self.entity(EntityData::point(x, y), false)
    }

    fn fixed_point(&mut self, x: f64, y: f64) -> EntityId {
        self.entity(EntityData::point(x, y), true)
    }

    fn line(&mut self, a: EntityId, b: EntityId) -> EntityId {
        self.entity(EntityData::line(a, b), false)
    }

    fn circle(&mut self, center: EntityId, radius: f64) -> EntityId {
        self.entity(EntityData::circle(center, radius), false)
    }

    fn arc(&mut self, center: EntityId, start: EntityId, end: EntityId, radius: f64) -> EntityId {
        let mut data = EntityData::arc(center, start, end);
        if let EntityData::Arc { radius: r, .. } = &mut data {
            *r = Param::driven(radius);
        }
        self.entity(data, false)
    }

    fn constrain(
        &mut self,
        kind: ConstraintKind,
        entities: &[EntityId],
        value: Option<f64>,
    ) -> ConstraintId {
        let id = ConstraintId(self.constraints.len() as u32);
        self.constraints.push(Constraint {
            id,
            kind,
            entities: entities.to_vec(),
            value,
            sketch: SKETCH,
            workplane: None,
            failed: false,
            reference: false,
            visible: true,
            name: format!("{kind}"),
        });
        id
    }

    fn view(&self) -> SketchView<'_> {
        SketchView::new(SKETCH, &self.entities, &self.constraints)
    }

    fn solve(&self) -> SolveResult {
        solve_sketch(&self.view(), &NewtonBackend, &SolverConfig::default())
            .expect("mapping should succeed")
    }

    /// Apply a solve result the way the document does.
    fn apply(&mut self, result: &SolveResult) {
        for update in &result.updated_params {
            let entity = self
                .entities
                .iter_mut()
                .find(|e| e.id == update.entity)
                .expect("updated entity exists");
            if let Some(p) = entity.data.param_mut(&update.param) {
                p.value = update.value;
            }
        }
    }

    fn position(&self, id: EntityId) -> [f64; 2] {
        self.entities
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.data.position())
            .expect("point exists")
    }
}

fn solved_position(result: &SolveResult, fixture: &Fixture, id: EntityId) -> [f64; 2] {
    let mut pos = fixture.position(id);
    for update in result.updated_params.iter().filter(|u| u.entity == id) {
        match update.param.as_str() {
            "x" => pos[0] = update.value,
            "y" => pos[1] = update.value,
            _ => {}
        }
    }
    pos
}

fn assert_point_near(actual: [f64; 2], expected: [f64; 2], tol: f64) {
    assert!(
        (actual[0] - expected[0]).abs() < tol && (actual[1] - expected[1]).abs() < tol,
        "point = ({:.6}, {:.6}), expected ({:.6}, {:.6}), tol={tol}",
        actual[0],
        actual[1],
        expected[0],
        expected[1],
    );
}

/// Backend that refuses one primitive kind and delegates the rest.
struct Restricted(PrimitiveKind);

impl SolverBackend for Restricted {
    fn name(&self) -> &str {
        "restricted"
    }

    fn supports(&self, primitive: PrimitiveKind) -> bool {
        primitive != self.0
    }

    fn solve(&self, problem: &Problem, config: &SolverConfig) -> BackendReport {
        NewtonBackend.solve(problem, config)
    }
}

/// Backend that reports divergence for its first `fail_first` calls, then
/// delegates.
struct Diverging {
    fail_first: usize,
    calls: AtomicUsize,
}

impl Diverging {
    fn new(fail_first: usize) -> Self {
        Self {
            fail_first,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SolverBackend for Diverging {
    fn name(&self) -> &str {
        "diverging"
    }

    fn supports(&self, _primitive: PrimitiveKind) -> bool {
        true
    }

    fn solve(&self, problem: &Problem, config: &SolverConfig) -> BackendReport {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return BackendReport {
                status: SolverState::DidNotConverge,
                values: problem.initial_values(),
                rank: 0,
                rows: problem.row_count(),
                residuals: Vec::new(),
                iterations: 5,
            };
        }
        NewtonBackend.solve(problem, config)
    }
}

fn levelled_line() -> (Fixture, EntityId) {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.point(10.0, 5.0);
    let line = f.line(p1, p2);
    f.constrain(ConstraintKind::Horizontal, &[line], None);
    (f, p2)
}

// ── Basic Solves ────────────────────────────────────────────────────────────

#[test]
fn unconstrained_points_keep_positions() {
    let mut f = Fixture::default();
    let p = f.point(1.0, 2.0);
    let result = f.solve();

    assert_eq!(result.state, SolverState::Okay);
    assert_eq!(result.dof, Some(2));
    assert_eq!(result.iterations, 0);
    assert_point_near(solved_position(&result, &f, p), [1.0, 2.0], 1e-12);
}

#[test]
fn horizontal_line_levels_free_end() {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.point(10.0, 5.0);
    let line = f.line(p1, p2);
    f.constrain(ConstraintKind::Horizontal, &[line], None);

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    assert_eq!(result.dof, Some(1));
    let p = solved_position(&result, &f, p2);
    assert_relative_eq!(p[1], 0.0, epsilon = 1e-8);
}

#[test]
fn rectangle_is_fully_constrained() {
    let mut f = Fixture::default();
    let a = f.fixed_point(0.0, 0.0);
    let b = f.point(98.0, 3.0);
    let c = f.point(103.0, 47.0);
    let d = f.point(-2.0, 52.0);
    let bottom = f.line(a, b);
    let right = f.line(b, c);
    let top = f.line(c, d);
    let left = f.line(d, a);
    f.constrain(ConstraintKind::Horizontal, &[bottom], None);
    f.constrain(ConstraintKind::Horizontal, &[top], None);
    f.constrain(ConstraintKind::Vertical, &[left], None);
    f.constrain(ConstraintKind::Vertical, &[right], None);
    f.constrain(ConstraintKind::Distance, &[bottom], Some(100.0));
    f.constrain(ConstraintKind::Distance, &[left], Some(50.0));

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    assert_eq!(result.dof, Some(0));
    assert_eq!(result.message, "Okay: fully constrained");
    assert_point_near(solved_position(&result, &f, b), [100.0, 0.0], 1e-6);
    assert_point_near(solved_position(&result, &f, c), [100.0, 50.0], 1e-6);
    assert_point_near(solved_position(&result, &f, d), [0.0, 50.0], 1e-6);
}

#[test]
fn equal_lines_move_free_point_radially() {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.fixed_point(10.0, 0.0);
    let p3 = f.point(3.0, 7.0);
    let l1 = f.line(p1, p2);
    let l2 = f.line(p1, p3);
    f.constrain(ConstraintKind::Equal, &[l1, l2], None);

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    assert_eq!(result.dof, Some(1));
    let p = solved_position(&result, &f, p3);
    let scale = 10.0 / 58.0_f64.sqrt();
    assert_point_near(p, [3.0 * scale, 7.0 * scale], 1e-6);
}

#[test]
fn resolving_a_solved_sketch_is_idempotent() {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.point(3.0, 4.0);
    f.constrain(ConstraintKind::Distance, &[p1, p2], Some(10.0));

    let first = f.solve();
    f.apply(&first);
    let second = f.solve();

    assert_eq!(second.state, SolverState::Okay);
    assert_eq!(second.iterations, 0);
    assert_point_near(
        solved_position(&second, &f, p2),
        solved_position(&first, &f, p2),
        1e-12,
    );
}

#[test]
fn zero_distance_pins_point_with_full_rank() {
    let mut f = Fixture::default();
    let a = f.fixed_point(0.0, 0.0);
    let q = f.point(1.0, 1.0);
    f.constrain(ConstraintKind::Distance, &[a, q], Some(0.0));

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    assert_eq!(result.dof, Some(0));
    assert_point_near(solved_position(&result, &f, q), [0.0, 0.0], 1e-8);
}

#[test]
fn zero_point_line_distance_is_one_row() {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.fixed_point(10.0, 0.0);
    let line = f.line(p1, p2);
    let q = f.point(3.0, 2.0);
    f.constrain(ConstraintKind::Distance, &[line, q], Some(0.0));

    let problem = build_problem(&f.view()).unwrap();
    assert!(problem
        .equations
        .iter()
        .any(|eq| eq.primitive.kind() == PrimitiveKind::PtOnLine));

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    assert_eq!(result.dof, Some(1));
    assert_relative_eq!(solved_position(&result, &f, q)[1], 0.0, epsilon = 1e-8);
}

// ── Curves ──────────────────────────────────────────────────────────────────

#[test]
fn circle_diameter_sets_radius() {
    let mut f = Fixture::default();
    let center = f.fixed_point(0.0, 0.0);
    let circle = f.circle(center, 3.0);
    f.constrain(ConstraintKind::Diameter, &[circle], Some(10.0));

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    let radius = result
        .updated_params
        .iter()
        .find(|u| u.entity == circle && u.param == "radius")
        .map(|u| u.value);
    assert_relative_eq!(radius.unwrap(), 5.0, epsilon = 1e-8);
}

#[test]
fn arc_end_stays_on_circle() {
    let mut f = Fixture::default();
    let c = f.fixed_point(0.0, 0.0);
    let s = f.fixed_point(5.0, 0.0);
    let e = f.point(0.0, 4.0);
    f.arc(c, s, e, 5.0);

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    let end = solved_position(&result, &f, e);
    assert_relative_eq!(end[0].hypot(end[1]), 5.0, epsilon = 1e-8);
}

#[test]
fn line_tangent_to_circle() {
    let mut f = Fixture::default();
    let center = f.fixed_point(0.0, 0.0);
    let circle = f.circle(center, 2.5);
    let a = f.fixed_point(-5.0, 2.0);
    let b = f.point(5.0, 3.0);
    let line = f.line(a, b);
    f.constrain(ConstraintKind::Diameter, &[circle], Some(4.0));
    f.constrain(ConstraintKind::Tangent, &[line, circle], None);

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    assert_eq!(result.dof, Some(1));

    let start = f.position(a);
    let end = solved_position(&result, &f, b);
    let d = [end[0] - start[0], end[1] - start[1]];
    let distance = (d[0] * start[1] - d[1] * start[0]).abs() / d[0].hypot(d[1]);
    assert_relative_eq!(distance, 2.0, epsilon = 1e-8);
}

#[test]
fn equal_line_and_arc_length() {
    let mut f = Fixture::default();
    let c = f.fixed_point(0.0, 0.0);
    let s = f.fixed_point(2.0, 0.0);
    let e = f.fixed_point(0.0, 2.0);
    let arc = f.arc(c, s, e, 2.0);
    let a = f.fixed_point(0.0, -5.0);
    let b = f.point(2.0, -5.0);
    let line = f.line(a, b);
    f.constrain(ConstraintKind::Horizontal, &[line], None);
    f.constrain(ConstraintKind::Equal, &[line, arc], None);

    let result = f.solve();
    assert_eq!(result.state, SolverState::Okay);
    let end = solved_position(&result, &f, b);
    assert_relative_eq!(end[0], std::f64::consts::PI, epsilon = 1e-6);
}

// ── Failure Classification ──────────────────────────────────────────────────

#[test]
fn contradictory_distances_are_inconsistent() {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.point(3.0, 0.0);
    let c5 = f.constrain(ConstraintKind::Distance, &[p1, p2], Some(5.0));
    let c10 = f.constrain(ConstraintKind::Distance, &[p1, p2], Some(10.0));

    let result = f.solve();
    assert_eq!(result.state, SolverState::Inconsistent);
    assert!(result.updated_params.is_empty());
    assert_eq!(result.dof, None);
    assert_eq!(result.failed_constraints, vec![c5, c10]);
    assert!(result.message.contains("c0"), "{}", result.message);
}

#[test]
fn duplicate_constraint_is_redundant() {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.point(10.0, 5.0);
    let line = f.line(p1, p2);
    f.constrain(ConstraintKind::Horizontal, &[line], None);
    f.constrain(ConstraintKind::Horizontal, &[line], None);

    let result = f.solve();
    assert_eq!(result.state, SolverState::Redundant);
    assert_eq!(result.dof, Some(-1));
    assert!(!result.updated_params.is_empty());
}

#[test]
fn reference_constraints_are_not_solved() {
    let mut f = Fixture::default();
    let p1 = f.fixed_point(0.0, 0.0);
    let p2 = f.point(3.0, 4.0);
    let id = f.constrain(ConstraintKind::Distance, &[p1, p2], Some(100.0));
    f.constraints[id.0 as usize].reference = true;

    let problem = build_problem(&f.view()).unwrap();
    assert!(problem.equations.is_empty());

    let result = f.solve();
    assert_point_near(solved_position(&result, &f, p2), [3.0, 4.0], 1e-12);
}

#[test]
fn unsupported_primitive_fails_fast() {
    let mut f = Fixture::default();
    let p1 = f.point(0.0, 0.0);
    let p2 = f.point(1.0, 1.0);
    let line = f.line(p1, p2);
    let id = f.constrain(ConstraintKind::Vertical, &[line], None);

    let err = solve_sketch(
        &f.view(),
        &Restricted(PrimitiveKind::Vertical),
        &SolverConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SolveError::UnsupportedConstraintMapping { constraint, kind: ConstraintKind::Vertical, .. }
            if constraint == id
    ));
}

#[test]
fn mismatched_types_have_no_mapping() {
    let mut f = Fixture::default();
    let center = f.point(0.0, 0.0);
    let circle = f.circle(center, 1.0);
    let a = f.point(2.0, 0.0);
    let b = f.point(3.0, 0.0);
    let line = f.line(a, b);
    f.constrain(ConstraintKind::Equal, &[circle, line], None);

    let err = build_problem(&f.view()).unwrap_err();
    assert!(matches!(err, SolveError::UnsupportedConstraintMapping { .. }));
}

// ── Divergence ──────────────────────────────────────────────────────────────

#[test]
fn divergence_is_retried_once_from_a_perturbed_guess() {
    let (f, p2) = levelled_line();
    let backend = Diverging::new(1);

    let result = solve_sketch(&f.view(), &backend, &SolverConfig::default()).unwrap();
    assert_eq!(backend.calls(), 2);
    assert!(result.retried);
    assert_eq!(result.state, SolverState::Okay);
    assert!(result.iterations >= 5);
    assert!(!result.updated_params.is_empty());
    assert_relative_eq!(solved_position(&result, &f, p2)[1], 0.0, epsilon = 1e-6);
}

#[test]
fn persistent_divergence_writes_nothing_back() {
    let (f, _) = levelled_line();
    let backend = Diverging::new(usize::MAX);

    let result = solve_sketch(&f.view(), &backend, &SolverConfig::default()).unwrap();
    assert_eq!(backend.calls(), 2);
    assert!(result.retried);
    assert_eq!(result.state, SolverState::DidNotConverge);
    assert!(result.updated_params.is_empty());
    assert_eq!(result.dof, None);
    assert_eq!(result.iterations, 10);
}

#[test]
fn retry_can_be_disabled() {
    let (f, _) = levelled_line();
    let backend = Diverging::new(1);
    let config = SolverConfig {
        retry_on_divergence: false,
        ..SolverConfig::default()
    };

    let result = solve_sketch(&f.view(), &backend, &config).unwrap();
    assert_eq!(backend.calls(), 1);
    assert!(!result.retried);
    assert_eq!(result.state, SolverState::DidNotConverge);
    assert_eq!(result.iterations, 5);
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Free points contribute two degrees of freedom each, minus one per
    /// independent constraint row.
    #[test]
    fn dof_counts_free_parameters(
        coords in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 2..6),
    ) {
        let mut f = Fixture::default();
        let ids: Vec<EntityId> = coords.iter().map(|(x, y)| f.point(*x, *y)).collect();
        let unconstrained = f.solve();
        prop_assert_eq!(unconstrained.dof, Some(2 * ids.len() as i32));

        f.constrain(ConstraintKind::Horizontal, &[ids[0], ids[1]], None);
        let levelled = f.solve();
        prop_assert_eq!(levelled.state, SolverState::Okay);
        prop_assert_eq!(levelled.dof, Some(2 * ids.len() as i32 - 1));
    }
}
