use sketch_types::{equal_relation, Constraint, ConstraintKind, EntityKind, EqualRelation};

use crate::entity_mapping::{EntityLookup, ProblemBuilder};
use crate::types::{EquationSource, PointOps, Primitive};
use crate::SolveError;

use EntityKind::{Arc, Circle, Line2D, Point2D};

fn initial(p: PointOps, x: &[f64]) -> [f64; 2] {
    [p[0].value(x), p[1].value(x)]
}

fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

impl ProblemBuilder<'_, '_> {
    /// Add the equations of every driving constraint in the view.
    pub fn add_constraints(&mut self) -> Result<(), SolveError> {
        let view = self.view;
        for constraint in view.constraints() {
            if constraint.is_driving() {
                self.add_constraint(constraint)?;
            }
        }
        Ok(())
    }

    /// Map one constraint to one or more primitive equations.
    pub fn add_constraint(&mut self, constraint: &Constraint) -> Result<(), SolveError> {
        let types: Vec<EntityKind> = constraint
            .entities
            .iter()
            .map(|id| {
                self.view
                    .kind_of(*id)
                    .ok_or(SolveError::MissingEntity { entity: *id })
            })
            .collect::<Result<_, _>>()?;
        let e = &constraint.entities;
        let value = constraint.value.unwrap_or(0.0);
        let zero = value.abs() <= f64::EPSILON;
        let unsupported = || SolveError::UnsupportedConstraintMapping {
            constraint: constraint.id,
            kind: constraint.kind,
            types: types.clone(),
        };
        let x = self.problem.initial_values();

        let primitives = match (constraint.kind, types.as_slice()) {
            (ConstraintKind::Coincident, [Point2D, Point2D]) => vec![Primitive::PointsCoincident {
                a: self.point(e[0])?,
                b: self.point(e[1])?,
            }],
            (ConstraintKind::Coincident, [Point2D, Line2D]) => vec![Primitive::PtOnLine {
                point: self.point(e[0])?,
                line: self.line(e[1])?,
            }],
            (ConstraintKind::Coincident, [Line2D, Point2D]) => vec![Primitive::PtOnLine {
                point: self.point(e[1])?,
                line: self.line(e[0])?,
            }],
            (ConstraintKind::Coincident, [Point2D, Circle | Arc]) => {
                let (center, radius) = self.curve(e[1])?;
                vec![Primitive::PtOnCircle {
                    point: self.point(e[0])?,
                    center,
                    radius,
                }]
            }
            (ConstraintKind::Coincident, [Circle | Arc, Point2D]) => {
                let (center, radius) = self.curve(e[0])?;
                vec![Primitive::PtOnCircle {
                    point: self.point(e[1])?,
                    center,
                    radius,
                }]
            }

            (ConstraintKind::Equal, [a, b]) => match equal_relation(*a, *b) {
                Some(EqualRelation::EqualLength) => vec![Primitive::EqualLengthLines {
                    a: self.line(e[0])?,
                    b: self.line(e[1])?,
                }],
                Some(EqualRelation::EqualRadius) => vec![Primitive::EqualRadius {
                    a: self.curve(e[0])?.1,
                    b: self.curve(e[1])?.1,
                }],
                Some(EqualRelation::LineArcLength) => {
                    let (line, arc) = if *a == Line2D { (e[0], e[1]) } else { (e[1], e[0]) };
                    vec![Primitive::EqualLineArcLen {
                        line: self.line(line)?,
                        arc: self.arc(arc)?,
                    }]
                }
                None => return Err(unsupported()),
            },

            // A zero distance has no gradient under the distance residual,
            // so it maps to the coincidence form instead.
            (ConstraintKind::Distance, [Point2D, Point2D]) if zero => {
                vec![Primitive::PointsCoincident {
                    a: self.point(e[0])?,
                    b: self.point(e[1])?,
                }]
            }
            (ConstraintKind::Distance, [Point2D, Point2D]) => vec![Primitive::PtPtDistance {
                a: self.point(e[0])?,
                b: self.point(e[1])?,
                distance: value,
            }],
            (ConstraintKind::Distance, [Line2D]) => {
                let line = self.line(e[0])?;
                if zero {
                    vec![Primitive::PointsCoincident { a: line.a, b: line.b }]
                } else {
                    vec![Primitive::PtPtDistance {
                        a: line.a,
                        b: line.b,
                        distance: value,
                    }]
                }
            }
            (ConstraintKind::Distance, [Point2D, Line2D] | [Line2D, Point2D]) => {
                let (point, line) = if types[0] == Point2D { (e[0], e[1]) } else { (e[1], e[0]) };
                let (point, line) = (self.point(point)?, self.line(line)?);
                if zero {
                    vec![Primitive::PtOnLine { point, line }]
                } else {
                    vec![Primitive::PtLineDistance {
                        point,
                        line,
                        distance: value,
                    }]
                }
            }

            (ConstraintKind::Diameter, [Circle | Arc]) => vec![Primitive::Diameter {
                radius: self.curve(e[0])?.1,
                diameter: value,
            }],

            (ConstraintKind::Angle, [Line2D, Line2D]) => vec![Primitive::Angle {
                a: self.line(e[0])?,
                b: self.line(e[1])?,
                degrees: value,
            }],
            (ConstraintKind::Parallel, [Line2D, Line2D]) => vec![Primitive::Parallel {
                a: self.line(e[0])?,
                b: self.line(e[1])?,
            }],
            (ConstraintKind::Perpendicular, [Line2D, Line2D]) => vec![Primitive::Perpendicular {
                a: self.line(e[0])?,
                b: self.line(e[1])?,
            }],

            (ConstraintKind::Horizontal | ConstraintKind::Vertical, [Line2D]) => {
                let line = self.line(e[0])?;
                vec![axis_aligned(constraint.kind, line.a, line.b)]
            }
            (ConstraintKind::Horizontal | ConstraintKind::Vertical, [Point2D, Point2D]) => {
                vec![axis_aligned(
                    constraint.kind,
                    self.point(e[0])?,
                    self.point(e[1])?,
                )]
            }

            (ConstraintKind::Tangent, [Line2D, Arc] | [Arc, Line2D]) => {
                let (line_id, arc_id) = if types[0] == Line2D { (e[0], e[1]) } else { (e[1], e[0]) };
                let line = self.line(line_id)?;
                let arc = self.arc(arc_id)?;
                // Touch at whichever arc endpoint currently lies closer to the line.
                let (la, lb) = (initial(line.a, &x), initial(line.b, &x));
                let near = |p: [f64; 2]| dist(p, la).min(dist(p, lb));
                let at_end = near(initial(arc.end, &x)) < near(initial(arc.start, &x));
                vec![Primitive::ArcLineTangent { arc, line, at_end }]
            }
            (ConstraintKind::Tangent, [Line2D, Circle] | [Circle, Line2D]) => {
                let (line_id, circle_id) =
                    if types[0] == Line2D { (e[0], e[1]) } else { (e[1], e[0]) };
                let (center, radius) = self.curve(circle_id)?;
                vec![Primitive::LineCircleTangent {
                    line: self.line(line_id)?,
                    center,
                    radius,
                }]
            }
            (ConstraintKind::Tangent, [Arc | Circle, Arc | Circle]) => {
                let (center_a, radius_a) = self.curve(e[0])?;
                let (center_b, radius_b) = self.curve(e[1])?;
                let d = dist(initial(center_a, &x), initial(center_b, &x));
                let (ra, rb) = (radius_a.value(&x), radius_b.value(&x));
                let internal = (d - (ra - rb).abs()).abs() < (d - (ra + rb)).abs();
                vec![Primitive::CurveCurveTangent {
                    center_a,
                    radius_a,
                    center_b,
                    radius_b,
                    internal,
                }]
            }

            (ConstraintKind::Midpoint, [Point2D, Line2D]) => vec![Primitive::AtMidpoint {
                point: self.point(e[0])?,
                line: self.line(e[1])?,
            }],
            (ConstraintKind::Midpoint, [Line2D, Point2D]) => vec![Primitive::AtMidpoint {
                point: self.point(e[1])?,
                line: self.line(e[0])?,
            }],
            (ConstraintKind::Symmetric, [Point2D, Point2D, Line2D]) => {
                vec![Primitive::SymmetricLine {
                    a: self.point(e[0])?,
                    b: self.point(e[1])?,
                    line: self.line(e[2])?,
                }]
            }

            _ => return Err(unsupported()),
        };

        for primitive in primitives {
            self.push(primitive, EquationSource::Constraint(constraint.id));
        }
        Ok(())
    }
}

fn axis_aligned(kind: ConstraintKind, a: PointOps, b: PointOps) -> Primitive {
    if kind == ConstraintKind::Horizontal {
        Primitive::Horizontal { a, b }
    } else {
        Primitive::Vertical { a, b }
    }
}
