//! Residual functions of the solver primitives.
//!
//! Every residual is zero exactly when the relation holds. Norms in
//! denominators are clamped so degenerate geometry yields finite values.

use std::f64::consts::TAU;

use crate::types::{ArcOps, LineOps, Operand, PointOps, Primitive, PrimitiveKind};

const NORM_EPSILON: f64 = 1e-12;

fn pt(p: PointOps, x: &[f64]) -> [f64; 2] {
    [p[0].value(x), p[1].value(x)]
}

fn sub(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn dot(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

fn cross(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[1] - a[1] * b[0]
}

fn norm(a: [f64; 2]) -> f64 {
    dot(a, a).sqrt()
}

fn dir(line: LineOps, x: &[f64]) -> [f64; 2] {
    sub(pt(line.b, x), pt(line.a, x))
}

fn guarded(v: f64) -> f64 {
    v.max(NORM_EPSILON)
}

/// Signed distance from `p` to the infinite line through `line`.
fn signed_line_distance(p: [f64; 2], line: LineOps, x: &[f64]) -> f64 {
    let d = dir(line, x);
    cross(d, sub(p, pt(line.a, x))) / guarded(norm(d))
}

/// Counter-clockwise sweep from start to end in `[0, 2π)`, clockwise when inverted.
pub fn arc_sweep(center: [f64; 2], start: [f64; 2], end: [f64; 2], invert: bool) -> f64 {
    let s = sub(start, center);
    let e = sub(end, center);
    let mut sweep = s[1].atan2(s[0]) - e[1].atan2(e[0]);
    if !invert {
        sweep = -sweep;
    }
    sweep.rem_euclid(TAU)
}

fn arc_length(arc: ArcOps, x: &[f64]) -> f64 {
    let sweep = arc_sweep(pt(arc.center, x), pt(arc.start, x), pt(arc.end, x), arc.invert);
    arc.radius.value(x) * sweep
}

/// Unsigned angle between two line directions, in radians.
pub fn line_angle(a: [f64; 2], b: [f64; 2]) -> f64 {
    cross(a, b).atan2(dot(a, b)).abs()
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::PointsCoincident { .. } => PrimitiveKind::PointsCoincident,
            Primitive::PtPtDistance { .. } => PrimitiveKind::PtPtDistance,
            Primitive::PtLineDistance { .. } => PrimitiveKind::PtLineDistance,
            Primitive::PtOnLine { .. } => PrimitiveKind::PtOnLine,
            Primitive::PtOnCircle { .. } => PrimitiveKind::PtOnCircle,
            Primitive::EqualLengthLines { .. } => PrimitiveKind::EqualLengthLines,
            Primitive::EqualRadius { .. } => PrimitiveKind::EqualRadius,
            Primitive::EqualLineArcLen { .. } => PrimitiveKind::EqualLineArcLen,
            Primitive::Diameter { .. } => PrimitiveKind::Diameter,
            Primitive::Angle { .. } => PrimitiveKind::Angle,
            Primitive::Parallel { .. } => PrimitiveKind::Parallel,
            Primitive::Perpendicular { .. } => PrimitiveKind::Perpendicular,
            Primitive::Horizontal { .. } => PrimitiveKind::Horizontal,
            Primitive::Vertical { .. } => PrimitiveKind::Vertical,
            Primitive::ArcLineTangent { .. } => PrimitiveKind::ArcLineTangent,
            Primitive::LineCircleTangent { .. } => PrimitiveKind::LineCircleTangent,
            Primitive::CurveCurveTangent { .. } => PrimitiveKind::CurveCurveTangent,
            Primitive::AtMidpoint { .. } => PrimitiveKind::AtMidpoint,
            Primitive::SymmetricLine { .. } => PrimitiveKind::SymmetricLine,
            Primitive::RadiusDefinition { .. } => PrimitiveKind::RadiusDefinition,
        }
    }

    /// Number of residual rows this primitive contributes.
    pub fn rows(&self) -> usize {
        match self {
            Primitive::PointsCoincident { .. }
            | Primitive::AtMidpoint { .. }
            | Primitive::SymmetricLine { .. } => 2,
            _ => 1,
        }
    }

    /// Append this primitive's residuals at `x` to `out`.
    pub fn residuals(&self, x: &[f64], out: &mut Vec<f64>) {
        match *self {
            Primitive::PointsCoincident { a, b } => {
                let d = sub(pt(a, x), pt(b, x));
                out.extend_from_slice(&d);
            }
            Primitive::PtPtDistance { a, b, distance } => {
                out.push(norm(sub(pt(a, x), pt(b, x))) - distance);
            }
            Primitive::PtLineDistance {
                point,
                line,
                distance,
            } => {
                out.push(signed_line_distance(pt(point, x), line, x).abs() - distance);
            }
            Primitive::PtOnLine { point, line } => {
                out.push(signed_line_distance(pt(point, x), line, x));
            }
            Primitive::PtOnCircle {
                point,
                center,
                radius,
            } => {
                out.push(norm(sub(pt(point, x), pt(center, x))) - radius.value(x));
            }
            Primitive::EqualLengthLines { a, b } => {
                out.push(norm(dir(a, x)) - norm(dir(b, x)));
            }
            Primitive::EqualRadius { a, b } => {
                out.push(a.value(x) - b.value(x));
            }
            Primitive::EqualLineArcLen { line, arc } => {
                out.push(norm(dir(line, x)) - arc_length(arc, x));
            }
            Primitive::Diameter { radius, diameter } => {
                out.push(2.0 * radius.value(x) - diameter);
            }
            Primitive::Angle { a, b, degrees } => {
                out.push(line_angle(dir(a, x), dir(b, x)) - degrees.to_radians());
            }
            Primitive::Parallel { a, b } => {
                let (da, db) = (dir(a, x), dir(b, x));
                out.push(cross(da, db) / guarded(norm(da) * norm(db)));
            }
            Primitive::Perpendicular { a, b } => {
                let (da, db) = (dir(a, x), dir(b, x));
                out.push(dot(da, db) / guarded(norm(da) * norm(db)));
            }
            Primitive::Horizontal { a, b } => {
                out.push(a[1].value(x) - b[1].value(x));
            }
            Primitive::Vertical { a, b } => {
                out.push(a[0].value(x) - b[0].value(x));
            }
            Primitive::ArcLineTangent { arc, line, at_end } => {
                let touch = if at_end { arc.end } else { arc.start };
                let radial = sub(pt(touch, x), pt(arc.center, x));
                let d = dir(line, x);
                out.push(dot(radial, d) / guarded(norm(radial) * norm(d)));
            }
            Primitive::LineCircleTangent {
                line,
                center,
                radius,
            } => {
                let distance = signed_line_distance(pt(center, x), line, x).abs();
                out.push(distance - radius.value(x));
            }
            Primitive::CurveCurveTangent {
                center_a,
                radius_a,
                center_b,
                radius_b,
                internal,
            } => {
                let d = norm(sub(pt(center_a, x), pt(center_b, x)));
                let (ra, rb) = (radius_a.value(x), radius_b.value(x));
                let target = if internal { (ra - rb).abs() } else { ra + rb };
                out.push(d - target);
            }
            Primitive::AtMidpoint { point, line } => {
                let (a, b) = (pt(line.a, x), pt(line.b, x));
                let p = pt(point, x);
                out.push(p[0] - 0.5 * (a[0] + b[0]));
                out.push(p[1] - 0.5 * (a[1] + b[1]));
            }
            Primitive::SymmetricLine { a, b, line } => {
                let (pa, pb) = (pt(a, x), pt(b, x));
                let mid = [0.5 * (pa[0] + pb[0]), 0.5 * (pa[1] + pb[1])];
                let d = dir(line, x);
                out.push(signed_line_distance(mid, line, x));
                out.push(dot(sub(pb, pa), d) / guarded(norm(d)));
            }
            Primitive::RadiusDefinition {
                radius,
                center,
                rim,
            } => {
                out.push(radius.value(x) - norm(sub(pt(rim, x), pt(center, x))));
            }
        }
    }
}

/// Constant point operands, for tests and measurement.
pub fn constant_point(p: [f64; 2]) -> PointOps {
    [Operand::Constant(p[0]), Operand::Constant(p[1])]
}
