use serde::{Deserialize, Serialize};
use sketch_types::{ConstraintId, ConstraintKind, EntityId, EntityKind, SolverState};
use thiserror::Error;

// ── Problem Description ─────────────────────────────────────────────────────

/// A scalar input to a primitive: either a solver unknown or a fixed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Unknown(usize),
    Constant(f64),
}

impl Operand {
    pub fn value(self, x: &[f64]) -> f64 {
        match self {
            Operand::Unknown(i) => x.get(i).copied().unwrap_or(0.0),
            Operand::Constant(v) => v,
        }
    }
}

/// `[x, y]` operands of a point.
pub type PointOps = [Operand; 2];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineOps {
    pub a: PointOps,
    pub b: PointOps,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcOps {
    pub center: PointOps,
    pub start: PointOps,
    pub end: PointOps,
    pub radius: Operand,
    pub invert: bool,
}

/// Solver primitive vocabulary. Each primitive contributes one or more
/// residual rows that vanish when the relation holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Primitive {
    PointsCoincident {
        a: PointOps,
        b: PointOps,
    },
    PtPtDistance {
        a: PointOps,
        b: PointOps,
        distance: f64,
    },
    PtLineDistance {
        point: PointOps,
        line: LineOps,
        distance: f64,
    },
    PtOnLine {
        point: PointOps,
        line: LineOps,
    },
    PtOnCircle {
        point: PointOps,
        center: PointOps,
        radius: Operand,
    },
    EqualLengthLines {
        a: LineOps,
        b: LineOps,
    },
    EqualRadius {
        a: Operand,
        b: Operand,
    },
    EqualLineArcLen {
        line: LineOps,
        arc: ArcOps,
    },
    Diameter {
        radius: Operand,
        diameter: f64,
    },
    Angle {
        a: LineOps,
        b: LineOps,
        degrees: f64,
    },
    Parallel {
        a: LineOps,
        b: LineOps,
    },
    Perpendicular {
        a: LineOps,
        b: LineOps,
    },
    Horizontal {
        a: PointOps,
        b: PointOps,
    },
    Vertical {
        a: PointOps,
        b: PointOps,
    },
    /// Tangent where the arc's start (or end, with `at_end`) meets the line.
    ArcLineTangent {
        arc: ArcOps,
        line: LineOps,
        at_end: bool,
    },
    LineCircleTangent {
        line: LineOps,
        center: PointOps,
        radius: Operand,
    },
    /// External tangency, or internal with `internal`.
    CurveCurveTangent {
        center_a: PointOps,
        radius_a: Operand,
        center_b: PointOps,
        radius_b: Operand,
        internal: bool,
    },
    AtMidpoint {
        point: PointOps,
        line: LineOps,
    },
    SymmetricLine {
        a: PointOps,
        b: PointOps,
        line: LineOps,
    },
    /// Pins a driven radius to the distance between center and rim point.
    RadiusDefinition {
        radius: Operand,
        center: PointOps,
        rim: PointOps,
    },
}

/// Fieldless tag of a [`Primitive`], used for backend capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    PointsCoincident,
    PtPtDistance,
    PtLineDistance,
    PtOnLine,
    PtOnCircle,
    EqualLengthLines,
    EqualRadius,
    EqualLineArcLen,
    Diameter,
    Angle,
    Parallel,
    Perpendicular,
    Horizontal,
    Vertical,
    ArcLineTangent,
    LineCircleTangent,
    CurveCurveTangent,
    AtMidpoint,
    SymmetricLine,
    RadiusDefinition,
}

/// What an equation was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquationSource {
    Constraint(ConstraintId),
    /// Intrinsic equation of an entity (arc radius and end point).
    Entity(EntityId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub primitive: Primitive,
    pub source: EquationSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unknown {
    pub initial: f64,
    /// `<entity>.<param>`, for diagnostics.
    pub label: String,
}

/// Backend-independent description of one solve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub unknowns: Vec<Unknown>,
    pub equations: Vec<Equation>,
}

impl Problem {
    pub fn initial_values(&self) -> Vec<f64> {
        self.unknowns.iter().map(|u| u.initial).collect()
    }

    /// Total residual rows over all equations.
    pub fn row_count(&self) -> usize {
        self.equations.iter().map(|e| e.primitive.rows()).sum()
    }

    /// Source of every residual row, in row order.
    pub fn row_sources(&self) -> Vec<EquationSource> {
        self.equations
            .iter()
            .flat_map(|e| std::iter::repeat(e.source).take(e.primitive.rows()))
            .collect()
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.row_count());
        for equation in &self.equations {
            equation.primitive.residuals(x, &mut out);
        }
        out
    }
}

// ── Backend Output ──────────────────────────────────────────────────────────

/// Raw outcome reported by a backend. `status` is one of
/// `Okay`, `Inconsistent` or `DidNotConverge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReport {
    pub status: SolverState,
    pub values: Vec<f64>,
    /// Numerical rank of the Jacobian at `values`.
    pub rank: usize,
    pub rows: usize,
    pub residuals: Vec<f64>,
    pub iterations: usize,
}

// ── Solve Output ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamUpdate {
    pub entity: EntityId,
    pub param: String,
    pub value: f64,
}

/// Result of solving one sketch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub sketch: EntityId,
    pub state: SolverState,
    /// Present only when the state writes back.
    pub updated_params: Vec<ParamUpdate>,
    pub dof: Option<i32>,
    pub failed_constraints: Vec<ConstraintId>,
    pub iterations: usize,
    pub message: String,
    /// Set when the first attempt diverged and a perturbed retry ran.
    pub retried: bool,
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("constraint {constraint} ({kind}) has no solver mapping for {types:?}")]
    UnsupportedConstraintMapping {
        constraint: ConstraintId,
        kind: ConstraintKind,
        types: Vec<EntityKind>,
    },
    #[error("backend cannot evaluate intrinsic {primitive:?} of entity {entity}")]
    UnsupportedPrimitive {
        entity: EntityId,
        primitive: PrimitiveKind,
    },
    #[error("entity {entity} is missing from the sketch or has the wrong kind")]
    MissingEntity { entity: EntityId },
}
