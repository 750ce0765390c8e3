use crate::config::SolverConfig;
use crate::types::{BackendReport, Problem, PrimitiveKind};

/// A numeric engine that drives a [`Problem`]'s residuals to zero.
///
/// Backends only see unknowns and primitives; entity and constraint
/// identities stay on the adapter side.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend can evaluate this primitive.
    fn supports(&self, primitive: PrimitiveKind) -> bool;

    fn solve(&self, problem: &Problem, config: &SolverConfig) -> BackendReport;
}
