pub mod backend;
pub mod config;
pub mod constraint_mapping;
pub mod entity_mapping;
pub mod measure;
pub mod newton;
pub mod primitives;
pub mod solver;
pub mod status;
pub mod types;

pub use backend::SolverBackend;
pub use config::SolverConfig;
pub use entity_mapping::{EntityLookup, ProblemBuilder, SketchView};
pub use measure::measure;
pub use newton::NewtonBackend;
pub use solver::{build_problem, solve_sketch};
pub use status::describe;
pub use types::*;
