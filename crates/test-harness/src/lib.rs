//! Test harness for scripting sketches and checking solved geometry.
//!
//! - [`SketchBuilder`]: fluent API over a [`Document`](sketch_engine::Document)
//!   with entities addressed by name
//! - [`assertions`]: assertion helpers that report expected vs actual
//! - [`helpers`]: the harness error type and tracing setup

pub mod assertions;
pub mod builder;
pub mod helpers;

pub use builder::SketchBuilder;
pub use helpers::{init_tracing, HarnessError};
