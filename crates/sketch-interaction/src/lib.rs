pub mod config;
pub mod events;
pub mod machine;
pub mod picking;
pub mod session;
pub mod snap;
pub mod tool;

use sketch_engine::EngineError;
use sketch_types::{EntityId, EntityKind};

pub use config::{SessionConfig, SnapConfig};
pub use events::InputEvent;
pub use machine::{Commit, InteractionStateMachine, MachineState, Preview, StepValue};
pub use picking::{decode, encode, pick, IndexBuffer, IndexRenderTarget, PickError, PickHit, Viewport};
pub use session::{Session, SessionContext};
pub use snap::{find_snap, SnapKind, SnapTarget};
pub use tool::{StepKind, ToolKind};

/// Errors from interactive tools and picking.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InteractionError {
    #[error("no tool is running")]
    NoActiveTool,

    #[error("no active sketch")]
    NoActiveSketch,

    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("invalid numeric input: {input:?}")]
    InvalidNumericInput { input: String },

    #[error("nothing to confirm")]
    NothingToConfirm,

    #[error("{entity} is a {found}, expected one of {accepted:?}")]
    WrongEntityType {
        entity: EntityId,
        found: EntityKind,
        accepted: Vec<EntityKind>,
    },

    #[error("picking error: {0}")]
    Pick(#[from] PickError),

    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}
