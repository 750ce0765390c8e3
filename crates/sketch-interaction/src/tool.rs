use serde::{Deserialize, Serialize};
use sketch_types::{signature, ConstraintKind};

/// Interactive construction tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "kind")]
pub enum ToolKind {
    AddPoint,
    AddLine,
    /// Center point, then radius.
    AddCircle,
    /// Center, start and end points.
    AddArc,
    Constrain(ConstraintKind),
}

/// What one input step asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Point,
    Scalar { label: String },
    Entity { slot: usize },
}

impl ToolKind {
    pub fn steps(self) -> Vec<StepKind> {
        match self {
            ToolKind::AddPoint => vec![StepKind::Point],
            ToolKind::AddLine => vec![StepKind::Point, StepKind::Point],
            ToolKind::AddCircle => vec![
                StepKind::Point,
                StepKind::Scalar {
                    label: "radius".into(),
                },
            ],
            ToolKind::AddArc => vec![StepKind::Point, StepKind::Point, StepKind::Point],
            ToolKind::Constrain(kind) => {
                let mut steps: Vec<StepKind> = (0..signature::max_arity(kind))
                    .map(|slot| StepKind::Entity { slot })
                    .collect();
                if kind.is_dimensional() {
                    steps.push(StepKind::Scalar {
                        label: kind.label().to_lowercase(),
                    });
                }
                steps
            }
        }
    }

    pub fn label(self) -> String {
        match self {
            ToolKind::AddPoint => "Add Point".into(),
            ToolKind::AddLine => "Add Line".into(),
            ToolKind::AddCircle => "Add Circle".into(),
            ToolKind::AddArc => "Add Arc".into(),
            ToolKind::Constrain(kind) => format!("Constrain {kind}"),
        }
    }
}
