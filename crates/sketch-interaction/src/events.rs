use serde::{Deserialize, Serialize};

use crate::picking::PickHit;
use crate::InteractionError;

/// Input delivered by the host's event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputEvent {
    /// Pointer position in sketch coordinates at the current zoom.
    PointerMoved {
        position: [f64; 2],
        pixels_per_unit: f64,
    },
    /// Element under the pointer, as read back from the index buffer.
    Hover { hit: Option<PickHit> },
    /// Typed numeric input for the current step.
    Text { text: String },
    Confirm,
    Cancel,
}

fn number(field: &str, input: &str) -> Result<f64, InteractionError> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| InteractionError::InvalidNumericInput {
            input: input.to_string(),
        })
}

/// Parse `"x, y"` (comma or whitespace separated).
pub fn parse_point(input: &str) -> Result<[f64; 2], InteractionError> {
    let fields: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect();
    match fields.as_slice() {
        [x, y] => Ok([number(x, input)?, number(y, input)?]),
        _ => Err(InteractionError::InvalidNumericInput {
            input: input.to_string(),
        }),
    }
}

pub fn parse_scalar(input: &str) -> Result<f64, InteractionError> {
    number(input, input)
}
