//! Gesture scripts.

use pagemark_core::{Brush, Tool};
use serde::Deserialize;
use std::path::Path;

/// One scripted action. Pointer coordinates are screen pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Viewport { width: f64, height: f64 },
    /// Navigate and wait for the page to load.
    Goto { page: u32 },
    Tool { tool: Tool },
    Brush(Brush),
    /// Press at the first point, move through the rest, release at the last.
    Stroke { points: Vec<[f64; 2]> },
    /// Base64-encoded image bytes with their natural size.
    InsertImage { data: String, width: f64, height: f64 },
    Select { index: usize },
    Drag { index: usize, dx: f64, dy: f64 },
    Resize { index: usize, dx: f64, dy: f64 },
    Rotate { index: usize, dx: f64 },
    /// Delete the image at `index`, confirming automatically.
    DeleteImage { index: usize },
    Undo,
    Clear,
    /// Wait for background work and log the resulting notices.
    Settle,
    /// Write the exported document to the output.
    Export,
}

pub fn parse(json: &str) -> Result<Vec<Step>, serde_json::Error> {
    serde_json::from_str(json)
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<Step>, crate::ReplayError> {
    let json = std::fs::read_to_string(path)?;
    Ok(parse(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemark_core::{StrokeColor, ToolKind};

    #[test]
    fn test_parse_steps() {
        let steps = parse(
            r##"[
                { "step": "viewport", "width": 800, "height": 600 },
                { "step": "goto", "page": 2 },
                { "step": "tool", "tool": { "draw": "highlighter" } },
                { "step": "brush", "color": "#ffff00", "width": 12 },
                { "step": "stroke", "points": [[1, 2], [3, 4]] },
                { "step": "tool", "tool": "select" },
                { "step": "rotate", "index": 0, "dx": 180 },
                { "step": "undo" },
                { "step": "export" }
            ]"##,
        )
        .unwrap();
        assert_eq!(steps.len(), 9);
        assert_eq!(steps[1], Step::Goto { page: 2 });
        assert_eq!(steps[2], Step::Tool { tool: Tool::Draw(ToolKind::Highlighter) });
        let Step::Brush(brush) = &steps[3] else {
            panic!("expected brush step");
        };
        assert_eq!(brush.color, StrokeColor::from_hex("#ffff00"));
        assert!((brush.opacity - 1.0).abs() < f64::EPSILON);
        assert_eq!(steps[5], Step::Tool { tool: Tool::Select });
        assert_eq!(steps[7], Step::Undo);
    }

    #[test]
    fn test_unknown_step_rejected() {
        assert!(parse(r#"[{ "step": "teleport" }]"#).is_err());
    }
}
