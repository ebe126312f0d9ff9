use std::str::FromStr;

use serde::{Deserialize, Serialize};

use pagemark_shared::{Stroke, StrokeTool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Pen,
    Highlighter,
    Eraser,
}

impl Tool {
    pub fn stroke_tool(self) -> Option<StrokeTool> {
        match self {
            Tool::Pen => Some(StrokeTool::Pen),
            Tool::Highlighter => Some(StrokeTool::Highlighter),
            Tool::Eraser => None,
        }
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pen" => Ok(Tool::Pen),
            "highlighter" => Ok(Tool::Highlighter),
            "eraser" => Ok(Tool::Eraser),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

/// One press-release cycle on the annotation layer.
#[derive(Debug)]
pub enum Gesture {
    Idle,
    Drawing {
        pointer_id: i32,
        stroke: Stroke,
    },
    Erasing {
        pointer_id: i32,
        removed: usize,
        /// A stroke that was still being drawn when the eraser took over.
        pending: Option<Stroke>,
    },
}

impl Gesture {
    pub fn pointer_id(&self) -> Option<i32> {
        match self {
            Gesture::Idle => None,
            Gesture::Drawing { pointer_id, .. } | Gesture::Erasing { pointer_id, .. } => {
                Some(*pointer_id)
            }
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Gesture::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_parse_case_insensitively() {
        assert_eq!("Eraser".parse::<Tool>(), Ok(Tool::Eraser));
        assert_eq!(" pen ".parse::<Tool>(), Ok(Tool::Pen));
        assert!("lasso".parse::<Tool>().is_err());
        assert_eq!(Tool::Highlighter.stroke_tool(), Some(StrokeTool::Highlighter));
    }
}
