use serde::{Deserialize, Serialize};
use super::TextAnchor;

/// A position inside rendered content: text node index plus offset within
/// that node, in UTF-16 code units as a DOM `Range` reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryPoint {
    pub node: usize,
    pub offset: usize,
}

/// Serializable equivalent of a DOM range over one message's text nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start: BoundaryPoint,
    pub end: BoundaryPoint,
}

/// Client rectangle in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self { top, left, width, height }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }

    /// False for zero-size or garbage rectangles (element not laid out yet).
    pub fn is_laid_out(&self) -> bool {
        [self.top, self.left, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffordancePosition {
    pub top: f64,
    pub left: f64,
}

/// What the webview reports for the current document selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    /// Message whose content container holds the selection's common
    /// ancestor, `None` when it lies anywhere else.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Raw `Selection.toString()` output
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub range: Option<TextRange>,
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub container_rect: Option<Rect>,
}

/// Ephemeral selection state; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub candidate_anchor: Option<TextAnchor>,
    pub affordance_visible: bool,
    pub affordance_position: Option<AffordancePosition>,
}
