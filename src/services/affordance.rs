//! Placement of the floating "Clarify" control next to a selection.

use serde::{Deserialize, Serialize};

use crate::models::{AffordancePosition, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AffordanceSide {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffordanceConfig {
    /// Horizontal distance between the container edge and the control
    pub gap: f64,
    /// Control is a square of this size
    pub size: f64,
    pub side: AffordanceSide,
}

impl Default for AffordanceConfig {
    fn default() -> Self {
        Self {
            gap: 12.0,
            size: 28.0,
            side: AffordanceSide::Right,
        }
    }
}

/// Position of the control, or `None` when either rectangle is missing or
/// not laid out yet.
pub fn compute_position(
    selection: Option<&Rect>,
    container: Option<&Rect>,
    config: &AffordanceConfig,
) -> Option<AffordancePosition> {
    let selection = selection.filter(|r| r.is_laid_out())?;
    let container = container.filter(|r| r.is_laid_out())?;

    let left = match config.side {
        AffordanceSide::Right => container.right() + config.gap,
        AffordanceSide::Left => container.left - config.gap - config.size,
    };
    let top = selection.center_y() - config.size / 2.0;

    Some(AffordancePosition { top, left })
}

/// Keeps the last geometry so scroll and resize can re-place the control.
#[derive(Debug, Clone, Default)]
pub struct AffordancePositioner {
    config: AffordanceConfig,
    selection: Option<Rect>,
    container: Option<Rect>,
    position: Option<AffordancePosition>,
}

impl AffordancePositioner {
    pub fn new(config: AffordanceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn place(&mut self, selection: Option<Rect>, container: Option<Rect>) -> Option<AffordancePosition> {
        self.selection = selection;
        self.container = container;
        self.position = compute_position(selection.as_ref(), container.as_ref(), &self.config);
        self.position
    }

    /// Recompute after scroll/resize. Does nothing once hidden.
    pub fn refresh(&mut self, selection: Option<Rect>, container: Option<Rect>) -> Option<AffordancePosition> {
        if self.selection.is_none() {
            return None;
        }
        self.place(selection, container)
    }

    pub fn hide(&mut self) {
        self.selection = None;
        self.container = None;
        self.position = None;
    }

    pub fn position(&self) -> Option<AffordancePosition> {
        self.position
    }

    pub fn is_visible(&self) -> bool {
        self.position.is_some()
    }
}
