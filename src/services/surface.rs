//! Panel vs. overlay presentation of the active clarification.
//!
//! Both surfaces receive the same props and route every dismissal through
//! [`ClarificationStore::close`], so crossing the breakpoint mid-session needs
//! no data migration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClarifyError;
use crate::models::Clarification;
use crate::services::clarification_store::ClarificationStore;

pub const DEFAULT_PANEL_BREAKPOINT: f64 = 768.0;
pub const DEFAULT_SWIPE_DISMISS: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    /// Side panel next to the conversation
    Panel,
    /// Bottom sheet over the conversation
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DismissReason {
    CloseButton,
    BackdropClick,
    SwipeDown,
}

/// Everything a presentation container renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceProps {
    pub surface: Surface,
    pub clarification: Option<Clarification>,
}

pub fn select_surface(viewport_width: f64, breakpoint: f64, override_surface: Option<Surface>) -> Surface {
    if let Some(surface) = override_surface {
        return surface;
    }
    if viewport_width >= breakpoint {
        Surface::Panel
    } else {
        Surface::Overlay
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSelector {
    breakpoint: f64,
    override_surface: Option<Surface>,
}

impl Default for SurfaceSelector {
    fn default() -> Self {
        Self::new(DEFAULT_PANEL_BREAKPOINT)
    }
}

impl SurfaceSelector {
    pub fn new(breakpoint: f64) -> Self {
        Self {
            breakpoint,
            override_surface: None,
        }
    }

    pub fn set_override(&mut self, surface: Option<Surface>) {
        self.override_surface = surface;
    }

    pub fn surface_for(&self, viewport_width: f64) -> Surface {
        select_surface(viewport_width, self.breakpoint, self.override_surface)
    }

    pub fn props(&self, viewport_width: f64, store: &ClarificationStore) -> SurfaceProps {
        SurfaceProps {
            surface: self.surface_for(viewport_width),
            clarification: store.active(),
        }
    }

    /// Apply a dismissal gesture. Backdrop and swipe only exist on the
    /// overlay; returns whether the surface was closed.
    pub fn dismiss(
        &self,
        viewport_width: f64,
        reason: DismissReason,
        store: &ClarificationStore,
    ) -> Result<bool, ClarifyError> {
        let surface = self.surface_for(viewport_width);
        let allowed = match reason {
            DismissReason::CloseButton => true,
            DismissReason::BackdropClick | DismissReason::SwipeDown => surface == Surface::Overlay,
        };
        if !allowed {
            debug!(?reason, ?surface, "ignoring dismissal not supported by surface");
            return Ok(false);
        }
        store.close()?;
        Ok(true)
    }
}

/// Recognises a downward drag on the overlay's handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeTracker {
    threshold: f64,
    start_y: Option<f64>,
    current_y: f64,
}

impl Default for SwipeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_DISMISS)
    }
}

impl SwipeTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            start_y: None,
            current_y: 0.0,
        }
    }

    pub fn start(&mut self, y: f64) {
        self.start_y = Some(y);
        self.current_y = y;
    }

    pub fn update(&mut self, y: f64) {
        if self.start_y.is_some() {
            self.current_y = y;
        }
    }

    /// How far the sheet should follow the finger; never negative.
    pub fn offset(&self) -> f64 {
        self.start_y
            .map(|start| (self.current_y - start).max(0.0))
            .unwrap_or(0.0)
    }

    /// End the gesture; true if it qualifies as a dismiss swipe.
    pub fn end(&mut self) -> bool {
        let dismissed = self.start_y.is_some() && self.offset() >= self.threshold;
        self.start_y = None;
        self.current_y = 0.0;
        dismissed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClarificationId, TextAnchor};
    use crate::services::clarification_store::ClarificationBackend;
    use futures::future::{self, BoxFuture, FutureExt};
    use std::sync::Arc;

    struct EchoBackend;

    impl ClarificationBackend for EchoBackend {
        fn clarify(&self, selected_text: &str, _question: &str, _context: &[String]) -> BoxFuture<'static, Result<String, String>> {
            future::ready(Ok(selected_text.to_string())).boxed()
        }
    }

    fn store_with_active() -> (ClarificationStore, ClarificationId) {
        let store = ClarificationStore::new("conv", Arc::new(EchoBackend));
        let c = store
            .create(TextAnchor {
                message_id: "m".into(),
                text: "word".into(),
                start_offset: 0,
                end_offset: 4,
                container_path: None,
            })
            .unwrap();
        (store, c.id)
    }

    #[test]
    fn test_breakpoint_picks_surface() {
        assert_eq!(select_surface(1024.0, 768.0, None), Surface::Panel);
        assert_eq!(select_surface(768.0, 768.0, None), Surface::Panel);
        assert_eq!(select_surface(767.0, 768.0, None), Surface::Overlay);
        assert_eq!(select_surface(1024.0, 768.0, Some(Surface::Overlay)), Surface::Overlay);
    }

    #[test]
    fn test_props_expose_same_active_clarification_on_both_surfaces() {
        let (store, id) = store_with_active();
        let selector = SurfaceSelector::default();
        let wide = selector.props(1280.0, &store);
        let narrow = selector.props(375.0, &store);
        assert_eq!(wide.surface, Surface::Panel);
        assert_eq!(narrow.surface, Surface::Overlay);
        assert_eq!(wide.clarification, narrow.clarification);
        assert_eq!(wide.clarification.unwrap().id, id);
    }

    #[test]
    fn test_every_overlay_dismissal_closes() {
        let selector = SurfaceSelector::default();
        for reason in [DismissReason::CloseButton, DismissReason::BackdropClick, DismissReason::SwipeDown] {
            let (store, _) = store_with_active();
            assert!(selector.dismiss(375.0, reason, &store).unwrap());
            assert_eq!(store.active_id(), None);
        }
    }

    #[test]
    fn test_panel_ignores_overlay_only_gestures() {
        let selector = SurfaceSelector::default();
        let (store, id) = store_with_active();
        assert!(!selector.dismiss(1280.0, DismissReason::SwipeDown, &store).unwrap());
        assert!(!selector.dismiss(1280.0, DismissReason::BackdropClick, &store).unwrap());
        assert_eq!(store.active_id(), Some(id));
        assert!(selector.dismiss(1280.0, DismissReason::CloseButton, &store).unwrap());
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn test_swipe_tracker_threshold() {
        let mut swipe = SwipeTracker::new(80.0);
        swipe.start(500.0);
        swipe.update(560.0);
        assert_eq!(swipe.offset(), 60.0);
        assert!(!swipe.end());

        swipe.start(500.0);
        swipe.update(420.0);
        assert_eq!(swipe.offset(), 0.0);
        swipe.update(590.0);
        assert!(swipe.end());

        swipe.update(900.0);
        assert!(!swipe.end());
    }
}
