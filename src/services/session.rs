//! Per-conversation wiring of selection capture, anchoring, the lifecycle
//! store and the surface selector.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::ClarifyError;
use crate::models::{
    ChatMessage, Clarification, ClarificationId, Rect, SelectionSnapshot, SelectionState, TextRange,
};
use crate::services::affordance::AffordanceConfig;
use crate::services::anchor_resolver;
use crate::services::clarification_store::ClarificationStore;
use crate::services::config_service::EngineConfig;
use crate::services::rendered_content::ContentRegistry;
use crate::services::selection_capture::{CaptureOutcome, SelectionCapture, SelectionSignal};
use crate::services::surface::{DismissReason, SurfaceProps, SurfaceSelector, SwipeTracker};

/// Where an existing clarification should be highlighted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub clarification_id: ClarificationId,
    pub range: TextRange,
}

pub struct ClarifySession {
    contents: ContentRegistry,
    capture: SelectionCapture,
    store: ClarificationStore,
    surface: SurfaceSelector,
    swipe: SwipeTracker,
}

impl ClarifySession {
    pub fn new(store: ClarificationStore, engine: &EngineConfig) -> Self {
        let affordance = AffordanceConfig {
            gap: engine.affordance_gap_px,
            size: engine.affordance_size,
            side: engine.affordance_side,
        };
        Self {
            contents: ContentRegistry::default(),
            capture: SelectionCapture::new(Duration::from_millis(engine.debounce_ms), affordance),
            store,
            surface: SurfaceSelector::new(engine.panel_breakpoint_px),
            swipe: SwipeTracker::new(engine.swipe_dismiss_px),
        }
    }

    pub fn store(&self) -> &ClarificationStore {
        &self.store
    }

    pub fn surface_selector_mut(&mut self) -> &mut SurfaceSelector {
        &mut self.surface
    }

    /// Register (or re-render) a message so selections in it can be anchored.
    pub fn add_message(&mut self, message: ChatMessage) -> Result<(), ClarifyError> {
        self.contents.register_message(&message);
        self.store.upsert_message(message)
    }

    pub fn observe_selection(
        &mut self,
        signal: SelectionSignal,
        snapshot: SelectionSnapshot,
        now: Instant,
    ) -> (CaptureOutcome, SelectionState) {
        let outcome = self.capture.observe(signal, snapshot, now, &self.contents);
        (outcome, self.capture.state().clone())
    }

    /// New selection state if a pending snapshot settled at `now`.
    pub fn poll_selection(&mut self, now: Instant) -> Option<SelectionState> {
        self.capture.poll(now, &self.contents)?;
        Some(self.capture.state().clone())
    }

    pub fn selection_deadline(&self) -> Option<Instant> {
        self.capture.deadline()
    }

    pub fn selection_state(&self) -> &SelectionState {
        self.capture.state()
    }

    pub fn clear_selection(&mut self) {
        self.capture.pointer_down_outside();
    }

    pub fn refresh_affordance(&mut self, rect: Option<Rect>, container_rect: Option<Rect>) -> SelectionState {
        self.capture.refresh_geometry(rect, container_rect).clone()
    }

    /// The "Clarify" control was pressed: promote the candidate selection.
    ///
    /// `Ok(None)` when there is nothing to promote, e.g. the selection went
    /// away before the click landed.
    pub fn activate_affordance(&mut self) -> Result<Option<Clarification>, ClarifyError> {
        let anchor = match self.capture.begin_activation(&self.contents) {
            Ok(anchor) => anchor,
            Err(err) if err.is_silent() => {
                debug!("nothing to clarify: {}", err);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let created = self.store.create(anchor);
        self.capture.end_activation();
        created.map(Some)
    }

    /// Ranges for every clarification on `message_id` that can still be found.
    pub fn highlights(&self, message_id: &str) -> Vec<Highlight> {
        let Some(content) = self.contents.get(message_id) else {
            return Vec::new();
        };
        let clarifications = self.store.list_for_message(message_id);
        anchor_resolver::resolve_all(clarifications.iter().map(|c| (c.id, &c.anchor)), content)
            .into_iter()
            .map(|(clarification_id, range)| Highlight { clarification_id, range })
            .collect()
    }

    pub fn surface_props(&self, viewport_width: f64) -> SurfaceProps {
        self.surface.props(viewport_width, &self.store)
    }

    pub fn dismiss(&self, viewport_width: f64, reason: DismissReason) -> Result<bool, ClarifyError> {
        self.surface.dismiss(viewport_width, reason, &self.store)
    }

    pub fn begin_swipe(&mut self, y: f64) {
        self.swipe.start(y);
    }

    /// Follow the drag; returns how far the overlay should be pulled down.
    pub fn track_swipe(&mut self, y: f64) -> f64 {
        self.swipe.update(y);
        self.swipe.offset()
    }

    /// Release the drag. Closes the surface if it went past the threshold.
    pub fn end_swipe(&mut self, viewport_width: f64) -> Result<bool, ClarifyError> {
        if !self.swipe.end() {
            return Ok(false);
        }
        self.dismiss(viewport_width, DismissReason::SwipeDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClarificationStatus;
    use crate::services::clarification_store::ClarificationBackend;
    use crate::services::affordance::AffordanceSide;
    use crate::services::surface::Surface;
    use chrono::Utc;
    use futures::future::{self, BoxFuture, FutureExt};
    use std::sync::Arc;

    struct FixedBackend;

    impl ClarificationBackend for FixedBackend {
        fn clarify(&self, _: &str, _: &str, _: &[String]) -> BoxFuture<'static, Result<String, String>> {
            future::ready(Ok("fixed".to_string())).boxed()
        }
    }

    fn session() -> ClarifySession {
        session_with(&EngineConfig::default())
    }

    fn session_with(engine: &EngineConfig) -> ClarifySession {
        let store = ClarificationStore::new("conv", Arc::new(FixedBackend));
        let mut session = ClarifySession::new(store, engine);
        session
            .add_message(ChatMessage {
                id: "m1".into(),
                role: "assistant".into(),
                content: "Gradient descent is an **optimization algorithm**.".into(),
                timestamp: Utc::now(),
            })
            .unwrap();
        session
    }

    fn select(session: &mut ClarifySession, start: usize, end: usize) {
        let content = session.contents.get("m1").unwrap();
        let snapshot = SelectionSnapshot {
            message_id: Some("m1".into()),
            text: content.slice(start, end).unwrap(),
            range: content.range_between(start, end),
            rect: Some(Rect::new(10.0, 10.0, 100.0, 16.0)),
            container_rect: Some(Rect::new(0.0, 0.0, 600.0, 300.0)),
        };
        let (outcome, _) = session.observe_selection(SelectionSignal::PointerUp, snapshot, Instant::now());
        assert!(matches!(outcome, CaptureOutcome::Accepted(_)));
    }

    #[test]
    fn test_activation_promotes_selection_and_clears_state() {
        let mut session = session();
        select(&mut session, 23, 45);
        let clarification = session.activate_affordance().unwrap().unwrap();
        assert_eq!(clarification.anchor.text, "optimization algorithm");
        assert_eq!(clarification.status, ClarificationStatus::Created);
        assert_eq!(session.selection_state(), &SelectionState::default());
        assert_eq!(session.store().active_id(), Some(clarification.id));
    }

    #[test]
    fn test_highlights_survive_rerender_and_skip_lost_anchors() {
        let mut session = session();
        select(&mut session, 23, 45);
        let kept = session.activate_affordance().unwrap().unwrap();
        select(&mut session, 0, 8);
        session.activate_affordance().unwrap().unwrap();

        session
            .add_message(ChatMessage {
                id: "m1".into(),
                role: "assistant".into(),
                content: "Put simply, an *optimization algorithm*.".into(),
                timestamp: Utc::now(),
            })
            .unwrap();

        let highlights = session.highlights("m1");
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].clarification_id, kept.id);
        assert!(session.highlights("unknown").is_empty());
    }

    #[test]
    fn test_surface_follows_viewport() {
        let mut session = session();
        select(&mut session, 23, 45);
        let clarification = session.activate_affordance().unwrap().unwrap();
        assert_eq!(session.surface_props(1200.0).surface, Surface::Panel);
        let narrow = session.surface_props(400.0);
        assert_eq!(narrow.surface, Surface::Overlay);
        assert_eq!(narrow.clarification.unwrap().id, clarification.id);

        assert!(session.dismiss(400.0, DismissReason::SwipeDown).unwrap());
        assert_eq!(session.surface_props(400.0).clarification, None);
    }

    #[test]
    fn test_activation_without_selection_is_absorbed() {
        let mut session = session();
        assert_eq!(session.activate_affordance(), Ok(None));
        assert!(session.store().list().is_empty());
    }

    #[test]
    fn test_swipe_uses_configured_threshold() {
        let mut session = session_with(&EngineConfig {
            swipe_dismiss_px: 120.0,
            ..EngineConfig::default()
        });
        select(&mut session, 23, 45);
        session.activate_affordance().unwrap().unwrap();

        session.begin_swipe(300.0);
        assert_eq!(session.track_swipe(390.0), 90.0);
        assert!(!session.end_swipe(400.0).unwrap());
        assert!(session.store().active_id().is_some());

        session.begin_swipe(300.0);
        session.track_swipe(430.0);
        assert!(session.end_swipe(400.0).unwrap());
        assert_eq!(session.store().active_id(), None);
    }

    #[test]
    fn test_affordance_side_follows_config() {
        let mut session = session_with(&EngineConfig {
            affordance_side: AffordanceSide::Left,
            ..EngineConfig::default()
        });
        select(&mut session, 23, 45);
        let position = session.selection_state().affordance_position.unwrap();
        // container left 0, gap 12, size 28
        assert_eq!(position.left, -40.0);
    }
}
