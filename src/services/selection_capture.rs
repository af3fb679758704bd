//! Turns the stream of selection signals from the webview into at most one
//! settled candidate selection.
//!
//! Browsers fire many `selectionchange` events per drag, so selection changes
//! are debounced: the last snapshot within the window wins. A pointer release
//! ends the gesture and settles the selection immediately. The capture never
//! touches the document selection itself, so copying still works while the
//! affordance is shown.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ClarifyError;
use crate::models::{Rect, SelectionSnapshot, SelectionState, TextAnchor, TextRange};
use crate::services::affordance::{AffordanceConfig, AffordancePositioner};
use crate::services::anchor_resolver;
use crate::services::rendered_content::ContentRegistry;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionSignal {
    SelectionChange,
    PointerUp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Snapshot is waiting for the debounce window to close
    Pending,
    /// Signal ignored while the affordance is being activated
    Suppressed,
    Accepted(TextAnchor),
    Rejected(ClarifyError),
}

#[derive(Debug, Clone)]
struct Candidate {
    message_id: String,
    range: TextRange,
}

#[derive(Debug)]
pub struct SelectionCapture {
    debounce: Duration,
    pending: Option<(SelectionSnapshot, Instant)>,
    candidate: Option<Candidate>,
    state: SelectionState,
    positioner: AffordancePositioner,
    activating: bool,
}

impl Default for SelectionCapture {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, AffordanceConfig::default())
    }
}

impl SelectionCapture {
    pub fn new(debounce: Duration, affordance: AffordanceConfig) -> Self {
        Self {
            debounce,
            pending: None,
            candidate: None,
            state: SelectionState::default(),
            positioner: AffordancePositioner::new(affordance),
            activating: false,
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn is_activating(&self) -> bool {
        self.activating
    }

    /// When the pending snapshot settles, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.debounce)
    }

    pub fn observe(
        &mut self,
        signal: SelectionSignal,
        snapshot: SelectionSnapshot,
        now: Instant,
        contents: &ContentRegistry,
    ) -> CaptureOutcome {
        if self.activating {
            return CaptureOutcome::Suppressed;
        }
        match signal {
            SelectionSignal::SelectionChange => {
                self.pending = Some((snapshot, now));
                CaptureOutcome::Pending
            }
            SelectionSignal::PointerUp => {
                self.pending = None;
                self.accept(snapshot, contents)
            }
        }
    }

    /// Settle the pending snapshot once the debounce window has elapsed.
    pub fn poll(&mut self, now: Instant, contents: &ContentRegistry) -> Option<CaptureOutcome> {
        if self.activating {
            return None;
        }
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        let (snapshot, _) = self.pending.take()?;
        Some(self.accept(snapshot, contents))
    }

    /// Click outside any selection: drop everything.
    pub fn pointer_down_outside(&mut self) {
        if self.activating {
            return;
        }
        self.pending = None;
        self.reset();
    }

    /// Scroll or resize while the selection is still valid.
    pub fn refresh_geometry(&mut self, rect: Option<Rect>, container_rect: Option<Rect>) -> &SelectionState {
        if self.candidate.is_some() {
            self.positioner.refresh(rect, container_rect);
            self.sync_affordance();
        }
        &self.state
    }

    /// Start activating the affordance.
    ///
    /// Freezes the current candidate synchronously, before anything can
    /// re-render and collapse the selection, and suppresses further signals
    /// until [`end_activation`](Self::end_activation).
    pub fn begin_activation(&mut self, contents: &ContentRegistry) -> Result<TextAnchor, ClarifyError> {
        let candidate = self.candidate.clone().ok_or(ClarifyError::EmptySelection)?;
        let content = contents
            .get(&candidate.message_id)
            .ok_or(ClarifyError::OutOfContainerSelection)?;
        let anchor = anchor_resolver::freeze(&candidate.range, &candidate.message_id, content)?;
        self.activating = true;
        self.pending = None;
        Ok(anchor)
    }

    /// Finish activation; the candidate has been promoted and is discarded.
    pub fn end_activation(&mut self) {
        self.activating = false;
        self.reset();
    }

    fn accept(&mut self, snapshot: SelectionSnapshot, contents: &ContentRegistry) -> CaptureOutcome {
        match self.validate(&snapshot, contents) {
            Ok((candidate, anchor)) => {
                self.positioner.place(snapshot.rect, snapshot.container_rect);
                self.candidate = Some(candidate);
                self.state.candidate_anchor = Some(anchor.clone());
                self.sync_affordance();
                CaptureOutcome::Accepted(anchor)
            }
            Err(err) => {
                debug!("selection rejected: {}", err);
                self.reset();
                CaptureOutcome::Rejected(err)
            }
        }
    }

    fn validate(
        &self,
        snapshot: &SelectionSnapshot,
        contents: &ContentRegistry,
    ) -> Result<(Candidate, TextAnchor), ClarifyError> {
        if snapshot.text.trim().is_empty() {
            return Err(ClarifyError::EmptySelection);
        }
        let range = snapshot.range.ok_or(ClarifyError::EmptySelection)?;
        let message_id = snapshot
            .message_id
            .as_deref()
            .ok_or(ClarifyError::OutOfContainerSelection)?;
        let content = contents
            .get(message_id)
            .ok_or(ClarifyError::OutOfContainerSelection)?;

        let anchor = anchor_resolver::freeze(&range, message_id, content)?;
        // Selection text and rendered text differ in whitespace only
        if !snapshot.text.split_whitespace().eq(anchor.text.split_whitespace()) {
            debug!(
                message_id,
                selected = %snapshot.text.trim(),
                anchored = %anchor.text,
                "selection text does not match its range"
            );
            return Err(ClarifyError::AnchorNotFound);
        }
        let candidate = Candidate {
            message_id: message_id.to_string(),
            range,
        };
        Ok((candidate, anchor))
    }

    fn sync_affordance(&mut self) {
        self.state.affordance_position = self.positioner.position();
        self.state.affordance_visible = self.state.affordance_position.is_some();
    }

    fn reset(&mut self) {
        self.candidate = None;
        self.positioner.hide();
        self.state = SelectionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rendered_content::RenderedContent;

    const TEXT: &str = "Gradient descent is an optimization algorithm.";

    fn registry() -> ContentRegistry {
        let mut registry = ContentRegistry::default();
        registry.register("msg-1", RenderedContent::from_markdown(TEXT));
        registry
    }

    fn snapshot(registry: &ContentRegistry, start: usize, end: usize) -> SelectionSnapshot {
        let content = registry.get("msg-1").unwrap();
        SelectionSnapshot {
            message_id: Some("msg-1".into()),
            text: content.slice(start, end).unwrap(),
            range: content.range_between(start, end),
            rect: Some(Rect::new(100.0, 40.0, 160.0, 18.0)),
            container_rect: Some(Rect::new(0.0, 0.0, 640.0, 400.0)),
        }
    }

    #[test]
    fn test_debounce_keeps_only_last_snapshot() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        let t0 = Instant::now();

        capture.observe(SelectionSignal::SelectionChange, snapshot(&registry, 0, 8), t0, &registry);
        capture.observe(
            SelectionSignal::SelectionChange,
            snapshot(&registry, 23, 45),
            t0 + Duration::from_millis(40),
            &registry,
        );
        assert_eq!(capture.poll(t0 + Duration::from_millis(100), &registry), None);
        assert!(capture.state().candidate_anchor.is_none());

        let outcome = capture.poll(t0 + Duration::from_millis(140), &registry).unwrap();
        let CaptureOutcome::Accepted(anchor) = outcome else {
            panic!("expected accepted selection");
        };
        assert_eq!(anchor.text, "optimization algorithm");
        assert!(capture.state().affordance_visible);
        assert_eq!(capture.deadline(), None);
    }

    #[test]
    fn test_pointer_up_settles_immediately() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        let t0 = Instant::now();
        capture.observe(SelectionSignal::SelectionChange, snapshot(&registry, 0, 8), t0, &registry);
        let outcome = capture.observe(SelectionSignal::PointerUp, snapshot(&registry, 9, 16), t0, &registry);
        assert!(matches!(outcome, CaptureOutcome::Accepted(ref a) if a.text == "descent"));
        assert_eq!(capture.poll(t0 + Duration::from_secs(1), &registry), None);
    }

    #[test]
    fn test_whitespace_selection_is_rejected() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        capture.observe(SelectionSignal::PointerUp, snapshot(&registry, 0, 8), Instant::now(), &registry);
        assert!(capture.state().candidate_anchor.is_some());

        let mut blank = snapshot(&registry, 8, 9);
        blank.text = "   ".into();
        let outcome = capture.observe(SelectionSignal::PointerUp, blank, Instant::now(), &registry);
        assert_eq!(outcome, CaptureOutcome::Rejected(ClarifyError::EmptySelection));
        assert_eq!(capture.state(), &SelectionState::default());
    }

    #[test]
    fn test_outside_container_is_rejected() {
        let registry = registry();
        let mut capture = SelectionCapture::default();

        let mut outside = snapshot(&registry, 0, 8);
        outside.message_id = None;
        let outcome = capture.observe(SelectionSignal::PointerUp, outside, Instant::now(), &registry);
        assert_eq!(outcome, CaptureOutcome::Rejected(ClarifyError::OutOfContainerSelection));

        let mut unknown = snapshot(&registry, 0, 8);
        unknown.message_id = Some("other".into());
        let outcome = capture.observe(SelectionSignal::PointerUp, unknown, Instant::now(), &registry);
        assert_eq!(outcome, CaptureOutcome::Rejected(ClarifyError::OutOfContainerSelection));
        assert!(capture.state().candidate_anchor.is_none());
    }

    #[test]
    fn test_range_disagreeing_with_selected_text_is_rejected() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        let mut snap = snapshot(&registry, 23, 45);
        snap.text = "descent is an optimiz".into();
        let outcome = capture.observe(SelectionSignal::PointerUp, snap, Instant::now(), &registry);
        assert_eq!(outcome, CaptureOutcome::Rejected(ClarifyError::AnchorNotFound));
        assert!(capture.state().candidate_anchor.is_none());
    }

    #[test]
    fn test_selected_text_may_differ_in_whitespace() {
        let mut registry = ContentRegistry::default();
        registry.register("msg-1", RenderedContent::from_markdown("line one\nline two"));
        let content = registry.get("msg-1").unwrap();
        let snap = SelectionSnapshot {
            message_id: Some("msg-1".into()),
            // Browsers report the soft break as a space
            text: " one line ".into(),
            range: content.range_between(5, 13),
            rect: Some(Rect::new(100.0, 40.0, 160.0, 18.0)),
            container_rect: Some(Rect::new(0.0, 0.0, 640.0, 400.0)),
        };
        let mut capture = SelectionCapture::default();
        let outcome = capture.observe(SelectionSignal::PointerUp, snap, Instant::now(), &registry);
        let CaptureOutcome::Accepted(anchor) = outcome else {
            panic!("expected accepted selection");
        };
        assert_eq!(anchor.text, "one\nline");
    }

    #[test]
    fn test_unlaid_container_hides_affordance_but_keeps_candidate() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        let mut snap = snapshot(&registry, 23, 45);
        snap.container_rect = Some(Rect::default());
        capture.observe(SelectionSignal::PointerUp, snap, Instant::now(), &registry);
        assert!(capture.state().candidate_anchor.is_some());
        assert!(!capture.state().affordance_visible);

        let state = capture.refresh_geometry(
            Some(Rect::new(100.0, 40.0, 160.0, 18.0)),
            Some(Rect::new(0.0, 0.0, 640.0, 400.0)),
        );
        assert!(state.affordance_visible);
    }

    #[test]
    fn test_activation_guards_against_reentrant_signals() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        let t0 = Instant::now();
        capture.observe(SelectionSignal::PointerUp, snapshot(&registry, 23, 45), t0, &registry);

        let anchor = capture.begin_activation(&registry).unwrap();
        assert_eq!((anchor.start_offset, anchor.end_offset), (23, 45));

        // The click collapses the selection; that must not clear anything.
        let collapsed = SelectionSnapshot::default();
        let outcome = capture.observe(SelectionSignal::SelectionChange, collapsed.clone(), t0, &registry);
        assert_eq!(outcome, CaptureOutcome::Suppressed);
        assert_eq!(capture.observe(SelectionSignal::PointerUp, collapsed, t0, &registry), CaptureOutcome::Suppressed);
        assert!(capture.state().candidate_anchor.is_some());

        capture.end_activation();
        assert!(!capture.is_activating());
        assert!(capture.state().candidate_anchor.is_none());
    }

    #[test]
    fn test_activation_without_candidate_fails() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        assert_eq!(capture.begin_activation(&registry), Err(ClarifyError::EmptySelection));
        assert!(!capture.is_activating());
    }

    #[test]
    fn test_outside_click_discards_state() {
        let registry = registry();
        let mut capture = SelectionCapture::default();
        capture.observe(SelectionSignal::PointerUp, snapshot(&registry, 23, 45), Instant::now(), &registry);
        capture.pointer_down_outside();
        assert_eq!(capture.state(), &SelectionState::default());
        assert_eq!(capture.begin_activation(&registry), Err(ClarifyError::EmptySelection));
    }
}
