use std::time::Instant;

use tauri::{AppHandle, Emitter, Manager, State};
use tracing::warn;

use crate::models::{Clarification, Rect, SelectionSnapshot, SelectionState};
use crate::services::selection_capture::{CaptureOutcome, SelectionSignal};
use crate::services::session::Highlight;
use crate::state::AppState;

/// Feed a selection signal from the webview.
///
/// Debounced snapshots settle on a timer; the settled state is delivered as a
/// `selection-changed` event.
#[tauri::command]
pub async fn observe_selection(
    app: AppHandle,
    state: State<'_, AppState>,
    conversation_id: String,
    signal: SelectionSignal,
    snapshot: SelectionSnapshot,
) -> Result<SelectionState, String> {
    let (outcome, selection, deadline) = state.with_session(&conversation_id, |session| {
        let (outcome, selection) = session.observe_selection(signal, snapshot, Instant::now());
        Ok((outcome, selection, session.selection_deadline()))
    })?;

    if let (CaptureOutcome::Pending, Some(deadline)) = (outcome, deadline) {
        tauri::async_runtime::spawn(async move {
            tokio::time::sleep_until(deadline.into()).await;
            let state = app.state::<AppState>();
            let settled = state.with_session(&conversation_id, |session| Ok(session.poll_selection(Instant::now())));
            match settled {
                Ok(Some(selection)) => {
                    if let Err(err) = app.emit("selection-changed", &selection) {
                        warn!("failed to emit selection state: {}", err);
                    }
                }
                // Superseded by a later snapshot, or the conversation closed
                Ok(None) | Err(_) => {}
            }
        });
    }

    Ok(selection)
}

#[tauri::command]
pub fn clear_selection(state: State<'_, AppState>, conversation_id: String) -> Result<(), String> {
    state.with_session(&conversation_id, |session| {
        session.clear_selection();
        Ok(())
    })
}

/// Re-place the affordance after scroll or resize
#[tauri::command]
pub fn refresh_affordance(
    state: State<'_, AppState>,
    conversation_id: String,
    rect: Option<Rect>,
    container_rect: Option<Rect>,
) -> Result<SelectionState, String> {
    state.with_session(&conversation_id, |session| Ok(session.refresh_affordance(rect, container_rect)))
}

/// `None` when the selection was already gone; not an error for the webview
#[tauri::command]
pub fn activate_affordance(
    state: State<'_, AppState>,
    conversation_id: String,
) -> Result<Option<Clarification>, String> {
    state.with_session(&conversation_id, |session| session.activate_affordance())
}

#[tauri::command]
pub fn get_highlights(
    state: State<'_, AppState>,
    conversation_id: String,
    message_id: String,
) -> Result<Vec<Highlight>, String> {
    state.with_session(&conversation_id, |session| Ok(session.highlights(&message_id)))
}
