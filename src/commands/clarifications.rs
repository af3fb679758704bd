use tauri::State;

use crate::models::{Clarification, ClarificationId};
use crate::services::surface::{DismissReason, Surface, SurfaceProps};
use crate::state::AppState;

#[tauri::command]
pub fn list_clarifications(state: State<'_, AppState>, conversation_id: String) -> Result<Vec<Clarification>, String> {
    Ok(state.store(&conversation_id)?.list())
}

/// Start a submission; the result arrives as a `clarification-event`
#[tauri::command]
pub async fn submit_clarification(
    state: State<'_, AppState>,
    conversation_id: String,
    id: ClarificationId,
    request: String,
) -> Result<Option<Clarification>, String> {
    let store = state.store(&conversation_id)?;
    store.submit_detached(id, &request)?;
    Ok(store.get(id))
}

#[tauri::command]
pub fn set_active_clarification(
    state: State<'_, AppState>,
    conversation_id: String,
    id: Option<ClarificationId>,
) -> Result<(), String> {
    Ok(state.store(&conversation_id)?.set_active(id)?)
}

#[tauri::command]
pub fn close_clarification(state: State<'_, AppState>, conversation_id: String) -> Result<(), String> {
    Ok(state.store(&conversation_id)?.close()?)
}

#[tauri::command]
pub fn delete_clarification(
    state: State<'_, AppState>,
    conversation_id: String,
    id: ClarificationId,
) -> Result<(), String> {
    // The store's `Removed` event drops it from disk
    state.store(&conversation_id)?.remove(id)?;
    Ok(())
}

#[tauri::command]
pub fn get_surface(
    state: State<'_, AppState>,
    conversation_id: String,
    viewport_width: f64,
) -> Result<SurfaceProps, String> {
    state.with_session(&conversation_id, |session| Ok(session.surface_props(viewport_width)))
}

#[tauri::command]
pub fn set_surface_override(
    state: State<'_, AppState>,
    conversation_id: String,
    surface: Option<Surface>,
) -> Result<(), String> {
    state.with_session(&conversation_id, |session| {
        session.surface_selector_mut().set_override(surface);
        Ok(())
    })
}

/// Close button, backdrop click and swipe all end up in the same `close()`
#[tauri::command]
pub fn dismiss_surface(
    state: State<'_, AppState>,
    conversation_id: String,
    viewport_width: f64,
    reason: DismissReason,
) -> Result<bool, String> {
    state.with_session(&conversation_id, |session| session.dismiss(viewport_width, reason))
}

#[tauri::command]
pub fn begin_swipe(state: State<'_, AppState>, conversation_id: String, y: f64) -> Result<(), String> {
    state.with_session(&conversation_id, |session| {
        session.begin_swipe(y);
        Ok(())
    })
}

/// Returns the distance the overlay should follow the finger
#[tauri::command]
pub fn track_swipe(state: State<'_, AppState>, conversation_id: String, y: f64) -> Result<f64, String> {
    state.with_session(&conversation_id, |session| Ok(session.track_swipe(y)))
}

#[tauri::command]
pub fn end_swipe(state: State<'_, AppState>, conversation_id: String, viewport_width: f64) -> Result<bool, String> {
    state.with_session(&conversation_id, |session| session.end_swipe(viewport_width))
}
