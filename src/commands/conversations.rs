use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tauri::{AppHandle, Emitter, State};
use tracing::warn;

use crate::models::{ChatMessage, Clarification, ClarificationId, Conversation, ConversationListItem};
use crate::services::clarification_store::{ClarificationStore, StoreEvent, StoreListener};
use crate::services::clarify_service::LlmClarifier;
use crate::services::session::ClarifySession;
use crate::services::{config_service, file_service};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedConversation {
    pub conversation: Conversation,
    pub clarifications: Vec<Clarification>,
    pub active_id: Option<ClarificationId>,
}

/// Persists every store change and forwards it to the webview.
/// Listener calls can interleave, so the file layer orders them by `seq`.
fn store_listener(app: AppHandle, root: PathBuf) -> StoreListener {
    Arc::new(move |event: &StoreEvent| {
        if let Err(err) = file_service::apply_store_event(&root, event) {
            warn!("failed to persist clarification change: {}", err);
        }
        if let Err(err) = app.emit("clarification-event", event) {
            warn!("failed to emit clarification event: {}", err);
        }
    })
}

#[tauri::command]
pub fn list_conversations() -> Result<Vec<ConversationListItem>, String> {
    Ok(file_service::list_conversations(&file_service::get_app_data_dir()?)?)
}

#[tauri::command]
pub fn create_conversation() -> Result<Conversation, String> {
    Ok(file_service::create_conversation(&file_service::get_app_data_dir()?, "New Chat")?)
}

/// Load a conversation and its clarifications and start a session for it
#[tauri::command]
pub fn open_conversation(
    app: AppHandle,
    state: State<'_, AppState>,
    conversation_id: String,
) -> Result<OpenedConversation, String> {
    let root = file_service::get_app_data_dir()?;
    let conversation = file_service::load_conversation(&root, &conversation_id)?;
    let saved = file_service::load_clarifications(&root, &conversation_id)?;
    let engine = config_service::load_config().unwrap_or_default().engine;

    let store = ClarificationStore::new(conversation_id.clone(), Arc::new(LlmClarifier))
        .with_context_messages(engine.context_messages)
        .with_listener(store_listener(app, root));
    store.restore(saved.clarifications, saved.active_id, saved.seq)?;

    let mut session = ClarifySession::new(store.clone(), &engine);
    for message in &conversation.messages {
        session.add_message(message.clone())?;
    }
    state.insert(conversation_id, session)?;

    Ok(OpenedConversation {
        conversation,
        clarifications: store.list(),
        active_id: store.active_id(),
    })
}

#[tauri::command]
pub fn close_conversation(state: State<'_, AppState>, conversation_id: String) -> Result<(), String> {
    state.remove(&conversation_id)
}

#[tauri::command]
pub fn delete_conversation(state: State<'_, AppState>, conversation_id: String) -> Result<(), String> {
    state.remove(&conversation_id)?;
    Ok(file_service::delete_conversation(&file_service::get_app_data_dir()?, &conversation_id)?)
}

/// Append a message produced by the chat collaborator
#[tauri::command]
pub fn add_message(
    state: State<'_, AppState>,
    conversation_id: String,
    role: String,
    content: String,
) -> Result<ChatMessage, String> {
    let root = file_service::get_app_data_dir()?;
    let (_, message) = file_service::add_message(&root, &conversation_id, &role, &content)?;
    state.with_session(&conversation_id, |session| session.add_message(message.clone()))?;
    Ok(message)
}

/// Replace a message's rendered content, e.g. after streaming finished
#[tauri::command]
pub fn update_message(
    state: State<'_, AppState>,
    conversation_id: String,
    message_id: String,
    content: String,
) -> Result<ChatMessage, String> {
    let root = file_service::get_app_data_dir()?;
    let message = file_service::update_message(&root, &conversation_id, &message_id, &content)?;
    state.with_session(&conversation_id, |session| session.add_message(message.clone()))?;
    Ok(message)
}
