use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::error::ClarifyError;
use crate::models::{ChatMessage, Clarification, ClarificationId, Conversation, ConversationListItem};
use crate::services::clarification_store::StoreEvent;
use chrono::Utc;
use uuid::Uuid;

/// On-disk record of a conversation's clarifications.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationFile {
    #[serde(default)]
    pub active_id: Option<ClarificationId>,
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    /// Highest store event sequence written to this file
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub active_seq: u64,
    /// Last applied sequence per clarification, kept after removal
    #[serde(default)]
    pub revisions: BTreeMap<ClarificationId, u64>,
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> ClarifyError {
    ClarifyError::Storage(format!("{}: {}", context, e))
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf, ClarifyError> {
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| storage_err("Failed to create directory", e))?;
    }
    Ok(dir)
}

pub fn get_app_data_dir() -> Result<PathBuf, ClarifyError> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ClarifyError::Storage("Could not find data directory".to_string()))?
        .join("Marginalia");
    ensure_dir(data_dir)
}

// ============================================================================
// Conversation Functions
// ============================================================================

pub fn get_conversations_dir(root: &Path) -> Result<PathBuf, ClarifyError> {
    ensure_dir(root.join("conversations"))
}

pub fn list_conversations(root: &Path) -> Result<Vec<ConversationListItem>, ClarifyError> {
    let conversations_dir = get_conversations_dir(root)?;
    let mut conversations = Vec::new();

    if let Ok(entries) = fs::read_dir(&conversations_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(conversation) = serde_json::from_str::<Conversation>(&content) {
                        conversations.push(ConversationListItem::from(&conversation));
                    }
                }
            }
        }
    }

    // Sort by updated_at descending
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    Ok(conversations)
}

pub fn create_conversation(root: &Path, title: &str) -> Result<Conversation, ClarifyError> {
    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        messages: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    save_conversation(root, &conversation)?;
    Ok(conversation)
}

pub fn load_conversation(root: &Path, conversation_id: &str) -> Result<Conversation, ClarifyError> {
    let path = get_conversations_dir(root)?.join(format!("{}.json", conversation_id));
    let content = fs::read_to_string(&path)
        .map_err(|e| storage_err("Failed to read conversation", e))?;
    serde_json::from_str(&content)
        .map_err(|e| storage_err("Failed to parse conversation", e))
}

pub fn save_conversation(root: &Path, conversation: &Conversation) -> Result<(), ClarifyError> {
    let path = get_conversations_dir(root)?.join(format!("{}.json", conversation.id));
    let content = serde_json::to_string_pretty(conversation)
        .map_err(|e| storage_err("Failed to serialize conversation", e))?;
    fs::write(&path, content)
        .map_err(|e| storage_err("Failed to write conversation", e))?;
    Ok(())
}

pub fn add_message(
    root: &Path,
    conversation_id: &str,
    role: &str,
    content: &str,
) -> Result<(Conversation, ChatMessage), ClarifyError> {
    let mut conversation = load_conversation(root, conversation_id)?;

    let message = ChatMessage {
        id: format!("msg_{}", Uuid::new_v4().simple()),
        role: role.to_string(),
        content: content.to_string(),
        timestamp: Utc::now(),
    };
    conversation.messages.push(message.clone());
    conversation.updated_at = Utc::now();

    // Update title from first user message if it's still "New Chat"
    if conversation.title == "New Chat" && role == "user" {
        let title = content.chars().take(50).collect::<String>();
        conversation.title = if content.chars().count() > 50 {
            format!("{}...", title)
        } else {
            title
        };
    }

    save_conversation(root, &conversation)?;
    Ok((conversation, message))
}

/// Replace a message's content, e.g. once a streamed reply has finished.
pub fn update_message(
    root: &Path,
    conversation_id: &str,
    message_id: &str,
    content: &str,
) -> Result<ChatMessage, ClarifyError> {
    let mut conversation = load_conversation(root, conversation_id)?;
    let message = conversation
        .messages
        .iter_mut()
        .find(|m| m.id == message_id)
        .ok_or_else(|| ClarifyError::Storage(format!("Message {} not found", message_id)))?;
    message.content = content.to_string();
    let message = message.clone();
    conversation.updated_at = Utc::now();

    save_conversation(root, &conversation)?;
    Ok(message)
}

pub fn delete_conversation(root: &Path, conversation_id: &str) -> Result<(), ClarifyError> {
    let path = get_conversations_dir(root)?.join(format!("{}.json", conversation_id));
    if path.exists() {
        fs::remove_file(&path).map_err(|e| storage_err("Failed to delete conversation", e))?;
    }
    let clarifications = get_clarifications_dir(root)?.join(format!("{}.json", conversation_id));
    if clarifications.exists() {
        fs::remove_file(&clarifications).map_err(|e| storage_err("Failed to delete clarifications", e))?;
    }
    Ok(())
}

// ============================================================================
// Clarification Functions
// ============================================================================

pub fn get_clarifications_dir(root: &Path) -> Result<PathBuf, ClarifyError> {
    ensure_dir(root.join("clarifications"))
}

/// Missing file means the conversation has no clarifications yet.
pub fn load_clarifications(root: &Path, conversation_id: &str) -> Result<ClarificationFile, ClarifyError> {
    let path = get_clarifications_dir(root)?.join(format!("{}.json", conversation_id));
    if !path.exists() {
        return Ok(ClarificationFile::default());
    }
    let content = fs::read_to_string(&path)
        .map_err(|e| storage_err("Failed to read clarifications", e))?;
    serde_json::from_str(&content)
        .map_err(|e| storage_err("Failed to parse clarifications", e))
}

pub fn save_clarifications(root: &Path, conversation_id: &str, file: &ClarificationFile) -> Result<(), ClarifyError> {
    let path = get_clarifications_dir(root)?.join(format!("{}.json", conversation_id));
    let content = serde_json::to_string_pretty(file)
        .map_err(|e| storage_err("Failed to serialize clarifications", e))?;
    fs::write(&path, content)
        .map_err(|e| storage_err("Failed to write clarifications", e))?;
    Ok(())
}

// Store events arrive from concurrent submissions; serialize read-modify-write
static CLARIFICATION_WRITE: Mutex<()> = Mutex::new(());

/// Persist one store event. Events may arrive out of order; one older than
/// what the file already holds for the same entity is dropped. Returns
/// whether the file changed.
pub fn apply_store_event(root: &Path, event: &StoreEvent) -> Result<bool, ClarifyError> {
    let _guard = CLARIFICATION_WRITE
        .lock()
        .map_err(|e| ClarifyError::Storage(e.to_string()))?;
    let conversation_id = event.conversation_id();
    let seq = event.seq();
    let mut file = load_clarifications(root, conversation_id)?;

    let applied = match event {
        StoreEvent::Updated { clarification, .. } => {
            let revision = file.revisions.entry(clarification.id).or_insert(0);
            if *revision >= seq {
                false
            } else {
                *revision = seq;
                match file.clarifications.iter_mut().find(|c| c.id == clarification.id) {
                    Some(existing) => *existing = clarification.clone(),
                    None => file.clarifications.push(clarification.clone()),
                }
                true
            }
        }
        StoreEvent::Removed { id, .. } => {
            let revision = file.revisions.entry(*id).or_insert(0);
            if *revision >= seq {
                false
            } else {
                *revision = seq;
                file.clarifications.retain(|c| c.id != *id);
                if file.active_id == Some(*id) {
                    file.active_id = None;
                }
                true
            }
        }
        StoreEvent::ActiveChanged { active, .. } => {
            if file.active_seq >= seq {
                false
            } else {
                file.active_seq = seq;
                file.active_id = *active;
                true
            }
        }
    };

    if !applied {
        debug!(conversation_id, seq, "dropping stale store event");
        return Ok(false);
    }
    file.seq = file.seq.max(seq);
    save_clarifications(root, conversation_id, &file)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClarificationStatus, TextAnchor};

    #[test]
    fn test_conversation_lifecycle_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let conversation = create_conversation(root, "New Chat").unwrap();
        let (updated, message) = add_message(root, &conversation.id, "user", "What is gradient descent?").unwrap();
        assert_eq!(updated.title, "What is gradient descent?");
        assert!(message.id.starts_with("msg_"));

        let loaded = load_conversation(root, &conversation.id).unwrap();
        assert_eq!(loaded.messages, vec![message]);

        let listed = list_conversations(root).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_count, 1);

        delete_conversation(root, &conversation.id).unwrap();
        assert!(list_conversations(root).unwrap().is_empty());
    }

    #[test]
    fn test_long_first_message_truncates_title() {
        let dir = tempfile::tempdir().unwrap();
        let conversation = create_conversation(dir.path(), "New Chat").unwrap();
        let long = "x".repeat(80);
        let (updated, _) = add_message(dir.path(), &conversation.id, "user", &long).unwrap();
        assert_eq!(updated.title.chars().count(), 53);
        assert!(updated.title.ends_with("..."));
    }

    #[test]
    fn test_clarifications_round_trip_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        assert_eq!(load_clarifications(root, "c1").unwrap(), ClarificationFile::default());

        let mut clarification = Clarification::new(
            ClarificationId(1),
            TextAnchor {
                message_id: "msg_1".into(),
                text: "optimization algorithm".into(),
                start_offset: 20,
                end_offset: 42,
                container_path: None,
            },
        );
        clarification.request = "explain simply".into();
        clarification.response = Some("It's a method to find the best solution step by step.".into());
        clarification.status = ClarificationStatus::Completed;

        let file = ClarificationFile {
            active_id: Some(ClarificationId(1)),
            clarifications: vec![clarification],
            ..ClarificationFile::default()
        };
        save_clarifications(root, "c1", &file).unwrap();
        assert_eq!(load_clarifications(root, "c1").unwrap(), file);

        let raw = fs::read_to_string(root.join("clarifications").join("c1.json")).unwrap();
        assert!(raw.contains("\"startOffset\": 20"));
        assert!(raw.contains("\"status\": \"completed\""));
    }

    fn alpha(id: u64) -> Clarification {
        Clarification::new(
            ClarificationId(id),
            TextAnchor {
                message_id: "msg_1".into(),
                text: "alpha".into(),
                start_offset: 0,
                end_offset: 5,
                container_path: None,
            },
        )
    }

    fn updated(seq: u64, clarification: &Clarification) -> StoreEvent {
        StoreEvent::Updated {
            seq,
            conversation_id: "c1".into(),
            clarification: clarification.clone(),
            is_active: true,
        }
    }

    fn active_changed(seq: u64, active: Option<ClarificationId>) -> StoreEvent {
        StoreEvent::ActiveChanged {
            seq,
            conversation_id: "c1".into(),
            active,
        }
    }

    #[test]
    fn test_store_events_upsert_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut clarification = alpha(1);
        assert!(apply_store_event(root, &updated(1, &clarification)).unwrap());
        assert!(apply_store_event(root, &active_changed(2, Some(ClarificationId(1)))).unwrap());

        clarification.status = ClarificationStatus::Failed;
        apply_store_event(root, &updated(3, &clarification)).unwrap();
        let file = load_clarifications(root, "c1").unwrap();
        assert_eq!(file.clarifications.len(), 1);
        assert_eq!(file.clarifications[0].status, ClarificationStatus::Failed);
        assert_eq!(file.active_id, Some(ClarificationId(1)));
        assert_eq!(file.seq, 3);

        let removed = StoreEvent::Removed {
            seq: 4,
            conversation_id: "c1".into(),
            id: ClarificationId(1),
        };
        apply_store_event(root, &removed).unwrap();
        let file = load_clarifications(root, "c1").unwrap();
        assert!(file.clarifications.is_empty());
        assert_eq!(file.active_id, None);
        assert_eq!(file.seq, 4);
    }

    #[test]
    fn test_late_older_update_does_not_overwrite_newer() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut submitting = alpha(1);
        submitting.status = ClarificationStatus::Submitting;
        let mut completed = submitting.clone();
        completed.status = ClarificationStatus::Completed;
        completed.response = Some("answer".into());

        apply_store_event(root, &updated(5, &completed)).unwrap();
        assert!(!apply_store_event(root, &updated(4, &submitting)).unwrap());

        let file = load_clarifications(root, "c1").unwrap();
        assert_eq!(file.clarifications, vec![completed]);
        assert_eq!(file.seq, 5);
    }

    #[test]
    fn test_stale_update_after_removal_stays_removed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let clarification = alpha(1);
        apply_store_event(root, &updated(1, &clarification)).unwrap();
        let removed = StoreEvent::Removed {
            seq: 3,
            conversation_id: "c1".into(),
            id: ClarificationId(1),
        };
        apply_store_event(root, &removed).unwrap();

        assert!(!apply_store_event(root, &updated(2, &clarification)).unwrap());
        assert!(load_clarifications(root, "c1").unwrap().clarifications.is_empty());
    }

    #[test]
    fn test_active_pointer_ignores_older_changes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        apply_store_event(root, &active_changed(7, None)).unwrap();
        assert!(!apply_store_event(root, &active_changed(6, Some(ClarificationId(2)))).unwrap());
        assert_eq!(load_clarifications(root, "c1").unwrap().active_id, None);

        // Entity updates keep their own ordering
        apply_store_event(root, &updated(2, &alpha(2))).unwrap();
        let file = load_clarifications(root, "c1").unwrap();
        assert_eq!(file.clarifications.len(), 1);
        assert_eq!(file.seq, 7);
    }

    #[test]
    fn test_update_message_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let conversation = create_conversation(dir.path(), "New Chat").unwrap();
        let (_, message) = add_message(dir.path(), &conversation.id, "assistant", "partial").unwrap();
        let updated = update_message(dir.path(), &conversation.id, &message.id, "partial, then complete").unwrap();
        assert_eq!(updated.id, message.id);
        let loaded = load_conversation(dir.path(), &conversation.id).unwrap();
        assert_eq!(loaded.messages[0].content, "partial, then complete");
        assert!(update_message(dir.path(), &conversation.id, "missing", "x").is_err());
    }
}
