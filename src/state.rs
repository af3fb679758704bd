use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ClarifyError;
use crate::services::clarification_store::ClarificationStore;
use crate::services::session::ClarifySession;

/// Open conversations, keyed by conversation id.
#[derive(Default)]
pub struct AppState {
    sessions: Mutex<HashMap<String, ClarifySession>>,
}

impl AppState {
    pub fn insert(&self, conversation_id: String, session: ClarifySession) -> Result<(), String> {
        let mut sessions = self.sessions.lock().map_err(|e| e.to_string())?;
        sessions.insert(conversation_id, session);
        Ok(())
    }

    pub fn remove(&self, conversation_id: &str) -> Result<(), String> {
        let mut sessions = self.sessions.lock().map_err(|e| e.to_string())?;
        sessions.remove(conversation_id);
        Ok(())
    }

    pub fn with_session<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut ClarifySession) -> Result<R, ClarifyError>,
    ) -> Result<R, String> {
        let mut sessions = self.sessions.lock().map_err(|e| e.to_string())?;
        let session = sessions
            .get_mut(conversation_id)
            .ok_or_else(|| format!("Conversation {} is not open", conversation_id))?;
        f(session).map_err(String::from)
    }

    /// Clone of the conversation's store, for use outside the sessions lock.
    pub fn store(&self, conversation_id: &str) -> Result<ClarificationStore, String> {
        self.with_session(conversation_id, |session| Ok(session.store().clone()))
    }
}
