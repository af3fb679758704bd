//! Owns every clarification of one conversation and drives their lifecycle.
//!
//! ```text
//! created    --submit-->  submitting
//! submitting --success--> completed
//! submitting --failure--> failed
//! failed     --submit-->  submitting
//! ```
//!
//! The store handle is cheap to clone. Its lock is never held across an
//! await, so each mutation is atomic with respect to other handlers, and many
//! clarifications may be `submitting` at once. Every backend result is
//! applied by id and attempt number, never to "the latest request".

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::ClarifyError;
use crate::models::{ChatMessage, Clarification, ClarificationId, ClarificationStatus, TextAnchor};

/// Response text stored on a failed clarification.
pub const SUBMISSION_ERROR_MESSAGE: &str =
    "Sorry, this clarification could not be generated. Please try again.";

/// Response text for a submission that was cut off by a restart.
pub const INTERRUPTED_MESSAGE: &str =
    "This clarification was interrupted before it finished. Please try again.";

pub const DEFAULT_CONTEXT_MESSAGES: usize = 6;

/// Produces clarification text for a selected span.
///
/// Any `Err` is treated as a failed submission; the error text is logged,
/// never shown.
pub trait ClarificationBackend: Send + Sync {
    fn clarify(
        &self,
        selected_text: &str,
        question: &str,
        context: &[String],
    ) -> BoxFuture<'static, Result<String, String>>;
}

/// Change notification. `seq` increases with every mutation of the store, so
/// a consumer that receives events out of order can drop the stale ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    #[serde(rename_all = "camelCase")]
    Updated {
        seq: u64,
        conversation_id: String,
        clarification: Clarification,
        is_active: bool,
    },
    #[serde(rename_all = "camelCase")]
    ActiveChanged {
        seq: u64,
        conversation_id: String,
        active: Option<ClarificationId>,
    },
    #[serde(rename_all = "camelCase")]
    Removed {
        seq: u64,
        conversation_id: String,
        id: ClarificationId,
    },
}

impl StoreEvent {
    pub fn seq(&self) -> u64 {
        match self {
            StoreEvent::Updated { seq, .. }
            | StoreEvent::ActiveChanged { seq, .. }
            | StoreEvent::Removed { seq, .. } => *seq,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            StoreEvent::Updated { conversation_id, .. }
            | StoreEvent::ActiveChanged { conversation_id, .. }
            | StoreEvent::Removed { conversation_id, .. } => conversation_id,
        }
    }
}

pub type StoreListener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

struct Entry {
    clarification: Clarification,
    /// Bumped on every submit; results from older attempts are dropped
    attempt: u64,
}

struct StoreInner {
    clarifications: Vec<Entry>,
    active: Option<ClarificationId>,
    next_id: u64,
    messages: Vec<ChatMessage>,
    /// Sequence number of the last emitted event
    last_seq: u64,
}

impl StoreInner {
    fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }
}

struct PendingSubmit {
    attempt: u64,
    selected_text: String,
    request: String,
    context: Vec<String>,
    event: StoreEvent,
}

#[derive(Clone)]
pub struct ClarificationStore {
    conversation_id: String,
    inner: Arc<Mutex<StoreInner>>,
    backend: Arc<dyn ClarificationBackend>,
    listener: Option<StoreListener>,
    context_messages: usize,
}

impl ClarificationStore {
    pub fn new(conversation_id: impl Into<String>, backend: Arc<dyn ClarificationBackend>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            inner: Arc::new(Mutex::new(StoreInner {
                clarifications: Vec::new(),
                active: None,
                next_id: 1,
                messages: Vec::new(),
                last_seq: 0,
            })),
            backend,
            listener: None,
            context_messages: DEFAULT_CONTEXT_MESSAGES,
        }
    }

    pub fn with_listener(mut self, listener: StoreListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_context_messages(mut self, count: usize) -> Self {
        self.context_messages = count;
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, ClarifyError> {
        self.inner
            .lock()
            .map_err(|_| ClarifyError::InvalidState("clarification store lock poisoned".to_string()))
    }

    fn notify(&self, event: StoreEvent) {
        if let Some(listener) = &self.listener {
            listener(&event);
        }
    }

    fn invalid(&self, message: String) -> ClarifyError {
        error!(conversation_id = %self.conversation_id, "{}", message);
        ClarifyError::InvalidState(message)
    }

    fn updated(&self, seq: u64, clarification: &Clarification, active: Option<ClarificationId>) -> StoreEvent {
        StoreEvent::Updated {
            seq,
            conversation_id: self.conversation_id.clone(),
            clarification: clarification.clone(),
            is_active: active == Some(clarification.id),
        }
    }

    fn active_changed(&self, seq: u64, active: Option<ClarificationId>) -> StoreEvent {
        StoreEvent::ActiveChanged {
            seq,
            conversation_id: self.conversation_id.clone(),
            active,
        }
    }

    // ------------------------------------------------------------------
    // Conversation context
    // ------------------------------------------------------------------

    /// Insert or replace a message used as conversation context.
    pub fn upsert_message(&self, message: ChatMessage) -> Result<(), ClarifyError> {
        let mut inner = self.lock()?;
        match inner.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => inner.messages.push(message),
        }
        Ok(())
    }

    fn recent_context(&self, inner: &StoreInner) -> Vec<String> {
        let skip = inner.messages.len().saturating_sub(self.context_messages);
        inner
            .messages
            .iter()
            .skip(skip)
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a clarification for `anchor` and make it the active one.
    pub fn create(&self, anchor: TextAnchor) -> Result<Clarification, ClarifyError> {
        if !anchor.is_well_formed() {
            return Err(self.invalid(format!(
                "malformed anchor {}..{} on message {}",
                anchor.start_offset, anchor.end_offset, anchor.message_id
            )));
        }

        let (clarification, events) = {
            let mut inner = self.lock()?;
            let id = ClarificationId(inner.next_id);
            inner.next_id += 1;

            let clarification = Clarification::new(id, anchor);
            let previous = inner.active.replace(id);
            inner.clarifications.push(Entry {
                clarification: clarification.clone(),
                attempt: 0,
            });

            let mut events = vec![self.updated(inner.next_seq(), &clarification, Some(id))];
            if previous != Some(id) {
                events.push(self.active_changed(inner.next_seq(), Some(id)));
            }
            (clarification, events)
        };

        info!(
            conversation_id = %self.conversation_id,
            clarification_id = %clarification.id,
            message_id = %clarification.anchor.message_id,
            "clarification created"
        );
        for event in events {
            self.notify(event);
        }
        Ok(clarification)
    }

    /// Submit `request` and wait for the backend.
    ///
    /// Returns `Ok(None)` for a blank request and for a result that arrived
    /// after the clarification was removed or resubmitted.
    pub async fn submit(&self, id: ClarificationId, request: &str) -> Result<Option<Clarification>, ClarifyError> {
        let Some(pending) = self.begin_submit(id, request)? else {
            return Ok(None);
        };
        let attempt = pending.attempt;
        let call = self
            .backend
            .clarify(&pending.selected_text, &pending.request, &pending.context);
        self.notify(pending.event);

        let result = call.await;
        Ok(self.finish_submit(id, attempt, result))
    }

    /// Like [`submit`](Self::submit) but runs the backend call on the tokio
    /// runtime. The state change to `submitting` is applied before returning.
    pub fn submit_detached(
        &self,
        id: ClarificationId,
        request: &str,
    ) -> Result<Option<JoinHandle<Option<Clarification>>>, ClarifyError> {
        let Some(pending) = self.begin_submit(id, request)? else {
            return Ok(None);
        };
        let attempt = pending.attempt;
        let call = self
            .backend
            .clarify(&pending.selected_text, &pending.request, &pending.context);
        self.notify(pending.event);

        let store = self.clone();
        Ok(Some(tokio::spawn(async move {
            let result = call.await;
            store.finish_submit(id, attempt, result)
        })))
    }

    fn begin_submit(&self, id: ClarificationId, request: &str) -> Result<Option<PendingSubmit>, ClarifyError> {
        let mut inner = self.lock()?;
        let context = self.recent_context(&inner);
        let active = inner.active;
        let seq = inner.next_seq();

        let Some(entry) = inner.clarifications.iter_mut().find(|e| e.clarification.id == id) else {
            return Err(self.invalid(format!("submit for unknown clarification {}", id)));
        };

        let request = request.trim();
        if request.is_empty() {
            debug!(clarification_id = %id, "ignoring blank clarification request");
            return Ok(None);
        }

        let status = entry.clarification.status;
        if !status.accepts_submit() {
            return Err(self.invalid(format!("cannot submit clarification {} while {:?}", id, status)));
        }

        entry.attempt += 1;
        let clarification = &mut entry.clarification;
        clarification.status = ClarificationStatus::Submitting;
        clarification.request = request.to_string();
        clarification.response = None;
        clarification.updated_at = Utc::now();

        info!(clarification_id = %id, attempt = entry.attempt, "clarification submitting");
        Ok(Some(PendingSubmit {
            attempt: entry.attempt,
            selected_text: entry.clarification.anchor.text.clone(),
            request: request.to_string(),
            context,
            event: self.updated(seq, &entry.clarification, active),
        }))
    }

    fn finish_submit(
        &self,
        id: ClarificationId,
        attempt: u64,
        result: Result<String, String>,
    ) -> Option<Clarification> {
        let (clarification, event) = {
            let mut inner = match self.lock() {
                Ok(inner) => inner,
                Err(err) => {
                    error!(clarification_id = %id, "dropping clarification result: {}", err);
                    return None;
                }
            };
            let active = inner.active;
            let seq = inner.next_seq();
            let Some(entry) = inner.clarifications.iter_mut().find(|e| e.clarification.id == id) else {
                debug!(clarification_id = %id, "clarification removed before its result arrived");
                return None;
            };
            if entry.attempt != attempt || entry.clarification.status != ClarificationStatus::Submitting {
                debug!(clarification_id = %id, attempt, "dropping stale clarification result");
                return None;
            }

            let clarification = &mut entry.clarification;
            match result {
                Ok(response) => {
                    clarification.status = ClarificationStatus::Completed;
                    clarification.response = Some(response.trim().to_string());
                    info!(clarification_id = %id, "clarification completed");
                }
                Err(cause) => {
                    clarification.status = ClarificationStatus::Failed;
                    clarification.response = Some(SUBMISSION_ERROR_MESSAGE.to_string());
                    warn!(clarification_id = %id, "clarification failed: {}", cause);
                }
            }
            clarification.updated_at = Utc::now();
            let clarification = clarification.clone();
            let event = self.updated(seq, &clarification, active);
            (clarification, event)
        };

        self.notify(event);
        Some(clarification)
    }

    // ------------------------------------------------------------------
    // Presentation
    // ------------------------------------------------------------------

    /// Choose which clarification is presented. Never touches any status.
    pub fn set_active(&self, id: Option<ClarificationId>) -> Result<(), ClarifyError> {
        let event = {
            let mut inner = self.lock()?;
            if let Some(id) = id {
                if !inner.clarifications.iter().any(|e| e.clarification.id == id) {
                    return Err(self.invalid(format!("cannot activate unknown clarification {}", id)));
                }
            }
            if inner.active == id {
                None
            } else {
                inner.active = id;
                Some(self.active_changed(inner.next_seq(), id))
            }
        };

        if let Some(event) = event {
            self.notify(event);
        }
        Ok(())
    }

    /// Detach the presentation. In-flight submissions keep running.
    pub fn close(&self) -> Result<(), ClarifyError> {
        self.set_active(None)
    }

    /// Delete a clarification; a pending result for it is discarded.
    pub fn remove(&self, id: ClarificationId) -> Result<Option<Clarification>, ClarifyError> {
        let (removed, events) = {
            let mut inner = self.lock()?;
            let Some(index) = inner.clarifications.iter().position(|e| e.clarification.id == id) else {
                return Ok(None);
            };
            let removed = inner.clarifications.remove(index).clarification;
            let mut events = vec![StoreEvent::Removed {
                seq: inner.next_seq(),
                conversation_id: self.conversation_id.clone(),
                id,
            }];
            if inner.active == Some(id) {
                inner.active = None;
                events.push(self.active_changed(inner.next_seq(), None));
            }
            (removed, events)
        };

        info!(conversation_id = %self.conversation_id, clarification_id = %id, "clarification removed");
        for event in events {
            self.notify(event);
        }
        Ok(Some(removed))
    }

    /// Rehydrate persisted clarifications. Entries that were `submitting`
    /// when persisted can never complete, so they come back as `failed`.
    ///
    /// `last_seq` is the highest event sequence already persisted; new events
    /// continue after it.
    pub fn restore(
        &self,
        clarifications: Vec<Clarification>,
        active: Option<ClarificationId>,
        last_seq: u64,
    ) -> Result<(), ClarifyError> {
        let mut inner = self.lock()?;
        let next_id = clarifications.iter().map(|c| c.id.0).max().unwrap_or(0) + 1;
        let active = active.filter(|id| clarifications.iter().any(|c| c.id == *id));

        inner.clarifications = clarifications
            .into_iter()
            .map(|mut clarification| {
                if clarification.status == ClarificationStatus::Submitting {
                    clarification.status = ClarificationStatus::Failed;
                    clarification.response = Some(INTERRUPTED_MESSAGE.to_string());
                    clarification.updated_at = Utc::now();
                }
                Entry { clarification, attempt: 0 }
            })
            .collect();
        inner.next_id = inner.next_id.max(next_id);
        inner.last_seq = inner.last_seq.max(last_seq);
        inner.active = active;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, id: ClarificationId) -> Option<Clarification> {
        let inner = self.lock().ok()?;
        inner
            .clarifications
            .iter()
            .find(|e| e.clarification.id == id)
            .map(|e| e.clarification.clone())
    }

    /// All clarifications in creation order.
    pub fn list(&self) -> Vec<Clarification> {
        self.lock()
            .map(|inner| inner.clarifications.iter().map(|e| e.clarification.clone()).collect())
            .unwrap_or_default()
    }

    pub fn list_for_message(&self, message_id: &str) -> Vec<Clarification> {
        self.list()
            .into_iter()
            .filter(|c| c.message_id() == message_id)
            .collect()
    }

    pub fn active_id(&self) -> Option<ClarificationId> {
        self.lock().ok()?.active
    }

    pub fn active(&self) -> Option<Clarification> {
        self.get(self.active_id()?)
    }
}
