//! Error types shared by the selection, anchoring and clarification layers.

use thiserror::Error;

/// Errors produced by the clarification engine and its collaborators.
///
/// Selection rejections (`EmptySelection`, `OutOfContainerSelection`) and
/// `AnchorNotFound` are expected and frequent; callers absorb them. Only
/// `Submission` ever reaches the user, and it does so as the clarification's
/// response text rather than as an error value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClarifyError {
    /// Nothing selected, or only whitespace
    #[error("selection is empty")]
    EmptySelection,
    /// Selection is not contained in a message's content container
    #[error("selection is outside of a message container")]
    OutOfContainerSelection,
    /// Anchor could not be located in the current content
    #[error("anchor not found in message content")]
    AnchorNotFound,
    /// Clarification backend failed
    #[error("clarification request failed: {0}")]
    Submission(String),
    /// Contract violation, e.g. submitting an unknown id
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Config file could not be read or written
    #[error("config error: {0}")]
    Config(String),
    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl ClarifyError {
    /// True for rejections that are absorbed silently.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            ClarifyError::EmptySelection
                | ClarifyError::OutOfContainerSelection
                | ClarifyError::AnchorNotFound
        )
    }
}

impl From<ClarifyError> for String {
    fn from(err: ClarifyError) -> Self {
        err.to_string()
    }
}
