use serde::{Deserialize, Serialize};

/// Structural fallback locator: which rendered text node the anchor starts
/// in, and the offset inside that node in UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPath {
    pub node_index: usize,
    pub node_offset: usize,
}

/// Immutable snapshot of a selected span inside one message.
///
/// Offsets are char offsets into the message's normalized text, half-open.
/// At creation `text` equals that slice exactly; the anchor is never updated
/// afterwards, even if the message is re-rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnchor {
    pub message_id: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<ContainerPath>,
}

impl TextAnchor {
    pub fn char_len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    /// Checks the structural invariants that hold for every frozen anchor.
    pub fn is_well_formed(&self) -> bool {
        !self.text.is_empty()
            && self.start_offset < self.end_offset
            && self.text.chars().count() == self.char_len()
    }
}
