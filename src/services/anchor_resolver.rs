//! Converts between live ranges and offset-based [`TextAnchor`]s.
//!
//! Anchors are offsets into normalized text rather than references to
//! rendered nodes: a re-render regenerates nodes, but usually not their text.

use tracing::debug;

use crate::error::ClarifyError;
use crate::models::{BoundaryPoint, ContainerPath, TextAnchor, TextRange};
use crate::services::rendered_content::RenderedContent;

/// Freeze a range over `content` into an immutable anchor.
///
/// Backward ranges are accepted. Leading and trailing whitespace is trimmed
/// and the offsets move inward with it, so `text` always equals the slice.
pub fn freeze(
    range: &TextRange,
    message_id: &str,
    content: &RenderedContent,
) -> Result<TextAnchor, ClarifyError> {
    let a = content.offset_of(range.start).ok_or(ClarifyError::AnchorNotFound)?;
    let b = content.offset_of(range.end).ok_or(ClarifyError::AnchorNotFound)?;
    let (start, end) = (a.min(b), a.max(b));

    let raw = content.slice(start, end).ok_or(ClarifyError::AnchorNotFound)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClarifyError::EmptySelection);
    }

    let leading = raw.chars().take_while(|c| c.is_whitespace()).count();
    let start_offset = start + leading;
    let end_offset = start_offset + trimmed.chars().count();

    let container_path = content
        .start_point(start_offset)
        .map(|point| ContainerPath {
            node_index: point.node,
            node_offset: point.offset,
        });

    Ok(TextAnchor {
        message_id: message_id.to_string(),
        text: trimmed.to_string(),
        start_offset,
        end_offset,
        container_path,
    })
}

/// Locate `anchor` in the current content of its message.
///
/// Tries the recorded offset first, then the structural locator, then the
/// first occurrence of the anchor text anywhere in the message.
pub fn resolve(anchor: &TextAnchor, content: &RenderedContent) -> Result<TextRange, ClarifyError> {
    if anchor.text.is_empty() {
        return Err(ClarifyError::AnchorNotFound);
    }
    let len = anchor.text.chars().count();
    let matches_at = |start: usize| {
        content.slice(start, start + len).as_deref() == Some(anchor.text.as_str())
    };

    let start = if matches_at(anchor.start_offset) {
        Some(anchor.start_offset)
    } else {
        anchor
            .container_path
            .and_then(|path| {
                content.offset_of(BoundaryPoint {
                    node: path.node_index,
                    offset: path.node_offset,
                })
            })
            .filter(|start| matches_at(*start))
            .or_else(|| content.find(&anchor.text))
    };

    start
        .and_then(|start| content.range_between(start, start + len))
        .ok_or(ClarifyError::AnchorNotFound)
}

/// Re-highlight pass: resolves every keyed anchor, silently skipping misses.
pub fn resolve_all<'a, K, I>(anchors: I, content: &RenderedContent) -> Vec<(K, TextRange)>
where
    I: IntoIterator<Item = (K, &'a TextAnchor)>,
{
    anchors
        .into_iter()
        .filter_map(|(key, anchor)| match resolve(anchor, content) {
            Ok(range) => Some((key, range)),
            Err(err) => {
                debug!(message_id = %anchor.message_id, text = %anchor.text, "skipping highlight: {}", err);
                None
            }
        })
        .collect()
}
