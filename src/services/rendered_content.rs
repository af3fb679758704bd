//! Plain-text model of a rendered message.
//!
//! The webview renders markdown into a tree of elements; what the user sees
//! and selects is the sequence of text nodes in document order. This module
//! rebuilds that sequence from the same markdown so a DOM range can be mapped
//! onto it:
//!
//! - consecutive inline text with no element boundary in between is one node,
//!   even where the parser splits it (soft breaks, brackets, entities);
//! - a soft break stays a `\n` inside its node, as in the DOM;
//! - inline code, emphasis and links start new nodes;
//! - blocks are separated by a `\n` node.
//!
//! Offsets into the normalized text count chars. Offsets inside a node
//! ([`BoundaryPoint::offset`]) count UTF-16 code units like DOM ranges do, and
//! are converted here.

use std::collections::HashMap;

use pulldown_cmark::{Event, Parser, TagEnd};

use crate::models::{BoundaryPoint, ChatMessage, TextRange};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedContent {
    nodes: Vec<String>,
    /// Char offset where each node starts in the normalized text
    starts: Vec<usize>,
    text: String,
    char_len: usize,
}

#[derive(Default)]
struct ContentBuilder {
    nodes: Vec<String>,
    /// Last node is a text run that following inline text extends
    open: bool,
}

impl ContentBuilder {
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.open {
            if let Some(last) = self.nodes.last_mut() {
                last.push_str(text);
                return;
            }
        }
        self.nodes.push(text.to_string());
        self.open = true;
    }

    /// A node of its own, e.g. the text of an inline `<code>` element.
    fn push_element_text(&mut self, text: &str) {
        self.close();
        if !text.is_empty() {
            self.nodes.push(text.to_string());
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn end_block(&mut self) {
        self.close();
        let ends_with_newline = self
            .nodes
            .last()
            .map_or(true, |node| node.ends_with('\n'));
        if !ends_with_newline {
            self.nodes.push("\n".to_string());
        }
    }

    fn finish(mut self) -> RenderedContent {
        while let Some(last) = self.nodes.last_mut() {
            let kept = last.trim_end_matches('\n').len();
            if kept == 0 {
                self.nodes.pop();
                continue;
            }
            last.truncate(kept);
            break;
        }
        RenderedContent::from_nodes(self.nodes)
    }
}

/// Chars covered by the first `units` UTF-16 code units of `node`; `None`
/// past the end or inside a surrogate pair.
fn utf16_to_chars(node: &str, units: usize) -> Option<usize> {
    let mut seen = 0;
    for (count, c) in node.chars().enumerate() {
        if seen == units {
            return Some(count);
        }
        seen += c.len_utf16();
    }
    (seen == units).then(|| node.chars().count())
}

fn chars_to_utf16(node: &str, chars: usize) -> usize {
    node.chars().take(chars).map(char::len_utf16).sum()
}

impl RenderedContent {
    /// Flatten markdown the way the message renderer lays it out.
    pub fn from_markdown(markdown: &str) -> Self {
        let mut builder = ContentBuilder::default();

        for event in Parser::new(markdown) {
            match event {
                Event::Text(text) => builder.push_text(&text),
                Event::SoftBreak => builder.push_text("\n"),
                Event::Code(text) => builder.push_element_text(&text),
                // `<br>` has no text; the newline after it opens the next node
                Event::HardBreak => {
                    builder.close();
                    builder.push_text("\n");
                }
                Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::BlockQuote(_),
                )
                | Event::Rule => builder.end_block(),
                _ => builder.close(),
            }
        }

        builder.finish()
    }

    /// Single text node; used for user messages, which are shown verbatim.
    pub fn from_plain(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        Self::from_nodes(vec![text.to_string()])
    }

    pub fn for_message(message: &ChatMessage) -> Self {
        if message.is_assistant() {
            Self::from_markdown(&message.content)
        } else {
            Self::from_plain(&message.content)
        }
    }

    fn from_nodes(nodes: Vec<String>) -> Self {
        let mut starts = Vec::with_capacity(nodes.len());
        let mut text = String::new();
        let mut char_len = 0;
        for node in &nodes {
            starts.push(char_len);
            char_len += node.chars().count();
            text.push_str(node);
        }
        Self { nodes, starts, text, char_len }
    }

    pub fn normalized_text(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(String::as_str)
    }

    fn node_char_len(&self, index: usize) -> usize {
        self.nodes[index].chars().count()
    }

    /// Normalized-text char offset of a boundary point.
    pub fn offset_of(&self, point: BoundaryPoint) -> Option<usize> {
        let start = *self.starts.get(point.node)?;
        Some(start + utf16_to_chars(&self.nodes[point.node], point.offset)?)
    }

    fn point(&self, node: usize, chars: usize) -> BoundaryPoint {
        BoundaryPoint {
            node,
            offset: chars_to_utf16(&self.nodes[node], chars),
        }
    }

    /// Boundary point for a range start: the node the next char lives in.
    pub fn start_point(&self, offset: usize) -> Option<BoundaryPoint> {
        if offset > self.char_len {
            return None;
        }
        for (node, start) in self.starts.iter().enumerate() {
            let end = start + self.node_char_len(node);
            if offset < end {
                return Some(self.point(node, offset - start));
            }
        }
        self.end_point(offset)
    }

    /// Boundary point for a range end: the node the previous char lives in.
    pub fn end_point(&self, offset: usize) -> Option<BoundaryPoint> {
        if offset > self.char_len {
            return None;
        }
        if self.nodes.is_empty() {
            return (offset == 0).then_some(BoundaryPoint { node: 0, offset: 0 });
        }
        for (node, start) in self.starts.iter().enumerate() {
            let end = start + self.node_char_len(node);
            if offset > *start && offset <= end {
                return Some(self.point(node, offset - start));
            }
        }
        Some(BoundaryPoint { node: 0, offset: 0 })
    }

    /// Chars `[start, end)` of the normalized text.
    pub fn slice(&self, start: usize, end: usize) -> Option<String> {
        if start > end || end > self.char_len {
            return None;
        }
        Some(self.text.chars().skip(start).take(end - start).collect())
    }

    pub fn text_of(&self, range: &TextRange) -> Option<String> {
        let start = self.offset_of(range.start)?;
        let end = self.offset_of(range.end)?;
        self.slice(start.min(end), start.max(end))
    }

    /// Char offset of the first occurrence of `needle`.
    pub fn find(&self, needle: &str) -> Option<usize> {
        if needle.is_empty() {
            return None;
        }
        self.text
            .find(needle)
            .map(|byte| self.text[..byte].chars().count())
    }

    pub fn range_between(&self, start: usize, end: usize) -> Option<TextRange> {
        Some(TextRange {
            start: self.start_point(start)?,
            end: self.end_point(end)?,
        })
    }
}

/// Rendered content of every message in a conversation, keyed by message id.
#[derive(Debug, Default)]
pub struct ContentRegistry {
    contents: HashMap<String, RenderedContent>,
}

impl ContentRegistry {
    pub fn register(&mut self, message_id: impl Into<String>, content: RenderedContent) {
        self.contents.insert(message_id.into(), content);
    }

    pub fn register_message(&mut self, message: &ChatMessage) {
        self.register(message.id.clone(), RenderedContent::for_message(message));
    }

    pub fn get(&self, message_id: &str) -> Option<&RenderedContent> {
        self.contents.get(message_id)
    }

    pub fn remove(&mut self, message_id: &str) -> Option<RenderedContent> {
        self.contents.remove(message_id)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.contents.contains_key(message_id)
    }
}
