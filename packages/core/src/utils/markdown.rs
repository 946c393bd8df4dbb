//! Markdown helpers for documents and AI answers
//!
//! Titles come from the first heading of a document; code blocks are the
//! fenced blocks an automation caller may want to run.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

/// Compiled regex for whitespace normalization
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// A fenced code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// First word of the info string, lowercased; empty when none was given
    pub lang: String,
    pub code: String,
}

/// Plain text of the first heading, if any
///
/// # Examples
///
/// ```
/// use dataspace_core::utils::markdown_title;
///
/// assert_eq!(markdown_title("# Hello **World**\n\nbody").as_deref(), Some("Hello World"));
/// assert_eq!(markdown_title("no heading"), None);
/// ```
pub fn markdown_title(markdown: &str) -> Option<String> {
    let mut in_heading = false;
    let mut title = String::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) => {
                let normalized = WHITESPACE_RE.replace_all(title.trim(), " ").to_string();
                if !normalized.is_empty() {
                    return Some(normalized);
                }
                in_heading = false;
                title.clear();
            }
            Event::Text(text) | Event::Code(text) if in_heading => title.push_str(&text),
            Event::SoftBreak | Event::HardBreak if in_heading => title.push(' '),
            _ => {}
        }
    }
    None
}

/// All fenced code blocks in document order
pub fn extract_code_blocks(markdown: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<CodeBlock> = None;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let lang = info
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                current = Some(CodeBlock {
                    lang,
                    code: String::new(),
                });
            }
            Event::Text(text) => {
                if let Some(block) = current.as_mut() {
                    block.code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {}
        }
    }
    blocks
}
