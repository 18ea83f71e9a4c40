//! Plain-text fallback
//!
//! A minimal tag-stripping pass, not an HTML parser. Good enough for the
//! simple table-and-paragraph markup of transactional emails.

use crate::email::{EmailError, EmailResult};
use regex::{Captures, Regex};

/// Derives a plain-text body from email HTML
#[derive(Debug, Clone)]
pub struct HtmlToText {
    comments: Regex,
    hidden: Regex,
    links: Regex,
    line_breaks: Regex,
    list_items: Regex,
    block_ends: Regex,
    tags: Regex,
    spaces: Regex,
    blank_lines: Regex,
}

impl HtmlToText {
    pub fn new() -> EmailResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| EmailError::Config(format!("invalid text pattern: {}", e)))
        };

        Ok(Self {
            comments: compile(r"(?s)<!--.*?-->")?,
            hidden: compile(r"(?is)<(?:style|script|head)\b[^>]*>.*?</(?:style|script|head)\s*>")?,
            links: compile(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#)?,
            line_breaks: compile(r"(?i)<br\s*/?>")?,
            list_items: compile(r"(?i)<li\b[^>]*>")?,
            block_ends: compile(r"(?i)</(?:p|div|h[1-6]|tr|table|ul|ol|blockquote)\s*>")?,
            tags: compile(r"(?s)<[^>]*>")?,
            spaces: compile(r"[ \t\x{a0}]+")?,
            blank_lines: compile(r"\n{3,}")?,
        })
    }

    /// Convert HTML to readable plain text.
    ///
    /// Links become `label (href)`, list items `- item`, block elements
    /// end lines, and runs of blank lines collapse to one.
    pub fn convert(&self, html: &str) -> String {
        let text = self.comments.replace_all(html, "");
        let text = self.hidden.replace_all(&text, "");
        let text = self.links.replace_all(&text, |caps: &Captures| {
            let href = caps[1].trim();
            let label = self.tags.replace_all(&caps[2], "");
            let label = label.trim();
            if label.is_empty() || label == href {
                href.to_string()
            } else {
                format!("{} ({})", label, href)
            }
        });
        let text = self.line_breaks.replace_all(&text, "\n");
        let text = self.list_items.replace_all(&text, "\n- ");
        let text = self.block_ends.replace_all(&text, "\n");
        let text = self.tags.replace_all(&text, "");
        let text = decode_entities(&text);

        let lines: Vec<String> = text
            .lines()
            .map(|line| self.spaces.replace_all(line, " ").trim().to_string())
            .collect();
        let text = lines.join("\n");

        self.blank_lines.replace_all(&text, "\n\n").trim().to_string()
    }
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
