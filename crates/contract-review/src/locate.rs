//! Fuzzy location of an excerpt inside a document.
//!
//! Risk findings quote the contract, but the quote rarely matches the stored
//! Markdown byte for byte: line breaks move, spacing changes, letters change
//! case. [`TextLocator`] compares both sides with whitespace removed and
//! lowercased, then maps the hit back to offsets in the original text.
//!
//! When the whole excerpt is not found, the excerpt is split into tokens and
//! the token whose surrounding window (50 normalized characters either side)
//! is longest is used as the match.
//!
//! ```
//! use contract_review::locate::{MatchKind, TextLocator};
//!
//! let doc = "第一条 付款方式\n预付款为合同总价的30%。";
//! let locator = TextLocator::new(doc);
//! let hit = locator.locate("付款方式 预付款").unwrap();
//! assert_eq!(hit.text, "付款方式\n预付款");
//! assert_eq!(hit.kind, MatchKind::Exact);
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Normalized characters kept on each side of a token in fallback matching.
pub const CONTEXT_RADIUS: usize = 50;

/// Opening marker used by the service when highlighting a match.
pub const HIGHLIGHT_OPEN: &str = r#"<mark class="highlight" id="highlight-target">"#;

/// Closing marker used by the service when highlighting a match.
pub const HIGHLIGHT_CLOSE: &str = "</mark>";

/// How a match was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MatchKind {
    /// The whole normalized query occurs in the document.
    Exact,
    /// Only a token of the query was found; the match is its context window.
    Token {
        /// The query token that anchored the window.
        token: String,
    },
}

/// A located span of the original document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextMatch {
    /// Byte offset of the first matched character.
    pub start: usize,
    /// Byte offset one past the last matched character.
    pub end: usize,
    /// The matched slice of the original document.
    pub text: String,
    /// How the span was found.
    pub kind: MatchKind,
}

/// A document prepared for repeated fuzzy lookups.
///
/// Construction is linear in the document length. Each lookup is linear in
/// the document plus the query.
#[derive(Debug, Clone)]
pub struct TextLocator<'a> {
    document: &'a str,
    normalized: String,
    /// Byte offset in `normalized` of each normalized character.
    offsets: Vec<usize>,
    /// Byte span in `document` of the character each normalized character came from.
    origin: Vec<(usize, usize)>,
}

impl<'a> TextLocator<'a> {
    /// Index `document` for lookups.
    #[must_use]
    pub fn new(document: &'a str) -> Self {
        let mut normalized = String::with_capacity(document.len());
        let mut offsets = Vec::with_capacity(document.len());
        let mut origin = Vec::with_capacity(document.len());

        for (start, ch) in document.char_indices() {
            if ch.is_whitespace() {
                continue;
            }
            let end = start + ch.len_utf8();
            // Lowercasing can expand one character into several; all of
            // them point back at the same original character.
            for lower in ch.to_lowercase() {
                offsets.push(normalized.len());
                normalized.push(lower);
                origin.push((start, end));
            }
        }

        Self {
            document,
            normalized,
            offsets,
            origin,
        }
    }

    /// The document being searched.
    #[must_use]
    pub fn document(&self) -> &'a str {
        self.document
    }

    /// The document with whitespace removed and lowercased.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Number of characters in the normalized document.
    #[must_use]
    pub fn normalized_len(&self) -> usize {
        self.origin.len()
    }

    /// Find `query` in the document.
    ///
    /// Returns `None` for a blank query or when neither the query nor any of
    /// its tokens (longer than one character) occurs in the document.
    #[must_use]
    pub fn locate(&self, query: &str) -> Option<TextMatch> {
        let target = normalize(query);
        if target.is_empty() {
            return None;
        }

        if let Some(start) = self.find_normalized(&target) {
            let end = start + target.chars().count();
            return self.span(start, end, MatchKind::Exact);
        }

        let mut best: Option<(usize, usize, &str)> = None;
        for token in tokenize(query) {
            let needle = normalize(token);
            if needle.is_empty() {
                continue;
            }
            let Some(index) = self.find_normalized(&needle) else {
                continue;
            };

            let start = index.saturating_sub(CONTEXT_RADIUS);
            let end = (index + needle.chars().count() + CONTEXT_RADIUS).min(self.normalized_len());
            let longer = best.map_or(true, |(s, e, _)| end - start > e - s);
            if longer {
                best = Some((start, end, token));
            }
        }

        let (start, end, token) = best?;
        self.span(
            start,
            end,
            MatchKind::Token {
                token: token.to_string(),
            },
        )
    }

    /// Locate `query` and wrap the match in `open` and `close`.
    ///
    /// Returns `None` when [`locate`](Self::locate) finds nothing.
    #[must_use]
    pub fn highlight(&self, query: &str, open: &str, close: &str) -> Option<String> {
        let hit = self.locate(query)?;
        Some(self.highlight_match(&hit, open, close))
    }

    /// Wrap an already located match in `open` and `close`.
    #[must_use]
    pub fn highlight_match(&self, hit: &TextMatch, open: &str, close: &str) -> String {
        let mut out =
            String::with_capacity(self.document.len() + open.len() + close.len());
        out.push_str(&self.document[..hit.start]);
        out.push_str(open);
        out.push_str(&self.document[hit.start..hit.end]);
        out.push_str(close);
        out.push_str(&self.document[hit.end..]);
        out
    }

    /// Character index in the normalized document of the first occurrence of `needle`.
    fn find_normalized(&self, needle: &str) -> Option<usize> {
        let byte = self.normalized.find(needle)?;
        self.offsets.binary_search(&byte).ok()
    }

    /// Build the match for normalized characters `[start, end)`.
    fn span(&self, start: usize, end: usize, kind: MatchKind) -> Option<TextMatch> {
        if start >= end || end > self.origin.len() {
            return None;
        }
        let (orig_start, _) = self.origin[start];
        let (_, orig_end) = self.origin[end - 1];
        Some(TextMatch {
            start: orig_start,
            end: orig_end,
            text: self.document[orig_start..orig_end].to_string(),
            kind,
        })
    }
}

/// Remove all whitespace and lowercase.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a query into fallback tokens.
///
/// Splits on whitespace and ASCII/CJK punctuation, drops tokens of one
/// character or less.
///
/// # Panics
///
/// Panics if the separator pattern fails to compile, which would be a bug.
pub fn tokenize(query: &str) -> impl Iterator<Item = &str> {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators = SEPARATORS.get_or_init(|| {
        Regex::new(r#"[\s,，。；;:：、()（）【】『』「」“”"'<>《》]+"#)
            .expect("invalid separator pattern")
    });

    separators
        .split(query)
        .map(str::trim)
        .filter(|token| token.chars().count() > 1)
}
