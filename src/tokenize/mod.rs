//! Word and sentence tokenization of text runs.
//!
//! The boundary pattern is a regular expression with two capture groups:
//! group 1 matches a word, group 2 a sentence terminator. Matches where
//! neither group participates are skipped. Offsets are computed from the
//! text event's own base offset plus the match position inside the run;
//! the tokenizer keeps no state between runs.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Default boundary pattern.
///
/// Words are runs of anything except whitespace, `. , ; : ? ! " ( )` and a
/// bare `&`; entity references such as `&eacute;` stay inside the word.
/// Each of `. ; : ? !` is a sentence terminator.
pub const DEFAULT_TOKEN_PATTERN: &str =
    r#"((?:[^\s.,;:?!"()&]|&[A-Za-z0-9#]+;)+)|([.;:?!])"#;

static DEFAULT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_TOKEN_PATTERN).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Terminator,
}

/// One token with its absolute byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'t> {
    pub kind: TokenKind,
    pub text: &'t str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    /// Case-folded token text, used as a word's record name.
    pub fn folded(&self) -> String {
        self.text.to_lowercase()
    }
}

/// Compiled boundary pattern.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    regex: Regex,
}

impl Tokenizer {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        if regex.captures_len() < 3 {
            return Err(Error::TokenPattern(pattern.to_string()));
        }
        Ok(Self { regex })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Lazily tokenize `content`, which starts at byte `base` of the document.
    pub fn tokens<'t>(&'t self, content: &'t str, base: usize) -> impl Iterator<Item = Token<'t>> {
        self.regex.captures_iter(content).filter_map(move |caps| {
            let (kind, m) = if let Some(m) = caps.get(1) {
                (TokenKind::Word, m)
            } else {
                (TokenKind::Terminator, caps.get(2)?)
            };
            Some(Token {
                kind,
                text: m.as_str(),
                start: base + m.start(),
                end: base + m.end(),
            })
        })
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            regex: DEFAULT_REGEX.clone(),
        }
    }
}
