//! Markup events consumed by the parser.
//!
//! The parser never sees raw bytes: it is fed a linear stream of
//! [`Event`]s, each tagged with the byte offset at which it begins in the
//! source document. [`XmlEventSource`] produces that stream from XML with
//! `quick-xml`; anything else implementing [`EventSource`] can stand in.

mod xml;

pub use xml::XmlEventSource;

use crate::error::Result;

/// Attributes of a start tag, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the attribute with the given qualified name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One structural event.
///
/// `offset` is always a byte position in the source document, never a
/// character index. `len` on tags is the byte length of the tag markup, so
/// `offset + len` is where the next event begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start {
        name: String,
        attributes: Attributes,
        offset: usize,
        len: usize,
    },
    /// Character data, raw as it appears in the source (entity references
    /// are not expanded, so positions inside `content` map to the source).
    Text { content: String, offset: usize },
    End {
        name: String,
        offset: usize,
        len: usize,
    },
}

impl Event {
    /// Convenience constructor for a start tag without attributes.
    pub fn start(name: impl Into<String>, offset: usize, len: usize) -> Self {
        Event::Start {
            name: name.into(),
            attributes: Attributes::new(),
            offset,
            len,
        }
    }

    pub fn text(content: impl Into<String>, offset: usize) -> Self {
        Event::Text {
            content: content.into(),
            offset,
        }
    }

    pub fn end(name: impl Into<String>, offset: usize, len: usize) -> Self {
        Event::End {
            name: name.into(),
            offset,
            len,
        }
    }

    /// Byte offset where the event begins.
    pub fn offset(&self) -> usize {
        match self {
            Event::Start { offset, .. } | Event::Text { offset, .. } | Event::End { offset, .. } => {
                *offset
            }
        }
    }

    /// Byte offset one past the event.
    pub fn end_offset(&self) -> usize {
        match self {
            Event::Start { offset, len, .. } | Event::End { offset, len, .. } => offset + len,
            Event::Text { content, offset } => offset + content.len(),
        }
    }
}

/// A pull-based supplier of events for one document.
pub trait EventSource {
    /// Next event in document order, or `None` once the input is exhausted.
    fn next_event(&mut self) -> Result<Option<Event>>;
}

impl EventSource for std::vec::IntoIter<Event> {
    fn next_event(&mut self) -> Result<Option<Event>> {
        Ok(self.next())
    }
}
