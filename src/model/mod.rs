//! Content objects produced by the parser.
//!
//! A [`Record`] is one materialized object of the ordered hierarchy:
//! a document, a division, a paragraph, a sentence or a word, plus the
//! orthogonal page marker. Records carry exact byte ranges into the
//! (normalized) source document and type-scoped ids starting at 1.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Structural type of a record.
///
/// The nesting order is `Document > Division > Paragraph > Sentence > Word`.
/// `Page` does not nest; it attaches to whatever record is open when the
/// page begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    #[serde(alias = "doc")]
    Document,
    #[serde(alias = "div")]
    Division,
    #[serde(alias = "para")]
    Paragraph,
    #[serde(alias = "sent")]
    Sentence,
    Word,
    Page,
}

impl ObjectType {
    /// Number of object types.
    pub const COUNT: usize = 6;

    /// All types, in nesting order with `Page` last.
    pub const ALL: [ObjectType; Self::COUNT] = [
        ObjectType::Document,
        ObjectType::Division,
        ObjectType::Paragraph,
        ObjectType::Sentence,
        ObjectType::Word,
        ObjectType::Page,
    ];

    /// Dense index, used for per-type counters.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short name used in the text output format.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Document => "doc",
            ObjectType::Division => "div",
            ObjectType::Paragraph => "para",
            ObjectType::Sentence => "sent",
            ObjectType::Word => "word",
            ObjectType::Page => "page",
        }
    }

    /// Whether records of this type take part in the LIFO hierarchy.
    pub fn is_nesting(self) -> bool {
        self != ObjectType::Page
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doc" | "document" => Ok(ObjectType::Document),
            "div" | "division" => Ok(ObjectType::Division),
            "para" | "paragraph" => Ok(ObjectType::Paragraph),
            "sent" | "sentence" => Ok(ObjectType::Sentence),
            "word" => Ok(ObjectType::Word),
            "page" => Ok(ObjectType::Page),
            other => Err(format!("unknown object type: {other}")),
        }
    }
}

/// Weak reference to a record: its type and type-scoped id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub id: u32,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.id)
    }
}

/// One closed content object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Document this record belongs to.
    pub doc_id: u32,
    /// Type-scoped sequential id, starting at 1 in document order.
    pub id: u32,
    /// Element name for markup-backed records, the case-folded token for
    /// words, the terminating punctuation for sentences.
    pub name: String,
    /// Byte offset of the first byte.
    pub start: usize,
    /// Byte offset one past the last byte.
    pub end: usize,
    /// Record that was innermost-open when this one was created.
    pub parent: Option<RecordRef>,
    /// 1-based position among the parent's children of the same type.
    pub ordinal: u32,
    /// Nesting level for divisions (1 = outermost); 0 for other types.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub level: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

fn is_zero(level: &u8) -> bool {
    *level == 0
}

impl Record {
    /// Reference to this record.
    pub fn reference(&self) -> RecordRef {
        RecordRef {
            object_type: self.object_type,
            id: self.id,
        }
    }

    /// Byte range covered by the record.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    /// Metadata value for `field`, if extracted.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).map(String::as_str)
    }
}

/// Highest id issued per object type.
///
/// Used by the index build stage to size its id encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxIds([u32; ObjectType::COUNT]);

impl MaxIds {
    pub fn new(ids: [u32; ObjectType::COUNT]) -> Self {
        Self(ids)
    }

    pub fn get(&self, object_type: ObjectType) -> u32 {
        self.0[object_type.index()]
    }

    /// Raise the entry for `object_type` to at least `id`.
    pub fn observe(&mut self, object_type: ObjectType, id: u32) {
        let slot = &mut self.0[object_type.index()];
        *slot = (*slot).max(id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectType, u32)> + '_ {
        ObjectType::ALL.iter().map(|&t| (t, self.get(t)))
    }
}

impl fmt::Display for MaxIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (ty, id) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{ty}={id}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_names_roundtrip() {
        for ty in ObjectType::ALL {
            assert_eq!(ty.as_str().parse::<ObjectType>(), Ok(ty));
        }
        assert_eq!("paragraph".parse::<ObjectType>(), Ok(ObjectType::Paragraph));
        assert!("chapter".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_object_type_serde_aliases() {
        let ty: ObjectType = serde_json::from_str("\"div\"").unwrap();
        assert_eq!(ty, ObjectType::Division);
        let ty: ObjectType = serde_json::from_str("\"sentence\"").unwrap();
        assert_eq!(ty, ObjectType::Sentence);
        assert_eq!(serde_json::to_string(&ObjectType::Page).unwrap(), "\"page\"");
    }

    #[test]
    fn test_max_ids_observe_keeps_maximum() {
        let mut max = MaxIds::default();
        max.observe(ObjectType::Word, 7);
        max.observe(ObjectType::Word, 3);
        max.observe(ObjectType::Page, 1);
        assert_eq!(max.get(ObjectType::Word), 7);
        assert_eq!(max.get(ObjectType::Page), 1);
        assert_eq!(max.get(ObjectType::Document), 0);
        assert_eq!(max.to_string(), "doc=0 div=0 para=0 sent=0 word=7 page=1");
    }

    #[test]
    fn test_record_serializes_without_empty_fields() {
        let record = Record {
            object_type: ObjectType::Word,
            doc_id: 1,
            id: 2,
            name: "hello".into(),
            start: 10,
            end: 15,
            parent: Some(RecordRef {
                object_type: ObjectType::Sentence,
                id: 1,
            }),
            ordinal: 2,
            level: 0,
            metadata: BTreeMap::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("metadata"));
        assert!(!json.contains("level"));
        assert!(json.contains("\"parent\":{\"type\":\"sentence\",\"id\":1}"));
    }
}
