//! Post-processing passes over one document's records.
//!
//! Passes form a closed set. Each one reads a fixed kind of record (see
//! [`PassInput`]) and produces a typed [`PassOutput`] that can be written
//! as tab-separated text. Every sort compares strings by their raw bytes
//! ([`byte_order`]), never by locale.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::model::{MaxIds, ObjectType, Record};
use crate::sink::{RecordSink, TextSink};
use crate::util::byte_order;

/// Which records a pass reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassInput {
    Words,
    NonWords,
    Pages,
    All,
}

impl PassInput {
    pub fn accepts(self, record: &Record) -> bool {
        match self {
            PassInput::Words => record.object_type == ObjectType::Word,
            PassInput::NonWords => record.object_type != ObjectType::Word,
            PassInput::Pages => record.object_type == ObjectType::Page,
            PassInput::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Word -> occurrence count.
    WordFrequencies,
    /// Every word occurrence, sorted by word then id.
    SortedWords,
    /// Every non-word record, sorted by type then id.
    SortedObjects,
    /// Previous and next id of every record within its type.
    PrevNext,
    /// Page id, number and extent.
    Pages,
    /// Highest id per type.
    MaxIds,
}

impl Pass {
    pub const ALL: [Pass; 6] = [
        Pass::WordFrequencies,
        Pass::SortedWords,
        Pass::SortedObjects,
        Pass::PrevNext,
        Pass::Pages,
        Pass::MaxIds,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::WordFrequencies => "word_frequencies",
            Pass::SortedWords => "sorted_words",
            Pass::SortedObjects => "sorted_objects",
            Pass::PrevNext => "prev_next",
            Pass::Pages => "pages",
            Pass::MaxIds => "max_ids",
        }
    }

    pub fn input(self) -> PassInput {
        match self {
            Pass::WordFrequencies | Pass::SortedWords => PassInput::Words,
            Pass::SortedObjects => PassInput::NonWords,
            Pass::Pages => PassInput::Pages,
            Pass::PrevNext | Pass::MaxIds => PassInput::All,
        }
    }

    /// Output file name for document `doc_id`.
    pub fn file_name(self, doc_id: u32) -> String {
        format!("{doc_id}.{}", self.name())
    }

    pub fn run(self, records: &[Record]) -> PassOutput {
        let input = records.iter().filter(|r| self.input().accepts(r));
        match self {
            Pass::WordFrequencies => {
                let mut counts: HashMap<&str, u64> = HashMap::new();
                for word in input {
                    *counts.entry(word.name.as_str()).or_default() += 1;
                }
                let mut rows: Vec<_> = counts
                    .into_iter()
                    .map(|(word, count)| (word.to_string(), count))
                    .collect();
                rows.sort_by(|a, b| byte_order(&a.0, &b.0));
                PassOutput::WordFrequencies(rows)
            }
            Pass::SortedWords => {
                let mut rows: Vec<_> = input
                    .map(|w| WordOccurrence {
                        word: w.name.clone(),
                        id: w.id,
                        start: w.start,
                    })
                    .collect();
                rows.sort_by(|a, b| byte_order(&a.word, &b.word).then(a.id.cmp(&b.id)));
                PassOutput::SortedWords(rows)
            }
            Pass::SortedObjects => {
                let mut rows: Vec<_> = input.cloned().collect();
                rows.sort_by_key(|r| (r.object_type, r.id));
                PassOutput::SortedObjects(rows)
            }
            Pass::PrevNext => {
                let mut ids: Vec<_> = input.map(|r| (r.object_type, r.id)).collect();
                ids.sort_unstable();
                let rows = ids
                    .iter()
                    .enumerate()
                    .map(|(i, &(object_type, id))| {
                        let same = |j: Option<usize>| {
                            j.and_then(|j| ids.get(j))
                                .filter(|(t, _)| *t == object_type)
                                .map(|&(_, id)| id)
                        };
                        PrevNext {
                            object_type,
                            id,
                            prev: same(i.checked_sub(1)),
                            next: same(Some(i + 1)),
                        }
                    })
                    .collect();
                PassOutput::PrevNext(rows)
            }
            Pass::Pages => {
                let mut rows: Vec<_> = input
                    .map(|p| PageExtent {
                        id: p.id,
                        n: p.get("n").map(str::to_string),
                        start: p.start,
                        end: p.end,
                    })
                    .collect();
                rows.sort_by_key(|p| p.id);
                PassOutput::Pages(rows)
            }
            Pass::MaxIds => {
                let mut max = MaxIds::default();
                for record in input {
                    max.observe(record.object_type, record.id);
                }
                PassOutput::MaxIds(max)
            }
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        Pass::ALL
            .into_iter()
            .find(|p| p.name() == normalized)
            .ok_or_else(|| {
                let names: Vec<_> = Pass::ALL.iter().map(|p| p.name()).collect();
                format!("unknown pass {s:?} (expected one of: {})", names.join(", "))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordOccurrence {
    pub word: String,
    pub id: u32,
    pub start: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrevNext {
    pub object_type: ObjectType,
    pub id: u32,
    pub prev: Option<u32>,
    pub next: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtent {
    pub id: u32,
    pub n: Option<String>,
    pub start: usize,
    pub end: usize,
}

/// Result of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutput {
    WordFrequencies(Vec<(String, u64)>),
    SortedWords(Vec<WordOccurrence>),
    SortedObjects(Vec<Record>),
    PrevNext(Vec<PrevNext>),
    Pages(Vec<PageExtent>),
    MaxIds(MaxIds),
}

impl PassOutput {
    /// Write the output as tab-separated lines.
    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        match self {
            PassOutput::WordFrequencies(rows) => {
                for (word, count) in rows {
                    writeln!(w, "{word}\t{count}")?;
                }
            }
            PassOutput::SortedWords(rows) => {
                for row in rows {
                    writeln!(w, "{}\t{}\t{}", row.word, row.id, row.start)?;
                }
            }
            PassOutput::SortedObjects(rows) => {
                let mut sink = TextSink::new(&mut w);
                for record in rows {
                    sink.emit(record)?;
                }
            }
            PassOutput::PrevNext(rows) => {
                for row in rows {
                    writeln!(
                        w,
                        "{}\t{}\t{}\t{}",
                        row.object_type,
                        row.id,
                        Dash(row.prev),
                        Dash(row.next)
                    )?;
                }
            }
            PassOutput::Pages(rows) => {
                for row in rows {
                    writeln!(
                        w,
                        "{}\t{}\t{}\t{}",
                        row.id,
                        row.n.as_deref().unwrap_or("-"),
                        row.start,
                        row.end
                    )?;
                }
            }
            PassOutput::MaxIds(max) => {
                for (object_type, id) in max.iter() {
                    writeln!(w, "{object_type}\t{id}")?;
                }
            }
        }
        w.flush()
    }
}

/// Formats `None` as `-`.
struct Dash(Option<u32>);

impl fmt::Display for Dash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("-"),
        }
    }
}
