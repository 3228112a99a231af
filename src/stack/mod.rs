//! The hierarchy stack.
//!
//! Holds the currently open records in strict nesting order and turns
//! `push`/`pull` operations into closed [`Record`]s. Closed records are
//! queued until the driver drains them into its sink, once per event.
//!
//! Every nesting record has a rank:
//!
//! ```text
//! document = 0 < division(1..=d) < paragraph < sentence < word
//! ```
//!
//! Opening a record first closes every open record of equal or finer rank,
//! so ranks strictly increase from the bottom of the stack to the top and
//! records close in reverse creation order. Pages sit beside the stack:
//! opening one closes the previous page, and the open page closes with the
//! document.
//!
//! Closing a record closes everything above it first. Sentences closed
//! this way end at the end of their last word rather than at the enclosing
//! closure; other records end at the closure offset and are logged.

use std::collections::BTreeMap;

use crate::error::StackError;
use crate::extract::Bindings;
use crate::model::{MaxIds, ObjectType, Record, RecordRef};
use crate::tree::{ElementId, ElementNode, ElementTree};

const LOG_TARGET: &str = "ohco::stack";

/// Deepest division level unless configured otherwise.
pub const DEFAULT_MAX_DIVISION_DEPTH: u8 = 3;

/// Why a record was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closure {
    /// Matching end tag, terminator punctuation, or word token end.
    Normal,
    /// A new record of equal or coarser rank opened.
    Superseded,
    /// An enclosing record closed.
    Enclosing,
    /// Still open when the document ended.
    EndOfDocument,
}

/// A record that has been opened but not yet closed.
#[derive(Debug)]
pub struct OpenRecord {
    record: Record,
    rank: u16,
    element: Option<ElementId>,
    bindings: Bindings,
    child_counts: [u32; ObjectType::COUNT],
    /// End of the last closed child, if any.
    content_end: Option<usize>,
}

impl OpenRecord {
    pub fn object_type(&self) -> ObjectType {
        self.record.object_type
    }

    pub fn reference(&self) -> RecordRef {
        self.record.reference()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn element(&self) -> Option<ElementId> {
        self.element
    }

    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.record.metadata
    }

    /// Tie the record to the element that opened it and hand it the
    /// extraction bindings it owns until it closes.
    pub fn attach(&mut self, element: ElementId, bindings: Bindings) {
        self.element = Some(element);
        self.bindings = bindings;
    }

    pub fn on_start(&mut self, tree: &ElementTree, path: &[&ElementNode]) {
        if !self.bindings.is_empty() {
            self.bindings.on_start(tree, path, &mut self.record.metadata);
        }
    }

    pub fn on_text(&mut self, content: &str) {
        self.bindings.on_text(content);
    }

    pub fn on_end(&mut self, element: ElementId) {
        self.bindings.on_end(element, &mut self.record.metadata);
    }
}

/// Open records of one document.
#[derive(Debug)]
pub struct HierarchyStack {
    doc_id: u32,
    max_division_depth: u8,
    frames: Vec<OpenRecord>,
    page: Option<OpenRecord>,
    next_ids: [u32; ObjectType::COUNT],
    root_counts: [u32; ObjectType::COUNT],
    closed: Vec<Record>,
}

impl HierarchyStack {
    pub fn new(doc_id: u32) -> Self {
        Self::with_max_division_depth(doc_id, DEFAULT_MAX_DIVISION_DEPTH)
    }

    pub fn with_max_division_depth(doc_id: u32, max_division_depth: u8) -> Self {
        Self {
            doc_id,
            max_division_depth: max_division_depth.max(1),
            frames: Vec::new(),
            page: None,
            next_ids: [0; ObjectType::COUNT],
            root_counts: [0; ObjectType::COUNT],
            closed: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Push / pull
    // ------------------------------------------------------------------

    /// Open a record of `object_type` starting at `offset`.
    ///
    /// Fails only when a document is pushed while another record is open.
    pub fn push(
        &mut self,
        object_type: ObjectType,
        name: impl Into<String>,
        offset: usize,
    ) -> Result<&mut OpenRecord, StackError> {
        match object_type {
            ObjectType::Page => Ok(self.open_page(name.into(), offset)),
            ObjectType::Document if !self.frames.is_empty() => Err(StackError::NestedDocument),
            _ => Ok(self.open_frame(object_type, name.into(), offset)),
        }
    }

    /// Close the innermost open record of `object_type` at `offset`,
    /// closing any records above it first.
    pub fn pull(&mut self, object_type: ObjectType, offset: usize) -> Result<(), StackError> {
        if object_type == ObjectType::Page {
            return match self.page.take() {
                Some(page) => {
                    self.finish(page, offset, Closure::Normal);
                    Ok(())
                }
                None => Err(StackError::NotOpen(ObjectType::Page)),
            };
        }
        let index = self
            .frames
            .iter()
            .rposition(|f| f.object_type() == object_type)
            .ok_or(StackError::NotOpen(object_type))?;
        self.close_from(index, offset);
        Ok(())
    }

    /// Close the record opened by `element`, closing any records above it
    /// first.
    pub fn pull_element(
        &mut self,
        object_type: ObjectType,
        element: ElementId,
        offset: usize,
    ) -> Result<(), StackError> {
        let index = self
            .frames
            .iter()
            .rposition(|f| f.element == Some(element))
            .ok_or(StackError::NotOpen(object_type))?;
        self.close_from(index, offset);
        Ok(())
    }

    /// Close everything still open, innermost first. Returns the number of
    /// nesting records that had to be forced.
    pub fn force_close_all(&mut self, offset: usize) -> usize {
        let mut forced = 0;
        while let Some(frame) = self.frames.pop() {
            if frame.object_type() != ObjectType::Sentence {
                forced += 1;
            }
            self.finish(frame, offset, Closure::EndOfDocument);
        }
        if let Some(page) = self.page.take() {
            log::debug!(target: LOG_TARGET, "page {} closed at end of input ({offset})", page.record.id);
            self.finish(page, offset, Closure::Normal);
        }
        forced
    }

    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------

    /// Record a word spanning `start..end`, opening a sentence first if
    /// none is open.
    pub fn push_word(&mut self, name: String, start: usize, end: usize) {
        if self.top_type() != Some(ObjectType::Sentence) {
            self.open_frame(ObjectType::Sentence, String::new(), start);
        }
        self.open_frame(ObjectType::Word, name, start);
        if let Some(word) = self.frames.pop() {
            self.finish(word, end, Closure::Normal);
        }
    }

    /// Close the open sentence with terminator `punct` spanning
    /// `start..end`. A terminator with no open sentence forms a sentence
    /// of its own.
    pub fn end_sentence(&mut self, punct: &str, start: usize, end: usize) {
        if self.top_type() != Some(ObjectType::Sentence) {
            self.open_frame(ObjectType::Sentence, String::new(), start);
        }
        if let Some(mut sentence) = self.frames.pop() {
            sentence.record.name = punct.to_string();
            self.finish(sentence, end, Closure::Normal);
        }
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    pub fn top(&self) -> Option<&OpenRecord> {
        self.frames.last()
    }

    pub fn top_type(&self) -> Option<ObjectType> {
        self.top().map(OpenRecord::object_type)
    }

    /// Number of open nesting records.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_open(&self, object_type: ObjectType) -> bool {
        if object_type == ObjectType::Page {
            return self.page.is_some();
        }
        self.frames.iter().any(|f| f.object_type() == object_type)
    }

    /// Every open record, bottom of the stack first, then the open page.
    pub fn open_records_mut(&mut self) -> impl Iterator<Item = &mut OpenRecord> {
        self.frames.iter_mut().chain(self.page.iter_mut())
    }

    /// Take the records closed since the last call, in closing order.
    pub fn drain_closed(&mut self) -> std::vec::Drain<'_, Record> {
        self.closed.drain(..)
    }

    /// Highest id issued so far, per type.
    pub fn max_ids(&self) -> MaxIds {
        MaxIds::new(self.next_ids)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn rank(&self, object_type: ObjectType, level: u8) -> u16 {
        let d = u16::from(self.max_division_depth);
        match object_type {
            ObjectType::Document => 0,
            ObjectType::Division => u16::from(level),
            ObjectType::Paragraph => d + 1,
            ObjectType::Sentence => d + 2,
            ObjectType::Word | ObjectType::Page => d + 3,
        }
    }

    fn open_frame(&mut self, object_type: ObjectType, name: String, offset: usize) -> &mut OpenRecord {
        let level = if object_type == ObjectType::Division {
            let open_divisions = self
                .frames
                .iter()
                .filter(|f| f.object_type() == ObjectType::Division)
                .count();
            (open_divisions as u8).saturating_add(1).min(self.max_division_depth)
        } else {
            0
        };
        let rank = self.rank(object_type, level);

        while self.frames.last().is_some_and(|f| f.rank >= rank) {
            if let Some(frame) = self.frames.pop() {
                self.finish(frame, offset, Closure::Superseded);
            }
        }

        let record = self.new_record(object_type, name, offset, level);
        self.frames.push(OpenRecord {
            record,
            rank,
            element: None,
            bindings: Bindings::default(),
            child_counts: [0; ObjectType::COUNT],
            content_end: None,
        });
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn open_page(&mut self, name: String, offset: usize) -> &mut OpenRecord {
        if let Some(previous) = self.page.take() {
            self.finish(previous, offset, Closure::Normal);
        }
        let record = self.new_record(ObjectType::Page, name, offset, 0);
        let rank = self.rank(ObjectType::Page, 0);
        self.page.insert(OpenRecord {
            record,
            rank,
            element: None,
            bindings: Bindings::default(),
            child_counts: [0; ObjectType::COUNT],
            content_end: None,
        })
    }

    fn new_record(&mut self, object_type: ObjectType, name: String, offset: usize, level: u8) -> Record {
        let slot = &mut self.next_ids[object_type.index()];
        *slot += 1;
        let id = *slot;

        let (parent, counts) = match self.frames.last_mut() {
            Some(parent) => (Some(parent.reference()), &mut parent.child_counts),
            None => (None, &mut self.root_counts),
        };
        counts[object_type.index()] += 1;

        Record {
            object_type,
            doc_id: self.doc_id,
            id,
            name,
            start: offset,
            end: offset,
            parent,
            ordinal: counts[object_type.index()],
            level,
            metadata: BTreeMap::new(),
        }
    }

    fn close_from(&mut self, index: usize, offset: usize) {
        while self.frames.len() > index + 1 {
            if let Some(frame) = self.frames.pop() {
                self.finish(frame, offset, Closure::Enclosing);
            }
        }
        if let Some(frame) = self.frames.pop() {
            self.finish(frame, offset, Closure::Normal);
        }
    }

    fn finish(&mut self, frame: OpenRecord, offset: usize, closure: Closure) {
        let OpenRecord {
            mut record,
            content_end,
            ..
        } = frame;

        record.end = match (record.object_type, closure) {
            (ObjectType::Sentence, Closure::Normal) => offset,
            (ObjectType::Sentence, _) => content_end.unwrap_or(offset),
            _ => offset,
        }
        .max(record.start);

        match (record.object_type, closure) {
            (_, Closure::Normal) => {}
            (ObjectType::Sentence, _) => log::debug!(
                target: LOG_TARGET,
                "sentence {} closed without terminator at {}",
                record.id,
                record.end
            ),
            (_, Closure::Superseded) => log::debug!(
                target: LOG_TARGET,
                "{} {} superseded at {offset}",
                record.object_type,
                record.id
            ),
            (_, Closure::Enclosing) => log::warn!(
                target: LOG_TARGET,
                "{} {} ({}) force-closed by enclosing closure at {offset}",
                record.object_type,
                record.id,
                record.name
            ),
            (_, Closure::EndOfDocument) => log::warn!(
                target: LOG_TARGET,
                "{} {} ({}) unclosed at end of document, extent {}..{offset}",
                record.object_type,
                record.id,
                record.name,
                record.start
            ),
        }

        if record.object_type == ObjectType::Document
            && let Some(page) = self.page.take()
        {
            self.finish(page, record.end, Closure::Normal);
        }

        if record.object_type.is_nesting()
            && let Some(parent) = self.frames.last_mut()
        {
            parent.content_end = Some(parent.content_end.map_or(record.end, |e| e.max(record.end)));
        }

        self.closed.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(stack: &mut HierarchyStack) -> Vec<Record> {
        stack.drain_closed().collect()
    }

    fn find(records: &[Record], ty: ObjectType, id: u32) -> &Record {
        records
            .iter()
            .find(|r| r.object_type == ty && r.id == id)
            .unwrap()
    }

    #[test]
    fn test_push_pull_nesting() {
        let mut stack = HierarchyStack::new(1);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        stack.push(ObjectType::Division, "div", 5).unwrap();
        stack.push(ObjectType::Paragraph, "p", 10).unwrap();
        stack.pull(ObjectType::Paragraph, 20).unwrap();
        stack.pull(ObjectType::Division, 26).unwrap();
        stack.pull(ObjectType::Document, 32).unwrap();

        let records = drain(&mut stack);
        let order: Vec<_> = records.iter().map(|r| r.object_type).collect();
        assert_eq!(
            order,
            vec![ObjectType::Paragraph, ObjectType::Division, ObjectType::Document]
        );
        let para = &records[0];
        assert_eq!(para.range(), 10..20);
        assert_eq!(
            para.parent,
            Some(RecordRef {
                object_type: ObjectType::Division,
                id: 1
            })
        );
        assert_eq!(records[2].parent, None);
        assert_eq!(records[1].level, 1);
    }

    #[test]
    fn test_pull_without_open_record_is_an_error() {
        let mut stack = HierarchyStack::new(1);
        assert_eq!(
            stack.pull(ObjectType::Paragraph, 0),
            Err(StackError::NotOpen(ObjectType::Paragraph))
        );
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        assert_eq!(
            stack.pull(ObjectType::Page, 3),
            Err(StackError::NotOpen(ObjectType::Page))
        );
    }

    #[test]
    fn test_nested_document_is_rejected() {
        let mut stack = HierarchyStack::new(1);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        assert!(matches!(
            stack.push(ObjectType::Document, "TEI", 4),
            Err(StackError::NestedDocument)
        ));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_words_open_sentences() {
        let mut stack = HierarchyStack::new(1);
        stack.push(ObjectType::Paragraph, "p", 0).unwrap();
        stack.push_word("hello".into(), 3, 8);
        stack.push_word("world".into(), 9, 14);
        stack.end_sentence(".", 14, 15);
        stack.push_word("bye".into(), 16, 19);
        stack.end_sentence("!", 19, 20);
        stack.pull(ObjectType::Paragraph, 24).unwrap();

        let records = drain(&mut stack);
        let sentences: Vec<_> = records
            .iter()
            .filter(|r| r.object_type == ObjectType::Sentence)
            .collect();
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].range(), 3..15);
        assert_eq!(sentences[0].name, ".");
        assert_eq!(sentences[1].range(), 16..20);

        let word = find(&records, ObjectType::Word, 2);
        assert_eq!(word.range(), 9..14);
        assert_eq!(word.ordinal, 2);
        assert_eq!(
            word.parent,
            Some(RecordRef {
                object_type: ObjectType::Sentence,
                id: 1
            })
        );
        assert_eq!(find(&records, ObjectType::Word, 3).ordinal, 1);
    }

    #[test]
    fn test_enclosing_closure_ends_sentence_at_last_word() {
        let mut stack = HierarchyStack::new(1);
        stack.push(ObjectType::Paragraph, "p", 0).unwrap();
        stack.push_word("no".into(), 3, 5);
        stack.push_word("stop".into(), 6, 10);
        stack.pull(ObjectType::Paragraph, 16).unwrap();

        let records = drain(&mut stack);
        let sentence = find(&records, ObjectType::Sentence, 1);
        assert_eq!(sentence.range(), 3..10);
        assert_eq!(sentence.name, "");
        assert_eq!(find(&records, ObjectType::Paragraph, 1).range(), 0..16);
    }

    #[test]
    fn test_new_paragraph_supersedes_open_one() {
        let mut stack = HierarchyStack::new(1);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        stack.push(ObjectType::Paragraph, "sp", 5).unwrap();
        stack.push_word("hamlet".into(), 14, 20);
        stack.push(ObjectType::Paragraph, "p", 30).unwrap();

        let records = drain(&mut stack);
        let sp = find(&records, ObjectType::Paragraph, 1);
        assert_eq!(sp.range(), 5..30);
        assert_eq!(find(&records, ObjectType::Sentence, 1).range(), 14..20);
        assert_eq!(stack.top().unwrap().record().name, "p");
        assert_eq!(
            stack.top().unwrap().record().parent,
            Some(RecordRef {
                object_type: ObjectType::Document,
                id: 1
            })
        );
    }

    #[test]
    fn test_division_levels_are_capped() {
        let mut stack = HierarchyStack::with_max_division_depth(1, 2);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        assert_eq!(stack.push(ObjectType::Division, "div", 1).unwrap().record().level, 1);
        assert_eq!(stack.push(ObjectType::Division, "div", 2).unwrap().record().level, 2);
        // Too deep: closes the level-2 division and takes its place.
        let third = stack.push(ObjectType::Division, "div", 3).unwrap();
        assert_eq!(third.record().level, 2);
        assert_eq!(
            third.record().parent,
            Some(RecordRef {
                object_type: ObjectType::Division,
                id: 1
            })
        );
        assert_eq!(drain(&mut stack).len(), 1);
    }

    #[test]
    fn test_deepest_division_limit_keeps_ranks_ordered() {
        let mut stack = HierarchyStack::with_max_division_depth(1, u8::MAX);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        stack.push(ObjectType::Division, "div", 5).unwrap();
        stack.push(ObjectType::Paragraph, "p", 10).unwrap();
        stack.push_word("hi".into(), 13, 15);
        stack.end_sentence(".", 15, 16);
        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.top_type(), Some(ObjectType::Paragraph));

        stack.push(ObjectType::Paragraph, "p", 20).unwrap();
        let records = drain(&mut stack);
        let first = find(&records, ObjectType::Paragraph, 1);
        assert_eq!(first.range(), 10..20);
        assert_eq!(first.parent.map(|p| p.object_type), Some(ObjectType::Division));
    }

    #[test]
    fn test_pages_run_until_next_page() {
        let mut stack = HierarchyStack::new(1);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        stack.push(ObjectType::Page, "pb", 5).unwrap();
        stack.push(ObjectType::Paragraph, "p", 12).unwrap();
        stack.push(ObjectType::Page, "pb", 20).unwrap();
        stack.pull(ObjectType::Paragraph, 30).unwrap();
        stack.pull(ObjectType::Document, 40).unwrap();

        let records = drain(&mut stack);
        let first = find(&records, ObjectType::Page, 1);
        let second = find(&records, ObjectType::Page, 2);
        assert_eq!(first.range(), 5..20);
        assert_eq!(second.range(), 20..40);
        assert_eq!(
            second.parent,
            Some(RecordRef {
                object_type: ObjectType::Paragraph,
                id: 1
            })
        );
        assert!(!stack.is_open(ObjectType::Page));
    }

    #[test]
    fn test_force_close_all() {
        let mut stack = HierarchyStack::new(1);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        stack.push(ObjectType::Division, "div", 5).unwrap();
        stack.push_word("dangling".into(), 10, 18);
        assert_eq!(stack.force_close_all(25), 2);

        let records = drain(&mut stack);
        let order: Vec<_> = records.iter().map(|r| r.object_type).collect();
        assert_eq!(
            order,
            vec![
                ObjectType::Word,
                ObjectType::Sentence,
                ObjectType::Division,
                ObjectType::Document
            ]
        );
        assert_eq!(records[1].range(), 10..18);
        assert_eq!(records[2].range(), 5..25);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_ids_are_type_scoped() {
        let mut stack = HierarchyStack::new(7);
        stack.push(ObjectType::Document, "TEI", 0).unwrap();
        for i in 0..3 {
            stack.push(ObjectType::Paragraph, "p", i * 10).unwrap();
            stack.push_word("w".into(), i * 10 + 3, i * 10 + 4);
        }
        stack.force_close_all(40);
        let max = stack.max_ids();
        assert_eq!(max.get(ObjectType::Document), 1);
        assert_eq!(max.get(ObjectType::Paragraph), 3);
        assert_eq!(max.get(ObjectType::Sentence), 3);
        assert_eq!(max.get(ObjectType::Word), 3);
        assert!(drain(&mut stack).iter().all(|r| r.doc_id == 7));
    }
}
