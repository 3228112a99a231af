//! The parse driver.
//!
//! [`Parser`] consumes one document's events and turns them into closed
//! records on a [`RecordSink`]:
//!
//! - a start tag opens an element, and if a classification rule matches,
//!   a record whose extraction bindings are installed from the
//!   configuration;
//! - text feeds every live binding, then is tokenized into words and
//!   sentence terminators;
//! - an end tag closes the element and the record it opened.
//!
//! Malformed nesting never aborts a parse. An end tag naming an open
//! ancestor closes everything inside it first (at the end tag's start
//! offset); an end tag naming nothing open pops the innermost element.
//! Only unreadable input and sink I/O failures are errors.
//!
//! ```
//! use ohco::{ObjectType, Parser, ParserConfig, Record};
//!
//! let config = ParserConfig::default();
//! let parser = Parser::new(&config, 1, Vec::<Record>::new());
//! let (max_ids, records) = parser.parse(b"<TEI><p>Hello world. Bye!</p></TEI>")?;
//! assert_eq!(max_ids.get(ObjectType::Word), 3);
//! assert_eq!(max_ids.get(ObjectType::Sentence), 2);
//! assert_eq!(records.len(), 7);
//! # Ok::<(), ohco::Error>(())
//! ```

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::config::ParserConfig;
use crate::error::Result;
use crate::event::{Attributes, Event, EventSource, XmlEventSource};
use crate::extract::Bindings;
use crate::model::{MaxIds, ObjectType};
use crate::sink::RecordSink;
use crate::stack::HierarchyStack;
use crate::tokenize::TokenKind;
use crate::tree::ElementTree;
use crate::util::normalize_encoding;

const LOG_TARGET: &str = "ohco::parser";

/// Streaming parser for a single document.
pub struct Parser<'c, S: RecordSink> {
    config: &'c ParserConfig,
    sink: S,
    tree: ElementTree,
    stack: HierarchyStack,
    known_metadata: BTreeMap<String, String>,
    /// End offset of the last event seen.
    position: usize,
}

impl<'c, S: RecordSink> Parser<'c, S> {
    pub fn new(config: &'c ParserConfig, doc_id: u32, sink: S) -> Self {
        Self {
            config,
            sink,
            tree: ElementTree::new(),
            stack: HierarchyStack::with_max_division_depth(doc_id, config.max_division_depth),
            known_metadata: BTreeMap::new(),
            position: 0,
        }
    }

    /// Metadata copied into the document record when it opens, e.g. the
    /// source filename.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.known_metadata = metadata;
        self
    }

    /// Parse a complete document held in memory.
    ///
    /// Non-UTF-8 input is transcoded first; offsets then refer to the
    /// transcoded bytes.
    pub fn parse(mut self, bytes: &[u8]) -> Result<(MaxIds, S)> {
        let normalized = normalize_encoding(bytes);
        self.run(XmlEventSource::from_bytes(&normalized)?)?;
        self.close()
    }

    /// Parse UTF-8 input incrementally from a buffered reader.
    pub fn parse_reader<R: BufRead>(mut self, reader: R) -> Result<(MaxIds, S)> {
        self.run(XmlEventSource::new(reader)?)?;
        self.close()
    }

    /// Feed every event of `source`.
    pub fn run<E: EventSource>(&mut self, mut source: E) -> Result<()> {
        while let Some(event) = source.next_event()? {
            self.feed(event)?;
        }
        Ok(())
    }

    /// Consume a single event.
    pub fn feed(&mut self, event: Event) -> Result<()> {
        log::trace!(target: LOG_TARGET, "{event:?}");
        self.position = self.position.max(event.end_offset());
        match event {
            Event::Start {
                name,
                attributes,
                offset,
                ..
            } => self.start(name, attributes, offset),
            Event::Text { content, offset } => self.text(&content, offset),
            Event::End { name, offset, len } => self.end(&name, offset, offset + len),
        }
        self.flush()
    }

    /// Finish the document: force-close whatever is still open at the last
    /// offset seen and hand back the per-type maximum ids and the sink.
    pub fn close(mut self) -> Result<(MaxIds, S)> {
        if self.tree.depth() > 0 {
            log::warn!(
                target: LOG_TARGET,
                "{} element(s) unclosed at end of document ({})",
                self.tree.depth(),
                self.position
            );
        }
        let forced = self.stack.force_close_all(self.position);
        if forced > 0 {
            log::warn!(target: LOG_TARGET, "force-closed {forced} record(s) at end of document");
        }
        self.flush()?;
        self.sink.flush()?;
        Ok((self.stack.max_ids(), self.sink))
    }

    /// Highest ids issued so far.
    pub fn max_ids(&self) -> MaxIds {
        self.stack.max_ids()
    }

    fn start(&mut self, name: String, attributes: Attributes, offset: usize) {
        let element = self.tree.open(name, attributes);
        let depth = self.tree.depth() - 1;

        let object_type = {
            let path = self.tree.path();
            self.config.classifier.classify(&path)
        };

        if let Some(object_type) = object_type {
            let name = self
                .tree
                .get(element)
                .map(|node| node.name.clone())
                .unwrap_or_default();
            match self.stack.push(object_type, name, offset) {
                Ok(open) => {
                    let rules = self.config.metadata.get(object_type);
                    open.attach(element, Bindings::install(rules, element, depth));
                    if object_type == ObjectType::Document {
                        open.metadata_mut().extend(
                            self.known_metadata
                                .iter()
                                .map(|(k, v)| (k.clone(), v.clone())),
                        );
                    }
                    if let Some(node) = self.tree.get_mut(element) {
                        node.record = Some(object_type);
                    }
                }
                Err(e) => log::warn!(target: LOG_TARGET, "rejected {object_type} at {offset}: {e}"),
            }
        }

        let Self { tree, stack, .. } = self;
        let path = tree.path();
        for open in stack.open_records_mut() {
            open.on_start(tree, &path);
        }
    }

    fn text(&mut self, content: &str, offset: usize) {
        for open in self.stack.open_records_mut() {
            open.on_text(content);
        }
        if self.stack.depth() == 0 {
            return;
        }
        for token in self.config.tokenizer.tokens(content, offset) {
            match token.kind {
                TokenKind::Word => self.stack.push_word(token.folded(), token.start, token.end),
                TokenKind::Terminator => self.stack.end_sentence(token.text, token.start, token.end),
            }
        }
    }

    fn end(&mut self, name: &str, offset: usize, end: usize) {
        let Some(top) = self.tree.depth().checked_sub(1) else {
            log::warn!(target: LOG_TARGET, "stray end tag </{name}> at {offset} ignored");
            return;
        };
        match self.tree.find_open(name) {
            Some(depth) if depth == top => self.close_element(end),
            Some(depth) => {
                log::warn!(
                    target: LOG_TARGET,
                    "end tag </{name}> at {offset} closes {} unclosed element(s)",
                    top - depth
                );
                while self.tree.depth() > depth + 1 {
                    self.close_element(offset);
                }
                self.close_element(end);
            }
            None => {
                log::warn!(
                    target: LOG_TARGET,
                    "end tag </{name}> at {offset} matches no open element; closing innermost"
                );
                self.close_element(end);
            }
        }
    }

    fn close_element(&mut self, at: usize) {
        let Some((element, node)) = self.tree.close() else {
            return;
        };
        for open in self.stack.open_records_mut() {
            open.on_end(element);
        }
        match node.record {
            None | Some(ObjectType::Page) => {}
            Some(object_type) => {
                if let Err(e) = self.stack.pull_element(object_type, element, at) {
                    log::debug!(
                        target: LOG_TARGET,
                        "</{}> at {at}: {e} (already superseded)",
                        node.name
                    );
                }
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        for record in self.stack.drain_closed() {
            self.sink.emit(&record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Record, RecordRef};

    fn parse(xml: &str) -> (MaxIds, Vec<Record>) {
        let config = ParserConfig::default();
        Parser::new(&config, 1, Vec::new())
            .parse(xml.as_bytes())
            .unwrap()
    }

    fn of_type(records: &[Record], ty: ObjectType) -> Vec<&Record> {
        let mut found: Vec<_> = records.iter().filter(|r| r.object_type == ty).collect();
        found.sort_by_key(|r| r.id);
        found
    }

    #[test]
    fn test_sentences_and_words() {
        let xml = "<TEI><text><p>Hello world. Bye!</p></text></TEI>";
        let (max, records) = parse(xml);
        assert_eq!(max.get(ObjectType::Sentence), 2);
        assert_eq!(max.get(ObjectType::Word), 3);

        let words = of_type(&records, ObjectType::Word);
        let names: Vec<_> = words.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["hello", "world", "bye"]);
        for word in &words {
            assert_eq!(xml[word.range()].to_lowercase(), word.name);
        }

        let sentences = of_type(&records, ObjectType::Sentence);
        assert_eq!(&xml[sentences[0].range()], "Hello world.");
        assert_eq!(&xml[sentences[1].range()], "Bye!");
        assert_eq!(sentences[1].name, "!");

        let para = of_type(&records, ObjectType::Paragraph)[0];
        assert_eq!(&xml[para.range()], "<p>Hello world. Bye!</p>");
        assert_eq!(
            sentences[0].parent,
            Some(RecordRef {
                object_type: ObjectType::Paragraph,
                id: 1
            })
        );
    }

    #[test]
    fn test_records_close_innermost_first() {
        let (_, records) = parse("<TEI><div><p>One.</p></div></TEI>");
        let order: Vec<_> = records.iter().map(|r| r.object_type).collect();
        assert_eq!(
            order,
            vec![
                ObjectType::Word,
                ObjectType::Sentence,
                ObjectType::Paragraph,
                ObjectType::Division,
                ObjectType::Document
            ]
        );
    }

    #[test]
    fn test_tei_metadata() {
        let xml = r#"<TEI xml:id="d1"><teiHeader><fileDesc><titleStmt><title>Hamlet</title><author>Shakespeare,
            William</author></titleStmt></fileDesc></teiHeader><text><body><div1 n="1"><head>Act I</head><sp><speaker>Bernardo</speaker><l>Who's there?</l></sp></div1></body></text></TEI>"#;
        let (_, records) = parse(xml);

        let doc = of_type(&records, ObjectType::Document)[0];
        assert_eq!(doc.get("title"), Some("Hamlet"));
        assert_eq!(doc.get("author"), Some("Shakespeare, William"));
        assert_eq!(doc.get("id"), Some("d1"));
        assert_eq!(doc.get("date"), None);

        let div = of_type(&records, ObjectType::Division)[0];
        assert_eq!(div.name, "div1");
        assert_eq!(div.get("n"), Some("1"));
        assert_eq!(div.get("head"), Some("Act I"));

        let sp = of_type(&records, ObjectType::Paragraph)[0];
        assert_eq!(sp.get("who"), Some("Bernardo"));
    }

    #[test]
    fn test_known_metadata() {
        let config = ParserConfig::default();
        let mut known = BTreeMap::new();
        known.insert("filename".to_string(), "hamlet.xml".to_string());
        let (_, records) = Parser::new(&config, 4, Vec::new())
            .with_metadata(known)
            .parse(b"<TEI><p>x</p></TEI>")
            .unwrap();
        let doc = of_type(&records, ObjectType::Document)[0];
        assert_eq!(doc.get("filename"), Some("hamlet.xml"));
        assert!(records.iter().all(|r| r.doc_id == 4));
    }

    #[test]
    fn test_end_tag_for_ancestor_unwinds() {
        let xml = "<TEI><div><p>one</div><p>two</p></TEI>";
        let (_, records) = parse(xml);
        let paras = of_type(&records, ObjectType::Paragraph);
        assert_eq!(paras[0].range(), 10..16);
        assert_eq!(paras[1].range(), 22..32);
        assert_eq!(of_type(&records, ObjectType::Division)[0].range(), 5..22);
        assert_eq!(of_type(&records, ObjectType::Document)[0].range(), 0..38);
        assert_eq!(of_type(&records, ObjectType::Sentence)[0].range(), 13..16);
    }

    #[test]
    fn test_unmatched_end_tag_pops_innermost() {
        let xml = "<TEI><div><p>a</q></div></TEI>";
        let (_, records) = parse(xml);
        let para = of_type(&records, ObjectType::Paragraph)[0];
        assert_eq!(&xml[para.range()], "<p>a</q>");
        let div = of_type(&records, ObjectType::Division)[0];
        assert_eq!(&xml[div.range()], "<div><p>a</q></div>");
    }

    #[test]
    fn test_stray_end_tag_after_root_is_ignored() {
        let (max, records) = parse("<TEI><p>a</p></TEI></p>");
        assert_eq!(max.get(ObjectType::Document), 1);
        assert_eq!(of_type(&records, ObjectType::Document)[0].range(), 0..19);
    }

    #[test]
    fn test_unclosed_elements_close_at_end_of_input() {
        let xml = "<TEI><div><p>Never closed";
        let (_, records) = parse(xml);
        assert_eq!(records.len(), 6);
        for ty in [ObjectType::Document, ObjectType::Division, ObjectType::Paragraph] {
            assert_eq!(of_type(&records, ty)[0].end, xml.len());
        }
        assert_eq!(&xml[of_type(&records, ObjectType::Sentence)[0].range()], "Never closed");
    }

    #[test]
    fn test_paragraph_inside_speech_supersedes_it() {
        let xml = "<TEI><sp><speaker>Ham</speaker><p>To be.</p></sp></TEI>";
        let (_, records) = parse(xml);
        let paras = of_type(&records, ObjectType::Paragraph);
        assert_eq!(paras.len(), 2);
        assert_eq!(&xml[paras[0].range()], "<sp><speaker>Ham</speaker>");
        assert_eq!(paras[0].get("who"), Some("Ham"));
        assert_eq!(&xml[paras[1].range()], "<p>To be.</p>");
        assert_eq!(
            paras[1].parent,
            Some(RecordRef {
                object_type: ObjectType::Document,
                id: 1
            })
        );
    }

    #[test]
    fn test_pages() {
        let xml = r#"<TEI><pb n="1" src="p1.png"/><p>a</p><pb n="2"/><p>b</p></TEI>"#;
        let (_, records) = parse(xml);
        let pages = of_type(&records, ObjectType::Page);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].get("n"), Some("1"));
        assert_eq!(pages[0].get("img"), Some("p1.png"));
        assert_eq!(pages[0].end, pages[1].start);
        assert_eq!(pages[1].end, xml.len());
        assert_eq!(pages[1].get("img"), None);
    }

    #[test]
    fn test_attribute_extraction_is_scoped_to_owner() {
        let config = ParserConfig::default().with_extractor(
            ObjectType::Paragraph,
            crate::extract::ExtractorRule::attribute(".//note@n", "note").unwrap(),
        );
        let xml = r#"<TEI><note n="outer"/><p>a</p><p>b<note n="2"/></p><p>c</p></TEI>"#;
        let (_, records) = Parser::new(&config, 1, Vec::new())
            .parse(xml.as_bytes())
            .unwrap();
        let notes: Vec<_> = of_type(&records, ObjectType::Paragraph)
            .iter()
            .map(|p| p.get("note"))
            .collect();
        assert_eq!(notes, vec![None, Some("2"), None]);
    }

    #[test]
    fn test_text_outside_records_is_not_tokenized() {
        let config = ParserConfig::empty()
            .with_rule(".//p", ObjectType::Paragraph)
            .unwrap();
        let (max, _) = Parser::new(&config, 1, Vec::new())
            .parse(b"<root>loose words<p>kept</p></root>")
            .unwrap();
        assert_eq!(max.get(ObjectType::Word), 1);
    }

    #[test]
    fn test_element_memory_is_bounded_by_depth() {
        let config = ParserConfig::default();
        let mut parser = Parser::new(&config, 1, Vec::new());
        parser.feed(Event::start("TEI", 0, 5)).unwrap();
        for i in 0..1000 {
            // <p><hi>word</hi></p>
            let at = 5 + i * 20;
            parser.feed(Event::start("p", at, 3)).unwrap();
            parser.feed(Event::start("hi", at + 3, 4)).unwrap();
            parser.feed(Event::text("word", at + 7)).unwrap();
            parser.feed(Event::end("hi", at + 11, 5)).unwrap();
            parser.feed(Event::end("p", at + 16, 4)).unwrap();
        }
        assert!(parser.tree.allocated() <= 3);
        let (max, records) = parser.close().unwrap();
        assert_eq!(max.get(ObjectType::Paragraph), 1000);
        // Paragraph, sentence and word per iteration, plus the document.
        assert_eq!(records.len(), 3001);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let xml = "<TEI><div><head>A</head><p>One two. Three</p></div><pb n=\"1\"/></TEI>";
        assert_eq!(parse(xml), parse(xml));
    }
}
