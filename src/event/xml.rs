//! `quick-xml` backed event source.

use std::collections::VecDeque;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event as XmlEvent};

use super::{Attributes, Event, EventSource};
use crate::error::{Error, Result};
use crate::util::unescape_lossy;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CDATA_OPEN: usize = "<![CDATA[".len();

/// Streams [`Event`]s out of XML input with exact byte offsets.
///
/// Events tile the input: each one begins where the previous one ended.
/// Markup ends are taken from the reader position, text ends from the raw
/// text length. Character data and entity references that follow each
/// other are delivered as one raw `Text` event, so a word such as
/// `l&apos;homme` reaches the tokenizer in one piece.
///
/// End-name checking is off: mismatched or stray end tags are passed
/// through for the parser to recover from.
pub struct XmlEventSource<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    /// Bytes consumed before the reader saw the input (a UTF-8 BOM).
    base: usize,
    /// End of the last event read.
    position: usize,
    pending: VecDeque<Event>,
    text: Option<(usize, String)>,
    done: bool,
}

impl<'a> XmlEventSource<&'a [u8]> {
    /// Source over an in-memory UTF-8 document.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        Self::new(bytes)
    }
}

impl<R: BufRead> XmlEventSource<R> {
    /// Source over any buffered reader of UTF-8 XML.
    pub fn new(mut inner: R) -> Result<Self> {
        let base = skip_bom(&mut inner)?;

        let mut reader = Reader::from_reader(inner);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.expand_empty_elements = false;

        Ok(Self {
            reader,
            buf: Vec::new(),
            base,
            position: base,
            pending: VecDeque::new(),
            text: None,
            done: false,
        })
    }

    fn markup_end(&self) -> usize {
        self.base + self.reader.buffer_position() as usize
    }

    fn push_text(&mut self, offset: usize, raw: &str) {
        match &mut self.text {
            Some((_, run)) => run.push_str(raw),
            None => self.text = Some((offset, raw.to_owned())),
        }
    }

    fn flush_text(&mut self) {
        if let Some((offset, content)) = self.text.take()
            && !content.is_empty()
        {
            self.pending.push_back(Event::Text { content, offset });
        }
    }

    fn read_one(&mut self) -> Result<()> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let offset = self.position;

        match self.reader.read_event_into(&mut buf)? {
            XmlEvent::Text(e) => {
                let raw = utf8(&e, offset)?;
                self.push_text(offset, raw);
                self.position = offset + raw.len();
            }
            XmlEvent::GeneralRef(e) => {
                let raw = format!("&{};", utf8(&e, offset + 1)?);
                self.push_text(offset, &raw);
                self.position = offset + raw.len();
            }
            XmlEvent::CData(e) => {
                self.flush_text();
                let content = utf8(&e, offset + CDATA_OPEN)?.to_owned();
                if !content.is_empty() {
                    self.pending.push_back(Event::Text {
                        content,
                        offset: offset + CDATA_OPEN,
                    });
                }
                self.position = self.markup_end();
            }
            XmlEvent::Start(e) => {
                self.flush_text();
                let end = self.markup_end();
                let (name, attributes) = start_parts(&e);
                self.pending.push_back(Event::Start {
                    name,
                    attributes,
                    offset,
                    len: end - offset,
                });
                self.position = end;
            }
            XmlEvent::Empty(e) => {
                self.flush_text();
                let end = self.markup_end();
                let (name, attributes) = start_parts(&e);
                self.pending.push_back(Event::Start {
                    name: name.clone(),
                    attributes,
                    offset,
                    len: end - offset,
                });
                self.pending.push_back(Event::End {
                    name,
                    offset: end,
                    len: 0,
                });
                self.position = end;
            }
            XmlEvent::End(e) => {
                self.flush_text();
                let end = self.markup_end();
                self.pending.push_back(Event::End {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    offset,
                    len: end - offset,
                });
                self.position = end;
            }
            XmlEvent::Eof => {
                self.flush_text();
                self.done = true;
            }
            // Comments, processing instructions, declarations, doctypes.
            _ => {
                self.flush_text();
                self.position = self.markup_end();
            }
        }

        self.buf = buf;
        Ok(())
    }
}

impl<R: BufRead> EventSource for XmlEventSource<R> {
    fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }
            self.read_one()?;
        }
    }
}

fn skip_bom<R: BufRead>(inner: &mut R) -> Result<usize> {
    let head = inner.fill_buf()?;
    if head.starts_with(UTF8_BOM) {
        inner.consume(UTF8_BOM.len());
        Ok(UTF8_BOM.len())
    } else {
        Ok(0)
    }
}

fn utf8(raw: &[u8], offset: usize) -> Result<&str> {
    std::str::from_utf8(raw).map_err(|e| Error::Encoding {
        offset: offset + e.valid_up_to(),
    })
}

fn start_parts(e: &BytesStart<'_>) -> (String, Attributes) {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Attributes::new();
    for attr in e.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        attributes.push(key, unescape_lossy(&raw).into_owned());
    }
    (name, attributes)
}
