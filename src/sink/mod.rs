//! Output sinks for closed records.
//!
//! Records arrive in closing order (innermost first), one at a time, as
//! soon as they close. Consumers that need creation order sort by id
//! within each type.
//!
//! # Text format
//!
//! [`TextSink`] writes one tab-separated line per record:
//!
//! ```text
//! type  name  doc  id  parent  ordinal  start  end  level  metadata
//! ```
//!
//! `parent` is `type:id` or `-` for the root, `level` is `0` for anything
//! but divisions, and `metadata` is a JSON object. Tabs, newlines and
//! backslashes in the name are backslash-escaped.

use std::io::{self, Write};

use crate::model::Record;

/// Receives closed records.
pub trait RecordSink {
    fn emit(&mut self, record: &Record) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
impl RecordSink for Vec<Record> {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        (**self).emit(record)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Tab-separated text lines.
pub struct TextSink<W: Write> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for TextSink<W> {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        let w = &mut self.writer;
        write!(w, "{}\t", record.object_type)?;
        write_escaped(w, record.name.as_bytes())?;
        write!(w, "\t{}\t{}\t", record.doc_id, record.id)?;
        match &record.parent {
            Some(parent) => write!(w, "{parent}")?,
            None => w.write_all(b"-")?,
        }
        write!(
            w,
            "\t{}\t{}\t{}\t{}\t",
            record.ordinal, record.start, record.end, record.level
        )?;
        serde_json::to_writer(&mut *w, &record.metadata)?;
        w.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// One JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn write_escaped<W: Write>(w: &mut W, mut bytes: &[u8]) -> io::Result<()> {
    while let Some(i) = memchr::memchr3(b'\t', b'\n', b'\\', bytes) {
        w.write_all(&bytes[..i])?;
        w.write_all(match bytes[i] {
            b'\t' => b"\\t",
            b'\n' => b"\\n",
            _ => b"\\\\",
        })?;
        bytes = &bytes[i + 1..];
    }
    w.write_all(bytes)
}
