//! Batch loading of many documents into an output directory.
//!
//! Each document is parsed by its own [`Parser`] on a fixed-size `rayon`
//! pool. Document ids follow input order starting at 1, whatever order the
//! workers finish in. For document `n` the loader writes `n.records` (text
//! format, see [`TextSink`]) and one `n.<pass>` file per selected
//! [`Pass`].
//!
//! A document that fails is reported in [`BatchReport::failures`] and its
//! partial output is removed; the other documents are unaffected.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::model::{MaxIds, ObjectType, Record};
use crate::parser::Parser;
use crate::passes::Pass;
use crate::sink::{RecordSink, TextSink};

const LOG_TARGET: &str = "ohco::batch";

/// A document that was parsed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSummary {
    pub doc_id: u32,
    pub path: PathBuf,
    pub max_ids: MaxIds,
}

/// A document that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocFailure {
    pub doc_id: u32,
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for DocFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document {} ({}): {}", self.doc_id, self.path.display(), self.reason)
    }
}

/// Outcome of a batch, in document id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub documents: Vec<DocSummary>,
    pub failures: Vec<DocFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Largest per-document id of each type across the batch.
    pub fn max_ids(&self) -> MaxIds {
        let mut max = MaxIds::default();
        for doc in &self.documents {
            for (object_type, id) in doc.max_ids.iter() {
                max.observe(object_type, id);
            }
        }
        max
    }
}

/// Parses files into an output directory.
pub struct Batch<'c> {
    config: &'c ParserConfig,
    output: PathBuf,
    workers: usize,
    passes: Vec<Pass>,
    overwrite: bool,
}

impl<'c> Batch<'c> {
    pub fn new(config: &'c ParserConfig, output: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output: output.into(),
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            passes: Vec::new(),
            overwrite: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_passes(mut self, passes: Vec<Pass>) -> Self {
        self.passes = passes;
        self
    }

    /// Replace an existing, non-empty output directory instead of failing.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Parse `files`, assigning document ids 1, 2, ... in order.
    ///
    /// Only destination and pool set-up errors are returned as `Err`;
    /// per-document failures end up in the report.
    pub fn run<P: AsRef<Path> + Sync>(&self, files: &[P]) -> Result<BatchReport> {
        self.prepare_output()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::Config(format!("cannot start worker pool: {e}")))?;

        log::info!(
            target: LOG_TARGET,
            "loading {} document(s) into {} with {} worker(s)",
            files.len(),
            self.output.display(),
            self.workers
        );
        let done = AtomicUsize::new(0);
        let results: Vec<_> = pool.install(|| {
            files
                .par_iter()
                .enumerate()
                .map(|(i, path)| {
                    let doc_id = i as u32 + 1;
                    let path = path.as_ref();
                    let result = self.load(doc_id, path);
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    log::debug!(target: LOG_TARGET, "{n}/{}: {}", files.len(), path.display());
                    (doc_id, path.to_path_buf(), result)
                })
                .collect()
        });

        let mut report = BatchReport::default();
        for (doc_id, path, result) in results {
            match result {
                Ok(max_ids) => report.documents.push(DocSummary {
                    doc_id,
                    path,
                    max_ids,
                }),
                Err(e) => {
                    log::error!(target: LOG_TARGET, "document {doc_id} ({}): {e}", path.display());
                    report.failures.push(DocFailure {
                        doc_id,
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn prepare_output(&self) -> Result<()> {
        if self.output.is_dir() && fs::read_dir(&self.output)?.next().is_some() {
            if !self.overwrite {
                return Err(Error::Config(format!(
                    "destination {} already exists and is not empty",
                    self.output.display()
                )));
            }
            log::warn!(target: LOG_TARGET, "replacing {}", self.output.display());
            fs::remove_dir_all(&self.output)?;
        }
        fs::create_dir_all(&self.output)?;
        Ok(())
    }

    fn output_files(&self, doc_id: u32) -> Vec<PathBuf> {
        std::iter::once(self.output.join(format!("{doc_id}.records")))
            .chain(self.passes.iter().map(|p| self.output.join(p.file_name(doc_id))))
            .collect()
    }

    fn load(&self, doc_id: u32, path: &Path) -> Result<MaxIds> {
        let result = self.try_load(doc_id, path);
        if result.is_err() {
            for file in self.output_files(doc_id) {
                match fs::remove_file(&file) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => log::warn!(
                        target: LOG_TARGET,
                        "cannot remove partial output {}: {e}",
                        file.display()
                    ),
                    _ => {}
                }
            }
        }
        result
    }

    fn try_load(&self, doc_id: u32, path: &Path) -> Result<MaxIds> {
        let bytes = fs::read(path)?;
        let records_file = BufWriter::new(File::create(self.output.join(format!("{doc_id}.records")))?);
        let sink = Retaining {
            inner: TextSink::new(records_file),
            kept: (!self.passes.is_empty()).then(Vec::new),
        };

        let mut known = BTreeMap::new();
        known.insert("filename".to_string(), path.display().to_string());
        let (max_ids, sink) = Parser::new(self.config, doc_id, sink)
            .with_metadata(known)
            .parse(&bytes)?;

        let records = sink.kept.unwrap_or_default();
        for pass in &self.passes {
            let file = File::create(self.output.join(pass.file_name(doc_id)))?;
            pass.run(&records).write_to(BufWriter::new(file))?;
        }
        log::info!(
            target: LOG_TARGET,
            "document {doc_id}: {} word(s) from {}",
            max_ids.get(ObjectType::Word),
            path.display()
        );
        Ok(max_ids)
    }
}

/// Forwards records and keeps a copy for the passes.
struct Retaining<S> {
    inner: S,
    kept: Option<Vec<Record>>,
}

impl<S: RecordSink> RecordSink for Retaining<S> {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        if let Some(kept) = &mut self.kept {
            kept.push(record.clone());
        }
        self.inner.emit(record)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
