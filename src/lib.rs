//! # ohco
//!
//! A streaming parser that turns TEI-like XML into an ordered hierarchy of
//! content objects (OHCO) for full-text indexing.
//!
//! Each document becomes a stream of [`Record`]s (document, division,
//! paragraph, sentence and word, plus the orthogonal page marker), each
//! with an exact byte range into the source, a type-scoped id, a weak
//! parent reference and metadata extracted from the markup.
//!
//! ## Features
//!
//! - Streaming: memory is bounded by nesting depth, not document size
//! - Exact byte offsets, suitable for seeking into the source
//! - Recovers from malformed nesting instead of rejecting the document
//! - Configurable classification, metadata and token rules (TEI by default)
//! - Parallel batch loading with per-document failure isolation
//!
//! ## Quick Start
//!
//! ```
//! use ohco::{ObjectType, Parser, ParserConfig, TextSink};
//!
//! let xml = br#"<TEI><text><div1 n="1"><head>Act I</head>
//!     <p>Who's there? Nay, answer me.</p></div1></text></TEI>"#;
//!
//! let config = ParserConfig::default();
//! let (max_ids, sink) = Parser::new(&config, 1, TextSink::new(Vec::new())).parse(xml)?;
//! // "Act I" forms an unterminated sentence of its own.
//! assert_eq!(max_ids.get(ObjectType::Sentence), 3);
//!
//! let lines = String::from_utf8(sink.into_inner()).unwrap();
//! assert!(lines.lines().any(|l| l.starts_with("div\tdiv1\t1\t1\t")));
//! # Ok::<(), ohco::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`event`]: markup events and the `quick-xml` event source
//! - [`tree`]: arena of open elements
//! - [`path`]: ancestor-path patterns
//! - [`classify`]: element to record-type rules
//! - [`tokenize`]: word and sentence tokens
//! - [`extract`]: record-scoped metadata extraction
//! - [`stack`]: the hierarchy stack
//! - [`parser`]: the driver tying it all together
//! - [`sink`]: record output formats
//! - [`passes`]: post-processing passes
//! - [`batch`]: parallel loading of many documents

pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod model;
pub mod parser;
pub mod passes;
pub mod path;
pub mod sink;
pub mod stack;
pub mod tokenize;
pub mod tree;
pub mod util;

pub use batch::{Batch, BatchReport, DocFailure, DocSummary};
pub use classify::{ClassificationRule, Classifier};
pub use config::ParserConfig;
pub use error::{Error, Result, StackError};
pub use event::{Attributes, Event, EventSource, XmlEventSource};
pub use extract::{ExtractorRule, MetadataRules};
pub use model::{MaxIds, ObjectType, Record, RecordRef};
pub use parser::Parser;
pub use passes::{Pass, PassOutput};
pub use path::PathPattern;
pub use sink::{JsonLinesSink, RecordSink, TextSink};
pub use stack::HierarchyStack;
pub use tokenize::{Token, TokenKind, Tokenizer};
