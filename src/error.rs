//! Error types for ohco operations.

use thiserror::Error;

use crate::model::ObjectType;

/// Errors that abort the parse of a single document.
///
/// Structural irregularities in the markup are never reported through this
/// type; they are recovered by the driver (see [`StackError`]).
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid UTF-8 at byte {offset}")]
    Encoding { offset: usize },

    #[error("invalid path pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("invalid token pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("token pattern must have a word group and a terminator group: {0:?}")]
    TokenPattern(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Inconsistencies signalled by the hierarchy stack.
///
/// These are recoverable: the driver logs them and carries on with the
/// next event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("no open {0} record")]
    NotOpen(ObjectType),

    #[error("a document record is already open")]
    NestedDocument,
}
