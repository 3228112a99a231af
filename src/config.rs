//! Parser configuration.
//!
//! A [`ParserConfig`] bundles everything a [`Parser`](crate::Parser) needs
//! besides the document itself: the ordered classification rules, the
//! metadata rules per record type, the token pattern and the division
//! depth limit. The default is the TEI configuration.
//!
//! Configurations can be built in code:
//!
//! ```
//! use ohco::{ObjectType, ParserConfig};
//!
//! let config = ParserConfig::empty()
//!     .with_rule(".", ObjectType::Document)?
//!     .with_rule(".//chapter", ObjectType::Division)?
//!     .with_rule(".//para", ObjectType::Paragraph)?;
//! assert_eq!(config.classifier.rules().len(), 3);
//! # Ok::<(), ohco::Error>(())
//! ```
//!
//! or loaded from JSON, where every key is optional and missing keys keep
//! the TEI defaults:
//!
//! ```json
//! {
//!   "rules": [[".", "document"], [".//chapter", "division"]],
//!   "metadata": {
//!     "division": [
//!       {"kind": "content", "pattern": "./title", "field": "head"},
//!       {"kind": "attribute", "pattern": ".@id", "field": "id"}
//!     ]
//!   },
//!   "token_pattern": "(\\w+)|([.?!])",
//!   "max_division_depth": 2
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::classify::{ClassificationRule, Classifier, tei_rules};
use crate::error::{Error, Result};
use crate::extract::{ExtractorRule, MetadataRules, tei_metadata};
use crate::model::ObjectType;
use crate::stack::DEFAULT_MAX_DIVISION_DEPTH;
use crate::tokenize::Tokenizer;

/// Everything that shapes how documents are parsed.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub classifier: Classifier,
    pub metadata: MetadataRules,
    pub tokenizer: Tokenizer,
    /// Deepest division level; deeper divisions become siblings at this level.
    pub max_division_depth: u8,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            classifier: Classifier::new(tei_rules()),
            metadata: tei_metadata(),
            tokenizer: Tokenizer::default(),
            max_division_depth: DEFAULT_MAX_DIVISION_DEPTH,
        }
    }
}

impl ParserConfig {
    /// The TEI configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// No classification or metadata rules; default tokenizer and depth.
    pub fn empty() -> Self {
        Self {
            classifier: Classifier::default(),
            metadata: MetadataRules::new(),
            tokenizer: Tokenizer::default(),
            max_division_depth: DEFAULT_MAX_DIVISION_DEPTH,
        }
    }

    /// Append a classification rule. It loses to every rule already present.
    pub fn with_rule(mut self, pattern: &str, object_type: ObjectType) -> Result<Self> {
        self.classifier
            .push(ClassificationRule::new(pattern, object_type)?);
        Ok(self)
    }

    /// Append a metadata rule for `object_type`.
    pub fn with_extractor(mut self, object_type: ObjectType, rule: ExtractorRule) -> Self {
        self.metadata.push(object_type, rule);
        self
    }

    pub fn with_token_pattern(mut self, pattern: &str) -> Result<Self> {
        self.tokenizer = Tokenizer::new(pattern)?;
        Ok(self)
    }

    pub fn with_max_division_depth(mut self, depth: u8) -> Result<Self> {
        if depth == 0 {
            return Err(Error::Config("max_division_depth must be at least 1".into()));
        }
        self.max_division_depth = depth;
        Ok(self)
    }

    /// Parse a JSON configuration on top of the TEI defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(json)?;
        file.apply(Self::default())
    }

    /// Read a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| match e {
            Error::Json(e) => Error::Config(format!("{}: {e}", path.display())),
            other => other,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    rules: Option<Vec<(String, ObjectType)>>,
    metadata: Option<BTreeMap<ObjectType, Vec<ExtractorSpec>>>,
    token_pattern: Option<String>,
    max_division_depth: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ExtractorSpec {
    Content { pattern: String, field: String },
    Attribute { pattern: String, field: String },
}

impl ExtractorSpec {
    fn compile(&self) -> Result<ExtractorRule> {
        match self {
            ExtractorSpec::Content { pattern, field } => ExtractorRule::content(pattern, field),
            ExtractorSpec::Attribute { pattern, field } => ExtractorRule::attribute(pattern, field),
        }
    }
}

impl ConfigFile {
    fn apply(self, mut config: ParserConfig) -> Result<ParserConfig> {
        if let Some(rules) = self.rules {
            let rules = rules
                .iter()
                .map(|(pattern, ty)| ClassificationRule::new(pattern, *ty))
                .collect::<Result<Vec<_>>>()?;
            config.classifier = Classifier::new(rules);
        }
        if let Some(metadata) = self.metadata {
            for (ty, specs) in metadata {
                let rules = specs
                    .iter()
                    .map(ExtractorSpec::compile)
                    .collect::<Result<Vec<_>>>()?;
                config.metadata.set(ty, rules);
            }
        }
        if let Some(pattern) = self.token_pattern {
            config = config.with_token_pattern(&pattern)?;
        }
        if let Some(depth) = self.max_division_depth {
            config = config.with_max_division_depth(depth)?;
        }
        Ok(config)
    }
}
