//! Record-scoped metadata extraction.
//!
//! Each record type has a list of [`ExtractorRule`]s. When a record is
//! created, its rules are instantiated as [`Bindings`] owned by that open
//! record. The bindings see every later event until the record closes and
//! are dropped with it. Patterns are evaluated relative to the record's
//! own element, so a binding only ever reads from that element and its
//! descendants.
//!
//! A rule that matches nothing leaves its field absent. When a rule matches
//! more than once, the first value wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::ObjectType;
use crate::path::{PathPattern, split_attribute};
use crate::tree::{ElementId, ElementNode, ElementTree};
use crate::util::{collapse_whitespace, unescape_lossy};

/// How one metadata field is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorRule {
    /// Text content of the first matching descendant, whitespace-collapsed
    /// and entity-unescaped.
    Content { pattern: PathPattern, field: String },
    /// An attribute of the first matching element (the record's own
    /// element for `.@attr`).
    Attribute {
        pattern: PathPattern,
        attribute: String,
        field: String,
    },
}

impl ExtractorRule {
    pub fn content(pattern: &str, field: &str) -> Result<Self> {
        Ok(ExtractorRule::Content {
            pattern: PathPattern::parse(pattern)?,
            field: field.to_string(),
        })
    }

    /// `pattern` is an element pattern followed by `@attribute`,
    /// e.g. `.@n` or `./text/body/volume@n`.
    pub fn attribute(pattern: &str, field: &str) -> Result<Self> {
        let Some((element, attribute)) = split_attribute(pattern) else {
            return Err(Error::Pattern {
                pattern: pattern.to_string(),
                reason: "attribute pattern must end in @name".to_string(),
            });
        };
        if attribute.is_empty() {
            return Err(Error::Pattern {
                pattern: pattern.to_string(),
                reason: "empty attribute name".to_string(),
            });
        }
        Ok(ExtractorRule::Attribute {
            pattern: PathPattern::parse(element)?,
            attribute: attribute.to_string(),
            field: field.to_string(),
        })
    }

    pub fn field(&self) -> &str {
        match self {
            ExtractorRule::Content { field, .. } | ExtractorRule::Attribute { field, .. } => field,
        }
    }

    fn pattern(&self) -> &PathPattern {
        match self {
            ExtractorRule::Content { pattern, .. } | ExtractorRule::Attribute { pattern, .. } => {
                pattern
            }
        }
    }
}

/// Extraction rules per record type.
#[derive(Debug, Clone, Default)]
pub struct MetadataRules {
    by_type: [Vec<Arc<ExtractorRule>>; ObjectType::COUNT],
}

impl MetadataRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, object_type: ObjectType) -> &[Arc<ExtractorRule>] {
        &self.by_type[object_type.index()]
    }

    pub fn push(&mut self, object_type: ObjectType, rule: ExtractorRule) {
        self.by_type[object_type.index()].push(Arc::new(rule));
    }

    /// Replace every rule for `object_type`.
    pub fn set(&mut self, object_type: ObjectType, rules: Vec<ExtractorRule>) {
        self.by_type[object_type.index()] = rules.into_iter().map(Arc::new).collect();
    }
}

/// The TEI metadata rules.
pub fn tei_metadata() -> MetadataRules {
    // (type, is attribute rule, pattern, field)
    const RULES: &[(ObjectType, bool, &str, &str)] = &[
        (ObjectType::Document, false, "./teiHeader/fileDesc/titleStmt/author", "author"),
        (ObjectType::Document, false, "./teiHeader/fileDesc/titleStmt/title", "title"),
        (ObjectType::Document, false, "./teiHeader/profileDesc/creation/date", "date"),
        (ObjectType::Document, true, ".@xml:id", "id"),
        (ObjectType::Division, false, "./head", "head"),
        (ObjectType::Division, true, ".@n", "n"),
        (ObjectType::Division, true, ".@xml:id", "id"),
        (ObjectType::Paragraph, false, "./speaker", "who"),
        (ObjectType::Page, true, ".@n", "n"),
        (ObjectType::Page, true, ".@src", "img"),
    ];
    let mut rules = MetadataRules::new();
    for &(object_type, is_attribute, pattern, field) in RULES {
        let rule = if is_attribute {
            ExtractorRule::attribute(pattern, field)
        } else {
            ExtractorRule::content(pattern, field)
        };
        if let Ok(rule) = rule {
            rules.push(object_type, rule);
        }
    }
    rules
}

#[derive(Debug)]
struct Capture {
    element: ElementId,
    text: String,
}

#[derive(Debug)]
struct Binding {
    rule: Arc<ExtractorRule>,
    capture: Option<Capture>,
}

/// The live extractors of one open record.
#[derive(Debug, Default)]
pub struct Bindings {
    owner: Option<(ElementId, usize)>,
    active: Vec<Binding>,
}

impl Bindings {
    /// Instantiate `rules` for a record created by `owner`, which is open at
    /// `depth` in the element tree.
    pub fn install(rules: &[Arc<ExtractorRule>], owner: ElementId, depth: usize) -> Self {
        Self {
            owner: Some((owner, depth)),
            active: rules
                .iter()
                .map(|rule| Binding {
                    rule: Arc::clone(rule),
                    capture: None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// An element has just been opened; `path` is the full open path,
    /// ending with it.
    pub fn on_start(
        &mut self,
        tree: &ElementTree,
        path: &[&ElementNode],
        metadata: &mut BTreeMap<String, String>,
    ) {
        let Some((owner, depth)) = self.owner else {
            return;
        };
        if !tree.is_open_at(owner, depth) || path.len() <= depth {
            return;
        }
        let (Some(element), Some(node)) = (tree.current(), path.last()) else {
            return;
        };
        let relative = &path[depth..];

        for binding in &mut self.active {
            if !binding.rule.pattern().matches(relative) {
                continue;
            }
            match &*binding.rule {
                ExtractorRule::Content { field, .. } => {
                    if binding.capture.is_none() && !metadata.contains_key(field) {
                        binding.capture = Some(Capture {
                            element,
                            text: String::new(),
                        });
                    }
                }
                ExtractorRule::Attribute {
                    attribute, field, ..
                } => {
                    if let Some(value) = node.attributes.get(attribute)
                        && !metadata.contains_key(field)
                    {
                        metadata.insert(field.clone(), value.to_string());
                    }
                }
            }
        }
    }

    pub fn on_text(&mut self, content: &str) {
        for binding in &mut self.active {
            if let Some(capture) = &mut binding.capture {
                capture.text.push_str(content);
            }
        }
    }

    /// `element` has closed.
    pub fn on_end(&mut self, element: ElementId, metadata: &mut BTreeMap<String, String>) {
        for binding in &mut self.active {
            if binding
                .capture
                .as_ref()
                .is_none_or(|capture| capture.element != element)
            {
                continue;
            }
            let Some(capture) = binding.capture.take() else {
                continue;
            };
            let value = collapse_whitespace(&unescape_lossy(&capture.text));
            let field = binding.rule.field();
            if !value.is_empty() && !metadata.contains_key(field) {
                metadata.insert(field.to_string(), value);
            }
        }
    }
}
