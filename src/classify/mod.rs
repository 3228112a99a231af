//! Element classification.
//!
//! Maps each element, by its path from the document root, to the type of
//! record it opens. Rules are tried in the order they were configured and
//! the first match wins. Overlapping rules are legal; their order is the
//! only tie-breaker, there is no "most specific pattern" preference.

use crate::error::Result;
use crate::model::ObjectType;
use crate::path::PathPattern;
use crate::tree::ElementNode;

/// One `pattern -> type` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub pattern: PathPattern,
    pub object_type: ObjectType,
}

impl ClassificationRule {
    pub fn new(pattern: &str, object_type: ObjectType) -> Result<Self> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            object_type,
        })
    }
}

/// Ordered rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Append a rule; it loses to every rule already present.
    pub fn push(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Type of the record opened by the last element of `path`
    /// (`path[0]` is the document root), or `None` if no rule matches.
    pub fn classify(&self, path: &[&ElementNode]) -> Option<ObjectType> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(path))
            .map(|rule| rule.object_type)
    }
}

/// The TEI rule set.
pub fn tei_rules() -> Vec<ClassificationRule> {
    const RULES: &[(&str, ObjectType)] = &[
        (".", ObjectType::Document),
        (".//front", ObjectType::Division),
        (".//div", ObjectType::Division),
        (".//div0", ObjectType::Division),
        (".//div1", ObjectType::Division),
        (".//div2", ObjectType::Division),
        (".//div3", ObjectType::Division),
        (".//p", ObjectType::Paragraph),
        (".//sp", ObjectType::Paragraph),
        (".//pb", ObjectType::Page),
    ];
    RULES
        .iter()
        .filter_map(|&(pattern, ty)| ClassificationRule::new(pattern, ty).ok())
        .collect()
}
