//! Ancestor-path patterns.
//!
//! A small XPath subset, evaluated against the path of open elements:
//!
//! | Pattern              | Matches                                          |
//! |----------------------|--------------------------------------------------|
//! | `.`                  | the context element itself                       |
//! | `./head`             | a `head` child of the context                    |
//! | `.//p`               | a `p` anywhere below the context                 |
//! | `./text/body//div`   | steps combine freely                             |
//! | `.//*`               | any element below the context                    |
//! | `.//milestone[@unit='page']` | attribute presence / equality predicates |
//! | `head`               | shorthand for `./head`                           |
//!
//! The context is the first element of the path handed to
//! [`PathPattern::matches`]: the document root for classification, the
//! record's own element for metadata extraction.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::tree::ElementNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Has(String),
    Equals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    /// `None` is the `*` wildcard.
    name: Option<String>,
    predicates: Vec<Predicate>,
}

impl Step {
    fn matches(&self, node: &ElementNode) -> bool {
        if let Some(name) = &self.name
            && *name != node.name
        {
            return false;
        }
        self.predicates.iter().all(|p| match p {
            Predicate::Has(attr) => node.attributes.get(attr).is_some(),
            Predicate::Equals(attr, value) => node.attributes.get(attr) == Some(value.as_str()),
        })
    }
}

/// A compiled ancestor-path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    steps: Vec<Step>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let source = pattern.trim();
        if source.is_empty() {
            return Err(invalid(pattern, "empty pattern"));
        }

        let rest = if let Some(rest) = source.strip_prefix('.') {
            if !rest.is_empty() && !rest.starts_with('/') {
                return Err(invalid(pattern, "expected '/' after '.'"));
            }
            rest
        } else if source.starts_with('/') {
            return Err(invalid(pattern, "absolute paths are not supported; start with '.'"));
        } else {
            // Bare relative path: `head` is `./head`.
            return Self::parse(&format!("./{source}")).map(|mut p| {
                p.source = source.to_string();
                p
            });
        };

        let mut steps = Vec::new();
        let mut rest = rest;
        while !rest.is_empty() {
            let (axis, after) = if let Some(after) = rest.strip_prefix("//") {
                (Axis::Descendant, after)
            } else if let Some(after) = rest.strip_prefix('/') {
                (Axis::Child, after)
            } else {
                return Err(invalid(pattern, "expected '/' between steps"));
            };
            let len = step_len(after);
            steps.push(parse_step(pattern, axis, &after[..len])?);
            rest = &after[len..];
        }

        Ok(Self {
            source: source.to_string(),
            steps,
        })
    }

    /// Whether the last element of `path` is selected, with `path[0]` as
    /// the context element.
    pub fn matches(&self, path: &[&ElementNode]) -> bool {
        !path.is_empty() && match_from(&self.steps, path, 1)
    }

    /// Whether the pattern selects only the context element.
    pub fn is_context(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for PathPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split `./text/body/volume@n` into the element pattern and the attribute.
///
/// An `@` inside a `[...]` predicate does not count.
pub fn split_attribute(pattern: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut split = None;
    for (i, c) in pattern.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '@' if depth == 0 => split = Some(i),
            _ => {}
        }
    }
    let i = split?;
    let (element, attribute) = (&pattern[..i], &pattern[i + 1..]);
    let element = if element.is_empty() { "." } else { element };
    Some((element, attribute))
}

fn match_from(steps: &[Step], path: &[&ElementNode], pos: usize) -> bool {
    let Some((step, rest)) = steps.split_first() else {
        return pos == path.len();
    };
    match step.axis {
        Axis::Child => {
            pos < path.len() && step.matches(path[pos]) && match_from(rest, path, pos + 1)
        }
        Axis::Descendant => {
            (pos..path.len()).any(|j| step.matches(path[j]) && match_from(rest, path, j + 1))
        }
    }
}

/// Length of the step at the front of `s`: up to the next `/` outside brackets.
fn step_len(s: &str) -> usize {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => return i,
            _ => {}
        }
    }
    s.len()
}

fn parse_step(pattern: &str, axis: Axis, step: &str) -> Result<Step> {
    let name_end = step.find('[').unwrap_or(step.len());
    let name = &step[..name_end];
    if name.is_empty() {
        return Err(invalid(pattern, "empty step"));
    }
    if name.contains(['@', ']', '\'', '"']) || name.chars().any(char::is_whitespace) {
        return Err(invalid(pattern, &format!("invalid element name {name:?}")));
    }

    let mut predicates = Vec::new();
    let mut rest = &step[name_end..];
    while !rest.is_empty() {
        let Some(body_end) = rest.find(']') else {
            return Err(invalid(pattern, "unterminated predicate"));
        };
        let body = rest[1..body_end].trim();
        rest = &rest[body_end + 1..];

        let Some(body) = body.strip_prefix('@') else {
            return Err(invalid(pattern, "only attribute predicates are supported"));
        };
        match body.split_once('=') {
            None => predicates.push(Predicate::Has(body.trim().to_string())),
            Some((attr, value)) => {
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')));
                let Some(value) = unquoted else {
                    return Err(invalid(pattern, "predicate value must be quoted"));
                };
                predicates.push(Predicate::Equals(attr.trim().to_string(), value.to_string()));
            }
        }
        if !rest.is_empty() && !rest.starts_with('[') {
            return Err(invalid(pattern, "unexpected text after predicate"));
        }
    }

    Ok(Step {
        axis,
        name: (name != "*").then(|| name.to_string()),
        predicates,
    })
}

fn invalid(pattern: &str, reason: &str) -> Error {
    Error::Pattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}
