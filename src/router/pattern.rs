//! Route template compilation.
//!
//! A template such as `/news/{query}` or `/addings/*` is split on `/` into
//! literal segments, named parameters and an optional trailing wildcard.
//! One leading and one trailing slash are accepted; every other empty
//! segment is rejected.

use crate::error::PatternError;
use crate::router::Params;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Named(String),
    TrailingWildcard,
}

/// How precisely a pattern pins down the paths it matches. Lower sorts first and wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Specificity {
    Exact,
    Named,
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    template: String,
    segments: Vec<Segment>,
    names: Vec<String>,
}

impl RoutePattern {
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        if template.is_empty() {
            return Err(PatternError::Empty);
        }

        let trimmed = template.strip_prefix('/').unwrap_or(template);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

        let mut segments = Vec::new();
        let mut names: Vec<String> = Vec::new();

        if !trimmed.is_empty() {
            let parts: Vec<&str> = trimmed.split('/').collect();
            let last = parts.len() - 1;
            for (index, part) in parts.into_iter().enumerate() {
                let segment = classify(template, part)?;
                match &segment {
                    Segment::TrailingWildcard if index != last => {
                        return Err(PatternError::MisplacedWildcard(template.to_string()));
                    }
                    Segment::Named(name) => {
                        if names.iter().any(|existing| existing == name) {
                            return Err(PatternError::DuplicateParameter {
                                template: template.to_string(),
                                name: name.clone(),
                            });
                        }
                        names.push(name.clone());
                    }
                    _ => {}
                }
                segments.push(segment);
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
            names,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Declared parameter names in template order.
    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    pub fn specificity(&self) -> Specificity {
        if matches!(self.segments.last(), Some(Segment::TrailingWildcard)) {
            Specificity::Wildcard
        } else if self.names.is_empty() {
            Specificity::Exact
        } else {
            Specificity::Named
        }
    }

    /// Matches already split, non-empty path segments and returns the bound parameters.
    pub fn match_segments(&self, path: &[&str]) -> Option<Params> {
        let mut params = Params::default();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    if decode(path.get(index)?) != text.as_str() {
                        return None;
                    }
                }
                Segment::Named(name) => {
                    let value = path.get(index)?;
                    params.insert(name.clone(), decode(value).into_owned());
                }
                Segment::TrailingWildcard => {
                    let rest = path
                        .get(index..)
                        .unwrap_or_default()
                        .iter()
                        .map(|raw| decode(raw).into_owned())
                        .collect();
                    params.set_wildcard(rest);
                    return Some(params);
                }
            }
        }
        (path.len() == self.segments.len()).then_some(params)
    }

    pub fn matches(&self, path: &str) -> Option<Params> {
        let segments = split_path(path);
        self.match_segments(&segments)
    }
}

impl FromStr for RoutePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutePattern::compile(s)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Splits a request path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn classify(template: &str, part: &str) -> Result<Segment, PatternError> {
    if part.is_empty() {
        return Err(PatternError::EmptySegment(template.to_string()));
    }
    if part == "*" {
        return Ok(Segment::TrailingWildcard);
    }
    if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        let valid = !inner.is_empty()
            && inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PatternError::InvalidParameterName {
                template: template.to_string(),
                segment: part.to_string(),
            });
        }
        return Ok(Segment::Named(inner.to_string()));
    }
    if part.contains('{') || part.contains('}') {
        return Err(PatternError::InvalidParameterName {
            template: template.to_string(),
            segment: part.to_string(),
        });
    }
    Ok(Segment::Literal(part.to_string()))
}

/// Percent-decodes one path segment. Undecodable input is kept as is.
fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}
