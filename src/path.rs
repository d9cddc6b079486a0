//! Path normalization and pattern matching.
//!
//! A pattern is a slash-separated list of segments:
//!
//! | Segment  | Matches                                             |
//! |----------|-----------------------------------------------------|
//! | `users`  | exactly `users`                                     |
//! | `:id`    | one non-empty segment, captured as `id`             |
//! | `*rest`  | every remaining segment (maybe none), as `rest`     |
//!
//! Leading and trailing slashes are optional on both sides and repeated
//! slashes collapse, so `account/`, `/account` and `//account` are the same
//! pattern.
//!
//! Matching runs in one of two modes. *Full* mode is used for terminal
//! handlers: the pattern must consume the whole path. *Partial* mode is used
//! for delegation: the pattern only has to consume a prefix, and whatever is
//! left over is handed to the child branch.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Segment separator for paths and patterns.
pub const SEPARATOR: char = '/';

/// The last segment of an introspection request (`/users/?`).
pub const QUERY_MARKER: &str = "?";

/// Captured path parameters, keyed by the pattern's parameter names.
pub type Params = HashMap<String, String>;

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Normalizes a path: single leading `/`, no trailing `/`, no repeated `/`.
///
/// ```
/// assert_eq!(arbor::path::normalize("account//157/"), "/account/157");
/// assert_eq!(arbor::path::normalize(""), "/");
/// ```
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

/// A normalized request path split into its segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPath {
    segments: Vec<String>,
}

impl ParsedPath {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self { segments }
    }

    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// True for introspection requests (`/?`, `/users/?`).
    pub fn is_query(&self) -> bool {
        self.segments.last().is_some_and(|s| s == QUERY_MARKER)
    }

    /// The path with its query marker removed. Identity for non-queries.
    pub fn without_query(&self) -> ParsedPath {
        let mut segments = self.segments.clone();
        if self.is_query() {
            segments.pop();
        }
        Self { segments }
    }

    /// Everything after the first segment.
    pub fn tail(&self) -> ParsedPath {
        Self { segments: self.segments.iter().skip(1).cloned().collect() }
    }

    /// The segments joined without a leading slash: the form ACL rules are
    /// written against (`account/157/domain`).
    pub fn to_relative(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for ParsedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

// ── Patterns ──────────────────────────────────────────────────────────────────

/// One segment of a route or handler pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

impl Segment {
    fn parse(raw: &str) -> Result<Self, &'static str> {
        if let Some(name) = raw.strip_prefix(':') {
            if name.is_empty() {
                return Err("parameter segment without a name");
            }
            Ok(Self::Param(name.to_owned()))
        } else if let Some(name) = raw.strip_prefix('*') {
            if name.is_empty() {
                return Err("wildcard segment without a name");
            }
            Ok(Self::Wildcard(name.to_owned()))
        } else {
            Ok(Self::Literal(raw.to_owned()))
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s)  => f.write_str(s),
            Self::Param(n)    => write!(f, ":{n}"),
            Self::Wildcard(n) => write!(f, "*{n}"),
        }
    }
}

/// A parsed route or handler pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    text: String,
    segments: Vec<Segment>,
}

/// The outcome of a successful [`Pattern::matches`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    /// Values captured by `:name` and `*name` segments.
    pub params: Params,
    /// Segments the pattern did not consume. Always empty in full mode.
    pub rest: Vec<String>,
}

impl PathMatch {
    /// The unconsumed remainder as a path, for recursive resolution.
    pub fn sub_path(&self) -> ParsedPath {
        ParsedPath::from_segments(self.rest.clone())
    }
}

impl Pattern {
    /// Parses a pattern, normalizing its slashes.
    ///
    /// Fails when a wildcard is not the last segment or a parameter has no
    /// name.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };

        let raw: Vec<&str> = pattern.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = Segment::parse(part).map_err(invalid)?;
            if matches!(segment, Segment::Wildcard(_)) && i + 1 != raw.len() {
                return Err(invalid("wildcard segment must be last"));
            }
            segments.push(segment);
        }

        Ok(Self { text: normalize(pattern), segments })
    }

    /// The normalized pattern text, e.g. `/account/:id`.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True when the first segment captures (`:x` or `*x`). Such patterns are
    /// greedy and are always tried after literal-led ones.
    pub fn is_parameterized(&self) -> bool {
        matches!(self.segments.first(), Some(Segment::Param(_) | Segment::Wildcard(_)))
    }

    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard(_)))
    }

    /// Names of every capturing segment, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(n) | Segment::Wildcard(n) => Some(n.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches `path` against this pattern.
    ///
    /// Returns `None` for a non-match; that is a normal outcome, not an
    /// error. With `partial` set the pattern may stop short of the end of the
    /// path and the leftover segments are returned in [`PathMatch::rest`].
    pub fn matches(&self, path: &ParsedPath, partial: bool) -> Option<PathMatch> {
        let parts = path.segments();
        let mut params = Params::new();

        for (i, segment) in self.segments.iter().enumerate() {
            if let Segment::Wildcard(name) = segment {
                params.insert(name.clone(), parts[i.min(parts.len())..].join("/"));
                return Some(PathMatch { params, rest: Vec::new() });
            }

            // Pattern is longer than the path.
            let part = parts.get(i)?;

            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() || part == QUERY_MARKER {
                        return None;
                    }
                    params.insert(name.clone(), part.clone());
                }
                Segment::Wildcard(_) => unreachable!("handled above"),
            }
        }

        if parts.len() > self.segments.len() && !partial {
            return None;
        }

        let rest = parts[self.segments.len()..].to_vec();
        Some(PathMatch { params, rest })
    }

    /// Substitutes captured values back into the pattern.
    ///
    /// Returns `None` if a capture named by the pattern is missing.
    pub fn render(&self, params: &Params) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            let value = match segment {
                Segment::Literal(lit) => lit.as_str(),
                Segment::Param(name) | Segment::Wildcard(name) => params.get(name)?.as_str(),
            };
            out.push(SEPARATOR);
            out.push_str(value);
        }
        Some(normalize(&out))
    }
}

impl FromStr for Pattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One-shot convenience over [`Pattern::parse`] and [`Pattern::matches`].
///
/// ```
/// let m = arbor::path::match_path("/a/b/c", "/a/*rest", false).unwrap().unwrap();
/// assert_eq!(m.params["rest"], "b/c");
/// ```
pub fn match_path(path: &str, pattern: &str, partial: bool) -> Result<Option<PathMatch>, Error> {
    let pattern = Pattern::parse(pattern)?;
    Ok(pattern.matches(&ParsedPath::parse(path), partial))
}

// ── Ordering ──────────────────────────────────────────────────────────────────

/// Orders a table for matching: literal-led patterns first, then
/// parameter-led ones. Declaration order is kept within each group.
pub fn ordered<T>(items: &[T], pattern: impl Fn(&T) -> &Pattern) -> Vec<&T> {
    let (literal, variable): (Vec<&T>, Vec<&T>) =
        items.iter().partition(|item| !pattern(item).is_parameterized());
    literal.into_iter().chain(variable).collect()
}
