//! Route resolution.
//!
//! Given a root branch, a verb and a path, find the branch and method that
//! should answer, collecting path parameters on the way down:
//!
//! 1. Try the current branch's routes, literal-led patterns first, each as a
//!    *partial* match. The first hit delegates the leftover path to the
//!    route's target and resolution starts over there. There is no
//!    backtracking: once a route matched, a miss further down is a miss.
//! 2. No route matched: a trailing `/?` asks the branch (or one of its
//!    methods) to describe itself, provided the verb is read-safe.
//! 3. Otherwise try the branch's handlers for the verb, literal-led first,
//!    each as a *full* match.
//! 4. Still nothing: report the miss together with the deepest branch
//!    reached, so the dispatcher can look for a fallback there.
//!
//! Resolution only reads the branch tables, so any number of requests can
//! resolve against the same tree at once.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::branch::Branch;
use crate::error::Error;
use crate::path::{ParsedPath, Params, Pattern, ordered};
use crate::verb::Verb;

/// Delegation deeper than this is treated as a cycle in the tree.
pub const MAX_DEPTH: usize = 64;

/// The outcome of [`resolve`].
#[derive(Debug)]
pub enum Resolution {
    /// A handler matched.
    Endpoint(Endpoint),
    /// The path ended in `/?` and the verb is read-safe.
    Introspect(Introspect),
    /// Nothing matched.
    NotFound(Miss),
}

/// A handler match.
pub struct Endpoint {
    pub branch: Arc<dyn Branch>,
    pub method: String,
    pub pattern: Pattern,
    pub params: Params,
    /// The path consumed by routes on the way to `branch`.
    pub prefix: ParsedPath,
}

/// An introspection request for a branch, or for one of its methods.
pub struct Introspect {
    pub branch: Arc<dyn Branch>,
    pub method: Option<String>,
    pub params: Params,
    pub prefix: ParsedPath,
}

/// A routing miss.
pub struct Miss {
    /// The deepest branch reached before matching failed.
    pub branch: Arc<dyn Branch>,
    /// The part of the path that branch could not place.
    pub remaining: ParsedPath,
    pub params: Params,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("branch", &self.branch.name())
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("params", &self.params)
            .finish()
    }
}

impl fmt::Debug for Introspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Introspect")
            .field("branch", &self.branch.name())
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Miss")
            .field("branch", &self.branch.name())
            .field("remaining", &self.remaining.to_string())
            .finish_non_exhaustive()
    }
}

/// Resolves `verb path` starting at `root`.
///
/// A miss is `Ok(Resolution::NotFound(..))`. The only error is a broken
/// tree: a route target that does not resolve to a branch, or delegation
/// deeper than [`MAX_DEPTH`].
pub fn resolve(root: &Arc<dyn Branch>, verb: Verb, path: &str) -> Result<Resolution, Error> {
    let path = ParsedPath::parse(path);
    resolve_in(Arc::clone(root), verb, path, Params::new(), Vec::new(), 0)
}

fn resolve_in(
    branch: Arc<dyn Branch>,
    verb: Verb,
    path: ParsedPath,
    mut params: Params,
    mut consumed: Vec<String>,
    depth: usize,
) -> Result<Resolution, Error> {
    if depth > MAX_DEPTH {
        return Err(Error::Configuration(format!(
            "route delegation deeper than {MAX_DEPTH} levels at `{}`",
            branch.name()
        )));
    }

    // The query marker never takes part in route matching, so a wildcard
    // route cannot capture it.
    let query = path.is_query() && verb.is_read_safe();
    let routable = if query { path.without_query() } else { path.clone() };

    if !routable.is_empty() {
        for route in ordered(branch.routes(), |r| &r.pattern) {
            let Some(mut matched) = route.pattern.matches(&routable, true) else {
                continue;
            };
            if query {
                matched.rest.push(crate::path::QUERY_MARKER.to_owned());
            }
            let target = route.resolve_target(branch.as_ref())?;
            debug!(
                from = %branch.name(),
                to = %target.name(),
                route = %route.pattern,
                rest = %matched.sub_path(),
                "delegating"
            );
            let used = path.len() - matched.rest.len();
            consumed.extend(path.segments()[..used].iter().cloned());
            let sub_path = matched.sub_path();
            params.extend(matched.params);
            return resolve_in(target, verb, sub_path, params, consumed, depth + 1);
        }
    }

    let prefix = ParsedPath::from_segments(consumed);

    if query {
        return Ok(introspect(branch, path.without_query(), params, prefix));
    }

    for entry in ordered(branch.handlers().get(verb), |h| &h.pattern) {
        if let Some(matched) = entry.pattern.matches(&path, false) {
            debug!(branch = %branch.name(), method = %entry.method, pattern = %entry.pattern, "handler matched");
            params.extend(matched.params);
            let (method, pattern) = (entry.method.clone(), entry.pattern.clone());
            return Ok(Resolution::Endpoint(Endpoint { branch, method, pattern, params, prefix }));
        }
    }

    debug!(branch = %branch.name(), %verb, remaining = %path, "no route or handler matched");
    Ok(Resolution::NotFound(Miss { branch, remaining: path, params }))
}

/// `/?` describes the branch. `/<handler path>/?` describes the method that
/// handler path reaches, under whichever verb declares it first.
fn introspect(branch: Arc<dyn Branch>, target: ParsedPath, mut params: Params, prefix: ParsedPath) -> Resolution {
    if target.is_empty() {
        return Resolution::Introspect(Introspect { branch, method: None, params, prefix });
    }

    let handlers = branch.handlers();
    for verb in handlers.verbs() {
        for entry in ordered(handlers.get(verb), |h| &h.pattern) {
            if let Some(matched) = entry.pattern.matches(&target, false) {
                params.extend(matched.params);
                let method = Some(entry.method.clone());
                return Resolution::Introspect(Introspect { branch, method, params, prefix });
            }
        }
    }

    let mut remaining = target.segments().to_vec();
    remaining.push(crate::path::QUERY_MARKER.to_owned());
    Resolution::NotFound(Miss { branch, remaining: ParsedPath::from_segments(remaining), params })
}
