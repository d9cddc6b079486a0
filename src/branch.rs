//! Branches: the nodes of the service tree.
//!
//! A branch answers two questions. Which patterns delegate to another branch
//! (its *routes*)? Which `(verb, pattern)` pairs end at one of its own
//! methods (its *handlers*)? Anything implementing [`Branch`] can sit in the
//! tree; [`Node`] is the ready-made implementation, assembled once with a
//! [`NodeBuilder`] and never mutated afterwards.
//!
//! ```rust
//! use arbor::{MethodSpec, Node, ParamSpec, Verb};
//! use serde_json::json;
//!
//! let domains = Node::builder("domains")
//!     .on(Verb::Get, "/", "list")
//!     .method(MethodSpec::new("list"), |call: arbor::Call| async move {
//!         Ok::<_, arbor::BoxError>(json!({ "account": call.str("account") }))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let root = Node::builder("service")
//!     .child("domains", domains)
//!     .route("/account/:account/domains", "domains")
//!     .build()
//!     .unwrap();
//! # let _ = root;
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::handler::Handler;
use crate::method::{Method, MethodSpec};
use crate::path::Pattern;
use crate::verb::Verb;

// ── Capability ────────────────────────────────────────────────────────────────

/// The capability every node of the service tree provides.
///
/// Tables are read concurrently by every request, so implementations must not
/// change them after construction.
pub trait Branch: Send + Sync + 'static {
    /// Short name, used in introspection output.
    fn name(&self) -> &str;

    /// One-line description, used in introspection output.
    fn description(&self) -> &str {
        ""
    }

    /// Delegation table, in declaration order.
    fn routes(&self) -> &[Route];

    /// Terminal table, per verb, in declaration order.
    fn handlers(&self) -> &HandlerTable;

    /// Looks up a child branch by the name a [`RouteTarget::Named`] uses.
    fn child(&self, name: &str) -> Option<Arc<dyn Branch>>;

    /// Looks up a method by the name a handler entry uses.
    fn method(&self, name: &str) -> Option<&Method>;
}

impl fmt::Debug for dyn Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch").field("name", &self.name()).finish_non_exhaustive()
    }
}

/// Where a route delegates to.
#[derive(Clone)]
pub enum RouteTarget {
    /// A branch held directly by the route.
    Branch(Arc<dyn Branch>),
    /// The name of a child of the declaring branch.
    Named(String),
}

impl From<&str> for RouteTarget {
    fn from(name: &str) -> Self {
        Self::Named(name.to_owned())
    }
}

impl From<String> for RouteTarget {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Node> for RouteTarget {
    fn from(node: Node) -> Self {
        Self::Branch(Arc::new(node))
    }
}

impl From<Arc<dyn Branch>> for RouteTarget {
    fn from(branch: Arc<dyn Branch>) -> Self {
        Self::Branch(branch)
    }
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch(b) => f.debug_tuple("Branch").field(&b.name()).finish(),
            Self::Named(n)  => f.debug_tuple("Named").field(n).finish(),
        }
    }
}

/// One delegation entry.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: Pattern,
    pub target: RouteTarget,
}

impl Route {
    /// Resolves the target against the branch that declared this route.
    ///
    /// A name with no matching child is an authoring defect, reported as
    /// [`Error::Configuration`] rather than as a routing miss.
    pub fn resolve_target(&self, owner: &dyn Branch) -> Result<Arc<dyn Branch>, Error> {
        match &self.target {
            RouteTarget::Branch(branch) => Ok(Arc::clone(branch)),
            RouteTarget::Named(name) => owner.child(name).ok_or_else(|| {
                Error::Configuration(format!(
                    "route target `{name}` for `{}` in `{}` is not a branch",
                    self.pattern,
                    owner.name()
                ))
            }),
        }
    }
}

/// One terminal entry: a pattern and the method it invokes.
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    pub pattern: Pattern,
    pub method: String,
}

/// Handler entries grouped by verb.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    by_verb: HashMap<Verb, Vec<HandlerEntry>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries for one verb, in declaration order.
    pub fn get(&self, verb: Verb) -> &[HandlerEntry] {
        self.by_verb.get(&verb).map(Vec::as_slice).unwrap_or_default()
    }

    /// Verbs with at least one entry, in [`Verb::ALL`] order.
    pub fn verbs(&self) -> Vec<Verb> {
        Verb::ALL.into_iter().filter(|v| !self.get(*v).is_empty()).collect()
    }

    pub fn insert(&mut self, verb: Verb, pattern: Pattern, method: impl Into<String>) {
        self.by_verb
            .entry(verb)
            .or_default()
            .push(HandlerEntry { pattern, method: method.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.by_verb.values().all(Vec::is_empty)
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

/// A statically built branch.
pub struct Node {
    name: String,
    description: String,
    routes: Vec<Route>,
    handlers: HandlerTable,
    children: HashMap<String, Arc<dyn Branch>>,
    methods: HashMap<String, Method>,
}

impl Node {
    pub fn builder(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name)
    }

    /// Child names, sorted.
    pub fn child_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.children.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Branch for Node {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn routes(&self) -> &[Route] {
        &self.routes
    }

    fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    fn child(&self, name: &str) -> Option<Arc<dyn Branch>> {
        self.children.get(name).cloned()
    }

    fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("routes", &self.routes)
            .field("handlers", &self.handlers)
            .field("children", &self.child_names())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Node`]. Every call returns `self` so registrations chain.
///
/// Patterns are parsed and cross-references checked in [`build`](Self::build),
/// so a bad tree fails at startup instead of on the first request that
/// happens to reach the broken entry.
#[must_use]
pub struct NodeBuilder {
    name: String,
    description: String,
    routes: Vec<(String, RouteTarget)>,
    handlers: Vec<(Verb, String, String)>,
    children: Vec<(String, Arc<dyn Branch>)>,
    methods: Vec<Method>,
    auto_routes: bool,
}

impl NodeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            routes: Vec::new(),
            handlers: Vec::new(),
            children: Vec::new(),
            methods: Vec::new(),
            auto_routes: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a child branch that routes can name.
    pub fn child(self, name: impl Into<String>, branch: impl Branch) -> Self {
        self.child_arc(name, Arc::new(branch))
    }

    pub fn child_arc(mut self, name: impl Into<String>, branch: Arc<dyn Branch>) -> Self {
        self.children.push((name.into(), branch));
        self
    }

    /// Delegates paths matching `pattern` to `target`.
    pub fn route(mut self, pattern: &str, target: impl Into<RouteTarget>) -> Self {
        self.routes.push((pattern.to_owned(), target.into()));
        self
    }

    /// Sends `verb` requests matching `pattern` to the method named `method`.
    pub fn on(mut self, verb: Verb, pattern: &str, method: &str) -> Self {
        self.handlers.push((verb, pattern.to_owned(), method.to_owned()));
        self
    }

    pub fn get(self, pattern: &str, method: &str) -> Self {
        self.on(Verb::Get, pattern, method)
    }

    pub fn post(self, pattern: &str, method: &str) -> Self {
        self.on(Verb::Post, pattern, method)
    }

    pub fn put(self, pattern: &str, method: &str) -> Self {
        self.on(Verb::Put, pattern, method)
    }

    pub fn delete(self, pattern: &str, method: &str) -> Self {
        self.on(Verb::Delete, pattern, method)
    }

    /// Registers a method under `spec.name`.
    pub fn method(mut self, spec: MethodSpec, handler: impl Handler) -> Self {
        self.methods.push(Method::new(spec, handler));
        self
    }

    /// Exposes every public method under `GET` and `POST` at `/<name>` and
    /// every child at `/<name>`, after anything declared explicitly.
    pub fn auto_routes(mut self) -> Self {
        self.auto_routes = true;
        self
    }

    pub fn build(mut self) -> Result<Node, Error> {
        let configuration = |msg: String| Error::Configuration(msg);

        let mut children = HashMap::with_capacity(self.children.len());
        for (name, branch) in self.children {
            if children.insert(name.clone(), branch).is_some() {
                return Err(configuration(format!("duplicate child `{name}` in `{}`", self.name)));
            }
        }

        let mut methods = HashMap::with_capacity(self.methods.len());
        for method in self.methods {
            let name = method.name().to_owned();
            if methods.insert(name.clone(), method).is_some() {
                return Err(configuration(format!("duplicate method `{name}` in `{}`", self.name)));
            }
        }

        if self.auto_routes {
            let mut public: Vec<&str> = methods
                .values()
                .filter(|m| m.is_public())
                .map(Method::name)
                .collect();
            public.sort_unstable();
            for name in public {
                for verb in [Verb::Get, Verb::Post] {
                    self.handlers.push((verb, format!("/{name}"), name.to_owned()));
                }
            }
            let mut names: Vec<&String> = children.keys().collect();
            names.sort_unstable();
            for name in names {
                self.routes.push((format!("/{name}"), RouteTarget::Named(name.clone())));
            }
        }

        let mut routes = Vec::with_capacity(self.routes.len());
        let mut seen = HashSet::new();
        for (raw, target) in self.routes {
            let pattern = Pattern::parse(&raw)?;
            if !seen.insert(pattern.as_str().to_owned()) {
                return Err(configuration(format!("duplicate route `{pattern}` in `{}`", self.name)));
            }
            if let RouteTarget::Named(name) = &target {
                if !children.contains_key(name) {
                    return Err(configuration(format!(
                        "route target `{name}` for `{pattern}` in `{}` is not a branch",
                        self.name
                    )));
                }
            }
            routes.push(Route { pattern, target });
        }

        let mut handlers = HandlerTable::new();
        let mut seen = HashSet::new();
        for (verb, raw, method) in self.handlers {
            let pattern = Pattern::parse(&raw)?;
            if !methods.contains_key(&method) {
                return Err(configuration(format!(
                    "handler `{verb} {pattern}` in `{}` names unknown method `{method}`",
                    self.name
                )));
            }
            if !seen.insert((verb, pattern.as_str().to_owned())) {
                return Err(configuration(format!(
                    "duplicate handler `{verb} {pattern}` in `{}`",
                    self.name
                )));
            }
            handlers.insert(verb, pattern, method);
        }

        debug!(
            branch = %self.name,
            routes = routes.len(),
            methods = methods.len(),
            "branch built"
        );

        Ok(Node {
            name: self.name,
            description: self.description,
            routes,
            handlers,
            children,
            methods,
        })
    }
}
