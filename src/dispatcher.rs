//! Request dispatch.
//!
//! ```text
//! Request ─► internal namespace? ─► framework branch
//!                 │ no
//!                 ▼
//!             resolve(root) ─┬─ Introspect ─► enabled? ─► ACL ─► payload
//!                            ├─ Endpoint ───► public? ─► ACL ─► bind ─► invoke
//!                            └─ NotFound ───► fallback method? ─► ACL ─► invoke
//! ```
//!
//! A [`Dispatcher`] is cheap to clone and shares one [`Context`] between
//! every clone and every in-flight [`Call`].

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::acl::AccessController;
use crate::branch::Branch;
use crate::config::Config;
use crate::error::{Error, MissingParam};
use crate::introspect::{Describer, QueryOptions, Viewer};
use crate::method::{Method, MethodSpec};
use crate::path::{ParsedPath, Params};
use crate::request::{Call, Request};
use crate::resolve::{Resolution, resolve};

// ── Context ───────────────────────────────────────────────────────────────────

/// Everything a dispatch needs besides the request itself.
pub struct Context {
    config: Config,
    root: Arc<dyn Branch>,
    framework: Arc<dyn Branch>,
    access: Option<AccessController>,
}

impl Context {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The service's root branch.
    pub fn root(&self) -> &Arc<dyn Branch> {
        &self.root
    }

    /// The branch mounted at the internal namespace.
    pub fn framework(&self) -> &Arc<dyn Branch> {
        &self.framework
    }

    /// `None` when access control is disabled.
    pub fn access(&self) -> Option<&AccessController> {
        self.access.as_ref()
    }

    /// The principal ACL rules are looked up for: the caller's, or the
    /// configured anonymous name.
    pub fn effective_principal<'a>(&'a self, principal: Option<&'a str>) -> &'a str {
        principal.unwrap_or(&self.config.acl.anonymous)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("service", &self.config.service_name)
            .field("root", &self.root.name())
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// A successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A handler's method returned this value.
    Invoked(Value),
    /// Nothing matched and the nearest branch's fallback method answered.
    Fallback(Value),
    /// An introspection payload.
    Introspection(Value),
}

impl Outcome {
    pub fn value(&self) -> &Value {
        match self {
            Self::Invoked(v) | Self::Fallback(v) | Self::Introspection(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Invoked(v) | Self::Fallback(v) | Self::Introspection(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Routes requests through a branch tree and invokes the methods they reach.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    context: Arc<Context>,
}

impl Dispatcher {
    /// A dispatcher over `root`. Access control follows `config.acl`: when
    /// enabled, rules come from `config.acl.rules`.
    pub fn new(root: impl Branch, config: Config) -> Result<Self, Error> {
        Self::with_root(Arc::new(root), config)
    }

    pub fn with_root(root: Arc<dyn Branch>, config: Config) -> Result<Self, Error> {
        let access = config.acl.enabled.then(|| AccessController::from_config(&config));
        Self::assemble(root, config, access)
    }

    /// A dispatcher that always checks access through `access`, whatever
    /// `config.acl.enabled` says. Use this to plug in a custom
    /// [`AclStore`](crate::AclStore).
    pub fn with_access(root: Arc<dyn Branch>, config: Config, access: AccessController) -> Result<Self, Error> {
        Self::assemble(root, config, Some(access))
    }

    fn assemble(root: Arc<dyn Branch>, config: Config, access: Option<AccessController>) -> Result<Self, Error> {
        config.validate()?;
        let access = access.map(|a| a.internal_namespace(config.internal_namespace.clone()));
        let framework: Arc<dyn Branch> = Arc::new(crate::framework::branch()?);
        debug!(
            root = %root.name(),
            namespace = %config.internal_namespace,
            acl = access.is_some(),
            "dispatcher ready"
        );
        Ok(Self { context: Arc::new(Context { config, root, framework, access }) })
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Dispatches one request.
    pub async fn dispatch(&self, request: Request) -> Result<Outcome, Error> {
        let Request { verb, path, args, principal } = request;
        let ctx = &self.context;
        let full = ParsedPath::parse(&path);

        // Framework endpoints resolve against their own branch, below the
        // namespace segment.
        let (tree, local, mount) = if full.first() == Some(ctx.config.internal_namespace.as_str()) {
            (&ctx.framework, full.tail(), vec![ctx.config.internal_namespace.clone()])
        } else {
            (&ctx.root, full.clone(), Vec::new())
        };

        let who = ctx.effective_principal(principal.as_deref());
        let endpoint = full.to_relative();
        let not_found = || Error::NotFound { verb, path: full.to_string() };

        match resolve(tree, verb, &local.to_string())? {
            Resolution::Introspect(query) => {
                if !ctx.config.introspection {
                    return Err(Error::IntrospectionDisabled);
                }
                self.authorize(&endpoint, who, not_found)?;

                let options = QueryOptions::from_args(&args)?;
                let describer = Describer {
                    options: &options,
                    viewer: ctx.access.as_ref().map(|access| Viewer { access, principal: who }),
                    fallback: &ctx.config.fallback_method,
                };
                let prefix = mounted(&mount, &query.prefix);
                let payload = match &query.method {
                    Some(name) => describer.method(query.branch.as_ref(), name, &prefix)?,
                    None => describer.branch(query.branch.as_ref(), &prefix)?,
                };
                debug!(%verb, path = %full, branch = %query.branch.name(), "introspection");
                Ok(Outcome::Introspection(payload))
            }

            Resolution::Endpoint(ep) => {
                let Some(method) = ep.branch.method(&ep.method).filter(|m| m.is_public()) else {
                    debug!(method = %ep.method, branch = %ep.branch.name(), "method is not public");
                    return Err(not_found());
                };
                self.authorize(&endpoint, who, not_found)?;

                let label = format!("{verb} {full}");
                let bound = bind(method.spec(), &ep.params, &args, &label)?;
                let call = Call {
                    args: bound,
                    raw: raw_args(args, &ep.params),
                    principal,
                    unmatched: None,
                    context: Arc::clone(ctx),
                };
                invoke(method, call, &label).await.map(Outcome::Invoked)
            }

            Resolution::NotFound(miss) => {
                let Some(fallback) = miss.branch.method(&ctx.config.fallback_method) else {
                    debug!(%verb, path = %full, "not found");
                    return Err(not_found());
                };
                self.authorize(&endpoint, who, not_found)?;

                let label = format!("{verb} {full}");
                let raw = raw_args(args, &miss.params);
                let call = Call {
                    args: raw.clone(),
                    raw,
                    principal,
                    unmatched: Some(miss.remaining.to_relative()),
                    context: Arc::clone(ctx),
                };
                debug!(branch = %miss.branch.name(), unmatched = %miss.remaining, "fallback");
                invoke(fallback, call, &label).await.map(Outcome::Fallback)
            }
        }
    }

    /// Refuses with `AccessDenied`, or with whatever `not_found` builds when
    /// refusals are configured to look like misses.
    fn authorize(&self, endpoint: &str, principal: &str, not_found: impl FnOnce() -> Error) -> Result<(), Error> {
        let Some(access) = &self.context.access else {
            return Ok(());
        };
        if access.check_access(endpoint, principal)? {
            return Ok(());
        }
        warn!(%principal, %endpoint, "access denied");
        if self.context.config.acl.deny_as_not_found {
            Err(not_found())
        } else {
            Err(Error::AccessDenied { path: endpoint.to_owned() })
        }
    }
}

/// Binds request arguments to the method's declared parameters.
///
/// Each parameter takes, in order of preference, the route capture, the
/// request argument or the declared default. Optional parameters with none
/// of these stay unbound.
fn bind(spec: &MethodSpec, params: &Params, args: &Map<String, Value>, endpoint: &str) -> Result<Map<String, Value>, Error> {
    let mut bound = Map::new();
    let mut missing = Vec::new();

    for param in &spec.params {
        let value = params
            .get(&param.name)
            .map(|capture| Value::String(capture.clone()))
            .or_else(|| args.get(&param.name).cloned())
            .or_else(|| param.default.clone());
        match value {
            Some(value) => {
                bound.insert(param.name.clone(), value);
            }
            None if param.optional => {}
            None => missing.push(MissingParam {
                name: param.name.clone(),
                kind: param.kind.clone(),
                description: param.description.clone(),
            }),
        }
    }

    if missing.is_empty() {
        Ok(bound)
    } else {
        debug!(%endpoint, missing = missing.len(), "missing parameters");
        Err(Error::MissingParameters { endpoint: endpoint.to_owned(), missing })
    }
}

/// Request arguments with route captures merged over them.
fn raw_args(mut args: Map<String, Value>, params: &Params) -> Map<String, Value> {
    for (name, value) in params {
        args.insert(name.clone(), Value::String(value.clone()));
    }
    args
}

async fn invoke(method: &Method, call: Call, endpoint: &str) -> Result<Value, Error> {
    debug!(%endpoint, method = %method.name(), "invoking");
    method.handler().call(call).await.map_err(|e| {
        debug!(%endpoint, method = %method.name(), error = %e, "method failed");
        Error::Method(e)
    })
}

fn mounted(mount: &[String], prefix: &ParsedPath) -> ParsedPath {
    let segments = mount.iter().chain(prefix.segments()).cloned().collect();
    ParsedPath::from_segments(segments)
}
