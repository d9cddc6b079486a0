//! Introspection: branches describing themselves.
//!
//! A read-safe request whose path ends in `/?` returns a description of the
//! branch it reached instead of invoking anything:
//!
//! ```json
//! {
//!   "name": "account",
//!   "description": "Customer accounts",
//!   "routes":  { "/:account/domain/:domain": "Domains owned by an account" },
//!   "methods": { "GET": { "/:account": "Fetch one account" } }
//! }
//! ```
//!
//! Request arguments shape the answer:
//!
//! | Argument        | Effect                                              |
//! |-----------------|-----------------------------------------------------|
//! | `hide`, `h`     | `methods`/`m`, `branches`/`b`, `,` or `;` separated |
//! | `recurse`, `r`  | nest full descriptions of routed branches           |
//! | `verbose`, `v`  | full method detail instead of descriptions          |
//! | `name`, `n`     | `*` glob over route and method names, `%c` for case |

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value, json};

use crate::acl::AccessController;
use crate::branch::Branch;
use crate::error::Error;
use crate::method::Method;
use crate::path::ParsedPath;

// ── Options ───────────────────────────────────────────────────────────────────

/// Parsed introspection arguments.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub hide_methods: bool,
    pub hide_branches: bool,
    pub recurse: bool,
    pub verbose: bool,
    pub search: Option<NameFilter>,
}

/// A `*` glob over names, anchored at both ends.
#[derive(Debug, Clone)]
pub struct NameFilter {
    glob: String,
    case_sensitive: bool,
    regex: Regex,
}

impl NameFilter {
    pub fn new(glob: &str, case_sensitive: bool) -> Result<Self, Error> {
        let glob = if glob.is_empty() { "*" } else { glob };
        let literals: Vec<String> = glob.split('*').map(regex::escape).collect();
        let regex = RegexBuilder::new(&format!("^{}$", literals.join(".*")))
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| Error::InvalidQuery(format!("name `{glob}`: {e}")))?;
        Ok(Self { glob: glob.to_owned(), case_sensitive, regex })
    }

    pub fn glob(&self) -> &str {
        &self.glob
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name.trim_start_matches('/'))
    }
}

impl QueryOptions {
    /// Reads options out of the request arguments. Unknown arguments are
    /// ignored; malformed known ones are an [`Error::InvalidQuery`].
    pub fn from_args(args: &Map<String, Value>) -> Result<Self, Error> {
        let mut opts = Self::default();
        for (key, value) in args {
            match key.as_str() {
                "hide" | "h" => {
                    let text = value_text(value);
                    let valid = !text.is_empty()
                        && text.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ',' | ';'));
                    if !valid {
                        return Err(Error::InvalidQuery(format!("hide flags `{text}`")));
                    }
                    for flag in flags(&text, &["methods", "branches"])? {
                        match flag {
                            "methods" => opts.hide_methods = true,
                            _         => opts.hide_branches = true,
                        }
                    }
                }
                "recurse" | "r" => opts.recurse = truthy(value),
                "verbose" | "v" => opts.verbose = truthy(value),
                "name" | "n" => opts.search = Some(parse_search(&value_text(value))?),
                _ => {}
            }
        }
        Ok(opts)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A flag given with no value (`?verbose`) arrives as an empty string and
/// counts as set.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !matches!(s.as_str(), "0" | "false"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Splits a flag list on `,` or `;`, accepting full names or their first
/// letter. A single unrecognized token is retried one character per flag, so
/// `hide=mb` works.
fn flags<'a>(text: &str, names: &[&'a str]) -> Result<Vec<&'a str>, Error> {
    let lookup = |token: &str| {
        names.iter().copied().find(|name| *name == token || name.get(..1) == Some(token))
    };
    let tokens: Vec<&str> = text.split([',', ';']).filter(|t| !t.is_empty()).collect();

    let direct: Option<Vec<&'a str>> = tokens.iter().map(|t| lookup(t)).collect();
    if let Some(found) = direct {
        return Ok(found);
    }
    if tokens.len() == 1 {
        let mut buf = [0u8; 4];
        let by_char: Option<Vec<&'a str>> =
            tokens[0].chars().map(|c| lookup(c.encode_utf8(&mut buf))).collect();
        if let Some(found) = by_char {
            return Ok(found);
        }
    }
    Err(Error::InvalidQuery(format!("unknown flag in `{text}`")))
}

/// `name=*bob*%compare-case`: a glob plus optional flags after `%`.
fn parse_search(text: &str) -> Result<NameFilter, Error> {
    let (glob, flag_text) = match text.split_once('%') {
        Some((glob, flags)) => (glob, Some(flags)),
        None => (text, None),
    };
    let glob_ok = glob.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '*');
    if !glob_ok {
        return Err(Error::InvalidQuery(format!("name to search for `{text}`")));
    }
    let case_sensitive = match flag_text {
        Some(f) => !flags(f, &["compare-case"])?.is_empty(),
        None => false,
    };
    NameFilter::new(glob, case_sensitive)
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// The principal looking, for `accessible` flags in verbose output.
#[derive(Clone, Copy)]
pub struct Viewer<'a> {
    pub access: &'a AccessController,
    pub principal: &'a str,
}

/// Builds introspection payloads.
pub struct Describer<'a> {
    pub options: &'a QueryOptions,
    pub viewer: Option<Viewer<'a>>,
    /// Name of the fallback method; listed under `*` when a branch has one.
    pub fallback: &'a str,
}

impl Describer<'_> {
    /// Describes `branch`, reached by consuming `prefix`.
    pub fn branch(&self, branch: &dyn Branch, prefix: &ParsedPath) -> Result<Value, Error> {
        let mut data = Map::new();
        data.insert("name".into(), json!(branch.name()));
        data.insert("description".into(), json!(branch.description()));

        if !self.options.hide_branches {
            let mut routes = Map::new();
            for route in crate::path::ordered(branch.routes(), |r| &r.pattern) {
                if !self.listed(route.pattern.as_str()) {
                    continue;
                }
                let target = route.resolve_target(branch)?;
                let entry = if self.options.recurse {
                    let nested = join(prefix, route.pattern.as_str());
                    self.branch(target.as_ref(), &nested)?
                } else {
                    json!(target.description())
                };
                routes.insert(route.pattern.to_string(), entry);
            }
            data.insert("routes".into(), Value::Object(routes));
        }

        if !self.options.hide_methods {
            let mut methods = Map::new();
            let handlers = branch.handlers();
            for verb in handlers.verbs() {
                let mut entries = Map::new();
                for entry in crate::path::ordered(handlers.get(verb), |h| &h.pattern) {
                    let method = lookup(branch, &entry.method)?;
                    if !method.is_public() {
                        continue;
                    }
                    if !self.listed(entry.pattern.as_str()) && !self.listed(method.name()) {
                        continue;
                    }
                    let endpoint = join(prefix, entry.pattern.as_str());
                    let info = if self.options.verbose {
                        self.method_info(method, &endpoint)?
                    } else {
                        json!(method.spec().description)
                    };
                    entries.insert(entry.pattern.to_string(), info);
                }
                if !entries.is_empty() {
                    methods.insert(verb.to_string(), Value::Object(entries));
                }
            }
            if let Some(fallback) = branch.method(self.fallback) {
                methods.insert("*".into(), json!(fallback.spec().description));
            }
            data.insert("methods".into(), Value::Object(methods));
        }

        Ok(Value::Object(data))
    }

    /// Describes one method of `branch` in full.
    pub fn method(&self, branch: &dyn Branch, name: &str, prefix: &ParsedPath) -> Result<Value, Error> {
        let method = lookup(branch, name)?;
        self.method_info(method, &join(prefix, name))
    }

    fn method_info(&self, method: &Method, endpoint: &ParsedPath) -> Result<Value, Error> {
        let mut info = serde_json::to_value(method.spec())
            .map_err(|e| Error::Configuration(format!("describing `{}`: {e}", method.name())))?;
        if let (Some(viewer), Value::Object(map)) = (self.viewer, &mut info) {
            let accessible = viewer.access.check_access(&endpoint.to_relative(), viewer.principal)?;
            map.insert("accessible".into(), json!(accessible));
        }
        Ok(info)
    }

    fn listed(&self, name: &str) -> bool {
        self.options.search.as_ref().is_none_or(|f| f.matches(name))
    }
}

fn lookup<'b>(branch: &'b dyn Branch, name: &str) -> Result<&'b Method, Error> {
    branch.method(name).ok_or_else(|| {
        Error::Configuration(format!("unable to locate method `{name}` on `{}`", branch.name()))
    })
}

fn join(prefix: &ParsedPath, tail: &str) -> ParsedPath {
    ParsedPath::parse(&format!("{prefix}/{tail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::method::{MethodSpec, ParamSpec};
    use crate::Node;

    async fn noop(_call: crate::Call) -> Result<Value, BoxError> {
        Ok(Value::Null)
    }

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    fn account() -> Node {
        let users = Node::builder("users")
            .describe("Account users")
            .get("/", "list")
            .method(MethodSpec::new("list").describe("List users"), noop)
            .build()
            .unwrap();
        Node::builder("account")
            .describe("Customer accounts")
            .child("users", users)
            .route("/:account/users", "users")
            .get("/:account", "get")
            .get("/_secret", "_secret")
            .method(
                MethodSpec::new("get")
                    .describe("Fetch one account")
                    .param(ParamSpec::required("account").kind("number")),
                noop,
            )
            .method(MethodSpec::new("_secret"), noop)
            .method(MethodSpec::new("_fallback").describe("Anything else"), noop)
            .build()
            .unwrap()
    }

    fn describe(opts: &QueryOptions) -> Value {
        Describer { options: opts, viewer: None, fallback: "_fallback" }
            .branch(&account(), &ParsedPath::parse("/account"))
            .unwrap()
    }

    #[test]
    fn plain_description() {
        let v = describe(&QueryOptions::default());
        assert_eq!(v["name"], "account");
        assert_eq!(v["routes"]["/:account/users"], "Account users");
        assert_eq!(v["methods"]["GET"]["/:account"], "Fetch one account");
        assert_eq!(v["methods"]["*"], "Anything else");
        assert!(v["methods"]["GET"].get("/_secret").is_none());
    }

    #[test]
    fn hide_and_recurse() {
        let opts = QueryOptions::from_args(&args(&[("h", json!("m")), ("recurse", json!(true))])).unwrap();
        let v = describe(&opts);
        assert!(v.get("methods").is_none());

        // Options apply at every level of the recursion.
        let nested = &v["routes"]["/:account/users"];
        assert_eq!(nested["name"], "users");
        assert!(nested["routes"].as_object().unwrap().is_empty());
        assert!(nested.get("methods").is_none());
    }

    #[test]
    fn recurse_nests_full_descriptions() {
        let opts = QueryOptions::from_args(&args(&[("r", json!("1"))])).unwrap();
        let v = describe(&opts);
        assert_eq!(v["routes"]["/:account/users"]["methods"]["GET"]["/"], "List users");
    }

    #[test]
    fn verbose_lists_params() {
        let opts = QueryOptions::from_args(&args(&[("v", json!(""))])).unwrap();
        let v = describe(&opts);
        let get = &v["methods"]["GET"]["/:account"];
        assert_eq!(get["name"], "get");
        assert_eq!(get["params"][0]["name"], "account");
        assert_eq!(get["params"][0]["type"], "number");
    }

    #[test]
    fn name_filter_globs() {
        let opts = QueryOptions::from_args(&args(&[("name", json!("g*"))])).unwrap();
        let v = describe(&opts);
        assert!(v["routes"].as_object().unwrap().is_empty());
        assert_eq!(v["methods"]["GET"]["/:account"], "Fetch one account");
    }

    #[test]
    fn flag_parsing() {
        let opts = QueryOptions::from_args(&args(&[("hide", json!("mb"))])).unwrap();
        assert!(opts.hide_methods && opts.hide_branches);
        let opts = QueryOptions::from_args(&args(&[("hide", json!("branches"))])).unwrap();
        assert!(opts.hide_branches && !opts.hide_methods);
        let opts = QueryOptions::from_args(&args(&[("hide", json!("methods;branches"))])).unwrap();
        assert!(opts.hide_methods && opts.hide_branches);
        let opts = QueryOptions::from_args(&args(&[("h", json!("m,b"))])).unwrap();
        assert!(opts.hide_methods && opts.hide_branches);
        assert!(QueryOptions::from_args(&args(&[("hide", json!("x"))])).is_err());
        assert!(QueryOptions::from_args(&args(&[("name", json!("a b"))])).is_err());

        let opts = QueryOptions::from_args(&args(&[("n", json!("Get*%c"))])).unwrap();
        let search = opts.search.unwrap();
        assert!(search.is_case_sensitive());
        assert!(search.matches("GetUser"));
        assert!(!search.matches("getUser"));
    }
}
