//! Access control.
//!
//! Each principal owns an ordered list of rule strings:
//!
//! ```text
//! [!][#]/body     prefix rule: body must match at the start of the path
//! [!][#]//body    boundary rule: body must match right after a `/` or `.`
//! ```
//!
//! A leading `!` makes the rule a deny rule. A leading `#` lets the rule
//! apply to framework-internal paths, which plain rules never touch. In the
//! body `*` matches any run of characters; everything else is literal.
//! Matching is case-insensitive unless configured otherwise, and is never
//! anchored at the end, so `/users` also covers `users/42`.
//!
//! Rules are evaluated in declaration order. A matching deny rule ends
//! evaluation with a refusal. A matching allow rule only records the grant
//! and evaluation continues, so a later deny still revokes it. With no match
//! at all, access is refused.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error;

// ── Rules ─────────────────────────────────────────────────────────────────────

/// How a rule body is positioned against the endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `/body`: at the start of the path.
    Prefix,
    /// `//body`: after any `/` or `.` in the path.
    Boundary,
}

/// A parsed, compiled ACL rule.
#[derive(Clone)]
pub struct AclRule {
    source: String,
    deny: bool,
    framework: bool,
    anchor: Anchor,
    regex: Regex,
}

impl AclRule {
    /// Parses and compiles one rule string.
    ///
    /// A body that starts with neither `/` nor `//`, or is empty after its
    /// anchor, is an [`Error::InvalidAcl`].
    pub fn parse(rule: &str, case_sensitive: bool) -> Result<Self, Error> {
        let (deny, rest) = match rule.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, rule),
        };
        let (framework, rest) = match rest.strip_prefix('#') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };

        let (anchor, body) = if rest.len() > 2 && rest.starts_with("//") {
            (Anchor::Boundary, &rest[2..])
        } else if rest.len() > 1 && rest.starts_with('/') {
            (Anchor::Prefix, &rest[1..])
        } else {
            return Err(Error::InvalidAcl {
                rule: rule.to_owned(),
                reason: "expected `/` or `//` followed by a path".to_owned(),
            });
        };

        let mut pattern = String::from(match anchor {
            Anchor::Prefix   => "^",
            Anchor::Boundary => "[./]",
        });
        let literals: Vec<String> = body.split('*').map(regex::escape).collect();
        pattern.push_str(&literals.join(".*"));

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| Error::InvalidAcl { rule: rule.to_owned(), reason: e.to_string() })?;

        Ok(Self { source: rule.to_owned(), deny, framework, anchor, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_deny(&self) -> bool {
        self.deny
    }

    /// Whether the rule carries `#` and so applies to framework paths.
    pub fn applies_to_framework(&self) -> bool {
        self.framework
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn matches(&self, endpoint: &str) -> bool {
        self.regex.is_match(endpoint)
    }
}

impl fmt::Debug for AclRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclRule")
            .field("source", &self.source)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Supplies each principal's raw rule list, in declaration order.
pub trait AclStore: Send + Sync + 'static {
    /// Rules for `principal`. Unknown principals have none.
    fn rules(&self, principal: &str) -> Vec<String>;
}

/// An [`AclStore`] held in memory, typically loaded from [`Config`].
#[derive(Debug, Clone, Default)]
pub struct MemoryAclStore {
    rules: HashMap<String, Vec<String>>,
}

impl MemoryAclStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule list for `principal`, replacing any previous list.
    pub fn with(mut self, principal: impl Into<String>, rules: &[&str]) -> Self {
        self.insert(principal, rules.iter().map(|r| (*r).to_owned()).collect());
        self
    }

    pub fn insert(&mut self, principal: impl Into<String>, rules: Vec<String>) {
        self.rules.insert(principal.into(), rules);
    }
}

impl From<HashMap<String, Vec<String>>> for MemoryAclStore {
    fn from(rules: HashMap<String, Vec<String>>) -> Self {
        Self { rules }
    }
}

impl AclStore for MemoryAclStore {
    fn rules(&self, principal: &str) -> Vec<String> {
        self.rules.get(principal).cloned().unwrap_or_default()
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

/// Decides whether a principal may reach an endpoint path.
///
/// Rules are compiled the first time they are evaluated and kept, keyed by
/// their text, for the controller's lifetime. Clones share the cache.
#[derive(Clone)]
pub struct AccessController {
    store: Arc<dyn AclStore>,
    service_identity: String,
    internal_namespace: String,
    case_sensitive: bool,
    compiled: Arc<DashMap<String, AclRule>>,
}

impl AccessController {
    /// `service_identity` is the principal the service acts as; it is never
    /// refused.
    pub fn new(store: impl AclStore, service_identity: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            service_identity: service_identity.into(),
            internal_namespace: crate::config::DEFAULT_INTERNAL_NAMESPACE.to_owned(),
            case_sensitive: false,
            compiled: Arc::new(DashMap::new()),
        }
    }

    /// A controller over the rules listed in `config.acl.rules`.
    /// Every configured rule is compiled up front; invalid ones are left
    /// for [`check_access`](Self::check_access) to report.
    pub fn from_config(config: &Config) -> Self {
        let controller = Self::new(MemoryAclStore::from(config.acl.rules.clone()), config.service_name.clone())
            .internal_namespace(config.internal_namespace.clone())
            .case_sensitive(config.acl.case_sensitive);
        for raw in config.acl.rules.values().flatten() {
            if let Ok(rule) = AclRule::parse(raw, controller.case_sensitive) {
                controller.compiled.insert(raw.clone(), rule);
            }
        }
        controller
    }

    pub fn internal_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.internal_namespace = namespace.into();
        self
    }

    /// Drops any rules compiled under the previous setting.
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        if self.case_sensitive != yes {
            self.case_sensitive = yes;
            self.compiled = Arc::new(DashMap::new());
        }
        self
    }

    /// Number of distinct rules compiled so far.
    pub fn compiled_rules(&self) -> usize {
        self.compiled.len()
    }

    pub fn service_identity(&self) -> &str {
        &self.service_identity
    }

    /// True when `endpoint` lives under the framework's internal namespace.
    pub fn is_internal(&self, endpoint: &str) -> bool {
        endpoint
            .trim_start_matches('/')
            .split('/')
            .next()
            .is_some_and(|first| first == self.internal_namespace)
    }

    /// Evaluates `principal`'s rules against `endpoint`.
    ///
    /// `endpoint` is a path such as `account/157/domain`; a leading `/` is
    /// ignored. An invalid rule is reported only if evaluation reaches it.
    pub fn check_access(&self, endpoint: &str, principal: &str) -> Result<bool, Error> {
        if principal == self.service_identity {
            return Ok(true);
        }

        let endpoint = endpoint.trim_start_matches('/');
        let internal = self.is_internal(endpoint);
        let mut granted = false;

        for raw in self.store.rules(principal) {
            let (framework, deny, matched) = self
                .with_rule(&raw, |rule| (rule.applies_to_framework(), rule.is_deny(), rule.matches(endpoint)))
                .inspect_err(|e| warn!(%principal, error = %e, "invalid ACL rule"))?;
            if internal && !framework {
                continue;
            }
            if !matched {
                continue;
            }
            if deny {
                debug!(%principal, %endpoint, rule = %raw, "denied by rule");
                return Ok(false);
            }
            debug!(%principal, %endpoint, rule = %raw, "granted by rule");
            granted = true;
        }

        Ok(granted)
    }

    fn with_rule<T>(&self, raw: &str, f: impl FnOnce(&AclRule) -> T) -> Result<T, Error> {
        if let Some(rule) = self.compiled.get(raw) {
            return Ok(f(&rule));
        }
        let rule = AclRule::parse(raw, self.case_sensitive)?;
        let out = f(&rule);
        self.compiled.insert(raw.to_owned(), rule);
        Ok(out)
    }
}

impl fmt::Debug for AccessController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessController")
            .field("service_identity", &self.service_identity)
            .field("internal_namespace", &self.internal_namespace)
            .field("case_sensitive", &self.case_sensitive)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(rules: &[&str]) -> AccessController {
        AccessController::new(MemoryAclStore::new().with("bob", rules), "service")
    }

    #[test]
    fn deny_wins_in_either_order() {
        let acl = controller(&["/foo/*", "!/foo/bar"]);
        assert!(!acl.check_access("foo/bar", "bob").unwrap());
        assert!(acl.check_access("foo/baz", "bob").unwrap());

        let acl = controller(&["!/foo/bar", "/foo/*"]);
        assert!(!acl.check_access("foo/bar", "bob").unwrap());
        assert!(acl.check_access("foo/baz", "bob").unwrap());
    }

    #[test]
    fn boundary_anchor_matches_mid_path() {
        let acl = controller(&["//admin"]);
        assert!(acl.check_access("service/admin/panel", "bob").unwrap());
        assert!(!acl.check_access("service/superadmin", "bob").unwrap());

        let acl = controller(&["/admin"]);
        assert!(!acl.check_access("service/admin/panel", "bob").unwrap());
        assert!(acl.check_access("admin/panel", "bob").unwrap());
    }

    #[test]
    fn case_insensitive_by_default() {
        assert!(controller(&["/Foo"]).check_access("foo/x", "bob").unwrap());
        let strict = controller(&["/Foo"]).case_sensitive(true);
        assert!(!strict.check_access("foo/x", "bob").unwrap());
    }

    #[test]
    fn no_rules_means_no_access() {
        assert!(!controller(&[]).check_access("anything", "bob").unwrap());
        assert!(!controller(&["/foo"]).check_access("anything", "nobody").unwrap());
    }

    #[test]
    fn service_identity_skips_rules() {
        let acl = controller(&["!/*"]);
        assert!(acl.check_access("foo", "service").unwrap());
    }

    #[test]
    fn framework_paths_need_hash_rules() {
        let acl = controller(&["/*"]);
        assert!(!acl.check_access("_arbor/whoami", "bob").unwrap());
        let acl = controller(&["#/_arbor/*"]);
        assert!(acl.check_access("_arbor/whoami", "bob").unwrap());
        let acl = controller(&["#/*", "!#/_arbor/config"]);
        assert!(!acl.check_access("_arbor/config", "bob").unwrap());
    }

    #[test]
    fn invalid_anchor_is_a_configuration_error() {
        let err = controller(&["admin"]).check_access("admin", "bob").unwrap_err();
        assert!(err.is_configuration());
        assert!(AclRule::parse("/", false).is_err());
        assert!(AclRule::parse("!#", false).is_err());
    }

    #[test]
    fn question_marks_and_dots_are_literal() {
        let rule = AclRule::parse("/users/?", false).unwrap();
        assert!(rule.matches("users/?"));
        assert!(!rule.matches("users/x"));
        let rule = AclRule::parse("/a.b", false).unwrap();
        assert!(!rule.matches("axb"));
    }

    #[test]
    fn leading_slash_on_endpoint_is_ignored() {
        assert!(controller(&["/foo"]).check_access("/foo", "bob").unwrap());
    }

    #[test]
    fn rules_compile_once_per_text() {
        let acl = controller(&["/foo/*", "!/foo/bar"]);
        assert_eq!(acl.compiled_rules(), 0);
        for _ in 0..3 {
            acl.check_access("foo/baz", "bob").unwrap();
        }
        assert_eq!(acl.compiled_rules(), 2);

        let shared = acl.clone();
        shared.check_access("foo/bar", "bob").unwrap();
        assert_eq!(acl.compiled_rules(), 2);
    }

    #[test]
    fn configured_rules_are_compiled_up_front() {
        let mut config = Config::default();
        config.acl.rules.insert("bob".into(), vec!["/foo/*".into(), "//admin".into()]);
        config.acl.rules.insert("eve".into(), vec!["/foo/*".into()]);
        let acl = AccessController::from_config(&config);
        assert_eq!(acl.compiled_rules(), 2);
        assert!(acl.check_access("foo/x", "eve").unwrap());
        assert_eq!(acl.compiled_rules(), 2);
    }

    #[test]
    fn changing_case_sensitivity_recompiles() {
        let acl = controller(&["/Foo"]);
        assert!(acl.check_access("foo", "bob").unwrap());
        let strict = acl.case_sensitive(true);
        assert_eq!(strict.compiled_rules(), 0);
        assert!(!strict.check_access("foo", "bob").unwrap());
    }

    #[test]
    fn parse_exposes_flags() {
        let rule = AclRule::parse("!#//x*", false).unwrap();
        assert!(rule.is_deny());
        assert!(rule.applies_to_framework());
        assert_eq!(rule.anchor(), Anchor::Boundary);
        assert_eq!(rule.as_str(), "!#//x*");
    }
}
