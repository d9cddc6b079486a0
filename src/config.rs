//! Service configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! service_name = "billing"
//! introspection = true
//!
//! [acl]
//! enabled = true
//! deny_as_not_found = true
//!
//! [acl.rules]
//! alice = ["/account/*", "!/account/*/purge"]
//! ops   = ["#/_arbor/*", "//status"]
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::acl::AclRule;
use crate::error::Error;

pub const DEFAULT_INTERNAL_NAMESPACE: &str = "_arbor";
pub const DEFAULT_FALLBACK_METHOD: &str = "_fallback";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// The identity the service acts as. Requests made under this principal
    /// bypass every ACL rule.
    pub service_name: String,

    /// First path segment of the framework's own endpoints.
    pub internal_namespace: String,

    /// Name of the method a branch may define to answer paths nothing else
    /// matched.
    pub fallback_method: String,

    /// Whether `.../?` requests are answered.
    pub introspection: bool,

    pub acl: AclConfig,

    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "service".to_owned(),
            internal_namespace: DEFAULT_INTERNAL_NAMESPACE.to_owned(),
            fallback_method: DEFAULT_FALLBACK_METHOD.to_owned(),
            introspection: true,
            acl: AclConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Access-control settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AclConfig {
    /// When false, every request is allowed and `rules` is ignored.
    pub enabled: bool,

    pub case_sensitive: bool,

    /// Answer refusals as `NotFound`, so callers cannot probe which
    /// endpoints exist.
    pub deny_as_not_found: bool,

    /// Principal used for requests that carry no identity.
    pub anonymous: String,

    /// Principal name to ordered rule list.
    pub rules: HashMap<String, Vec<String>>,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            case_sensitive: false,
            deny_as_not_found: false,
            anonymous: "guest".to_owned(),
            rules: HashMap::new(),
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,

    /// Header carrying the authenticated principal, set by whatever
    /// authenticates in front of the service.
    pub principal_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_owned(),
            principal_header: "x-arbor-principal".to_owned(),
        }
    }
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|source| Error::ConfigRead { path: path.to_owned(), source })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), service = %config.service_name, "configuration loaded");
        Ok(config)
    }

    /// Rejects settings the dispatcher cannot work with, and compiles every
    /// configured ACL rule so a bad one fails at startup.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: &str| Err(Error::Configuration(msg.to_owned()));

        if self.service_name.is_empty() {
            return invalid("service_name must not be empty");
        }
        if self.internal_namespace.is_empty() || self.internal_namespace.contains('/') {
            return invalid("internal_namespace must be a single non-empty path segment");
        }
        if self.fallback_method.is_empty() {
            return invalid("fallback_method must not be empty");
        }
        for rules in self.acl.rules.values() {
            for rule in rules {
                AclRule::parse(rule, self.acl.case_sensitive)?;
            }
        }
        Ok(())
    }
}
