//! Branch methods and their parameter descriptors.
//!
//! Every method is registered with an explicit [`MethodSpec`]: its name, a
//! one-line description, its formal parameters, and whether it may be called
//! from outside. The dispatcher binds request arguments against the
//! parameters and uses their descriptions to explain what is missing.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::handler::{BoxedHandler, Handler};

/// One formal parameter of a method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// A required parameter.
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), optional: false, default: None, kind: None, description: None }
    }

    /// An optional parameter with no default. Left unbound when absent.
    pub fn optional(name: impl Into<String>) -> Self {
        Self { optional: true, ..Self::required(name) }
    }

    /// An optional parameter that takes `default` when absent.
    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self { optional: true, default: Some(default.into()), ..Self::required(name) }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registration-time metadata for a method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    #[serde(skip)]
    pub hidden: bool,
}

impl MethodSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
            returns: None,
            hidden: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, kind: impl Into<String>) -> Self {
        self.returns = Some(kind.into());
        self
    }

    /// Marks the method as internal: it stays callable by the framework (as a
    /// fallback, say) but is never reachable by a request.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Public methods are neither flagged hidden nor named with a leading
    /// underscore.
    pub fn is_public(&self) -> bool {
        !self.hidden && !self.name.starts_with('_')
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// A registered method: descriptor plus callable.
#[derive(Clone)]
pub struct Method {
    spec: MethodSpec,
    handler: BoxedHandler,
}

impl Method {
    pub fn new(spec: MethodSpec, handler: impl Handler) -> Self {
        Self { spec, handler: handler.into_boxed_handler() }
    }

    pub fn spec(&self) -> &MethodSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_public(&self) -> bool {
        self.spec.is_public()
    }

    pub(crate) fn handler(&self) -> &BoxedHandler {
        &self.handler
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method").field("spec", &self.spec).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscore_and_hidden_methods_are_private() {
        assert!(MethodSpec::new("login").is_public());
        assert!(!MethodSpec::new("_reset").is_public());
        assert!(!MethodSpec::new("purge").hidden().is_public());
    }

    #[test]
    fn param_builders() {
        let p = ParamSpec::with_default("limit", 20).kind("number").describe("Page size");
        assert!(p.optional);
        assert_eq!(p.default, Some(Value::from(20)));
        assert_eq!(p.kind.as_deref(), Some("number"));
        assert!(!ParamSpec::required("id").optional);
        assert_eq!(ParamSpec::optional("q").default, None);
    }
}
