//! Dispatch input and method-call types.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::dispatcher::Context;
use crate::verb::Verb;

/// A request to dispatch: verb, path, arguments and the calling principal.
///
/// Arguments come from wherever the transport found them (query string,
/// body). Route captures are added by the dispatcher and win over arguments
/// of the same name.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) verb: Verb,
    pub(crate) path: String,
    pub(crate) args: Map<String, Value>,
    pub(crate) principal: Option<String>,
}

impl Request {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self { verb, path: path.into(), args: Map::new(), principal: None }
    }

    /// Adds one argument. Returns `self` for chaining.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Merges a whole argument map; later values replace earlier ones.
    pub fn args(mut self, args: Map<String, Value>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn verb(&self) -> Verb { self.verb }
    pub fn path(&self) -> &str { &self.path }
    pub fn arguments(&self) -> &Map<String, Value> { &self.args }
    pub fn principal_name(&self) -> Option<&str> { self.principal.as_deref() }
}

impl Verb {
    /// Shorthand for `Request::new(self, path)`.
    pub fn request(self, path: impl Into<String>) -> Request {
        Request::new(self, path)
    }
}

/// What a method receives when it is invoked.
pub struct Call {
    pub(crate) args: Map<String, Value>,
    pub(crate) raw: Map<String, Value>,
    pub(crate) principal: Option<String>,
    pub(crate) unmatched: Option<String>,
    pub(crate) context: Arc<Context>,
}

impl Call {
    /// A bound argument: one of the method's declared parameters.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// A bound argument as a string slice, if it is a JSON string.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    /// A bound argument deserialized into `T`.
    ///
    /// Route captures are always strings, so a string that fails to
    /// deserialize directly is retried as JSON text (`"157"` becomes `157`).
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, serde_json::Error> {
        let Some(value) = self.args.get(name) else {
            return Ok(None);
        };
        match serde_json::from_value::<T>(value.clone()) {
            Ok(v) => Ok(Some(v)),
            Err(e) => match value.as_str() {
                Some(text) => serde_json::from_str(text).map(Some).map_err(|_| e),
                None => Err(e),
            },
        }
    }

    /// Every bound argument.
    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// Everything the caller supplied, declared or not, with route captures
    /// merged in.
    pub fn raw_args(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// For fallback methods: the part of the path no pattern matched.
    pub fn unmatched(&self) -> Option<&str> {
        self.unmatched.as_deref()
    }

    /// The service context this call runs in.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }
}
