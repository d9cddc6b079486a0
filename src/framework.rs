//! The framework's own endpoints, mounted at the internal namespace
//! (`/_arbor` by default).
//!
//! | Endpoint            | Answer                                           |
//! |---------------------|--------------------------------------------------|
//! | `GET /_arbor/whoami`| the principal the request runs as                |
//! | `GET /_arbor/api`   | recursive introspection of the whole service     |
//! | `GET /_arbor/config`| the non-secret part of the configuration         |
//!
//! These paths are framework-internal, so only `#` ACL rules reach them.

use serde_json::{Value, json};

use crate::branch::Node;
use crate::error::{BoxError, Error};
use crate::introspect::{Describer, QueryOptions, Viewer};
use crate::method::{MethodSpec, ParamSpec};
use crate::path::ParsedPath;
use crate::request::Call;

pub(crate) fn branch() -> Result<Node, Error> {
    Node::builder("framework")
        .describe("Built-in service endpoints")
        .get("/whoami", "whoami")
        .get("/api", "api")
        .get("/config", "config")
        .method(
            MethodSpec::new("whoami")
                .describe("The principal this request runs as")
                .returns("object"),
            whoami,
        )
        .method(
            MethodSpec::new("api")
                .describe("Every branch, route and method of the service")
                .param(ParamSpec::with_default("verbose", false).kind("bool").describe("Include method parameters"))
                .returns("object"),
            api,
        )
        .method(
            MethodSpec::new("config")
                .describe("Service configuration, without ACL rules")
                .returns("object"),
            config,
        )
        .build()
}

async fn whoami(call: Call) -> Result<Value, BoxError> {
    let ctx = call.context();
    Ok(json!({
        "principal": ctx.effective_principal(call.principal()),
        "authenticated": call.principal().is_some(),
        "service": call.principal() == Some(ctx.config().service_name.as_str()),
    }))
}

async fn api(call: Call) -> Result<Value, BoxError> {
    let ctx = call.context();
    let mut options = QueryOptions::from_args(call.raw_args())?;
    options.recurse = true;

    let describer = Describer {
        options: &options,
        viewer: ctx.access().map(|access| Viewer {
            access,
            principal: ctx.effective_principal(call.principal()),
        }),
        fallback: &ctx.config().fallback_method,
    };
    Ok(describer.branch(ctx.root().as_ref(), &ParsedPath::default())?)
}

async fn config(call: Call) -> Result<Value, BoxError> {
    let config = call.context().config();
    Ok(json!({
        "service_name": config.service_name,
        "internal_namespace": config.internal_namespace,
        "fallback_method": config.fallback_method,
        "introspection": config.introspection,
        "acl": {
            "enabled": call.context().access().is_some(),
            "case_sensitive": config.acl.case_sensitive,
            "deny_as_not_found": config.acl.deny_as_not_found,
            "anonymous": config.acl.anonymous,
            "principals": config.acl.rules.len(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::Branch;
    use crate::verb::Verb;

    #[test]
    fn framework_branch_builds() {
        let node = branch().unwrap();
        let gets: Vec<_> = node.handlers().get(Verb::Get).iter().map(|h| h.method.as_str()).collect();
        assert_eq!(gets, ["whoami", "api", "config"]);
        assert!(node.routes().is_empty());
    }
}
