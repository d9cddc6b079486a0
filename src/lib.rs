//! # arbor
//!
//! Branch-tree request routing for JSON services.
//!
//! A service is a tree of *branches*. Each branch delegates path prefixes to
//! child branches (its routes) and answers `(verb, pattern)` pairs with its
//! own methods (its handlers). A request walks down the tree, collecting
//! `:name` captures on the way, until a handler matches.
//!
//! ## What arbor does
//!
//! - Ordered pattern matching: literal segments first, then `:param` and
//!   `*wildcard` ones, declaration order otherwise.
//! - Parameter binding against each method's declared parameters, with a
//!   precise report of whatever is missing.
//! - Per-principal ACL rules, evaluated in order, deny short-circuiting.
//! - Self-description: `GET /any/branch/?` explains what lives there.
//! - Fallback methods for whatever no pattern matched.
//! - A hyper server with graceful shutdown (SIGTERM / Ctrl-C).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use arbor::{BoxError, Call, Config, Dispatcher, MethodSpec, Node, ParamSpec, Server};
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), arbor::Error> {
//!     let users = Node::builder("users")
//!         .describe("User accounts")
//!         .get("/:id", "get")
//!         .method(MethodSpec::new("get").param(ParamSpec::required("id")), get_user)
//!         .build()?;
//!
//!     let root = Node::builder("service")
//!         .child("users", users)
//!         .route("/users", "users")
//!         .build()?;
//!
//!     let config = Config::default();
//!     let server = Server::from_config(&config.server)?;
//!     server.serve(Dispatcher::new(root, config)?).await
//! }
//!
//! async fn get_user(call: Call) -> Result<Value, BoxError> {
//!     Ok(json!({ "id": call.str("id") }))
//! }
//! ```

mod acl;
mod branch;
mod config;
mod dispatcher;
mod error;
mod framework;
mod handler;
mod introspect;
mod method;
mod request;
mod resolve;
mod response;
mod server;
mod verb;

pub mod path;

pub use acl::{AccessController, AclRule, AclStore, Anchor, MemoryAclStore};
pub use branch::{Branch, HandlerEntry, HandlerTable, Node, NodeBuilder, Route, RouteTarget};
pub use config::{AclConfig, Config, DEFAULT_FALLBACK_METHOD, DEFAULT_INTERNAL_NAMESPACE, ServerConfig};
pub use dispatcher::{Context, Dispatcher, Outcome};
pub use error::{BoxError, Error, MissingParam, Result};
pub use handler::{Handler, IntoReply, Reply};
pub use introspect::{NameFilter, QueryOptions};
pub use method::{Method, MethodSpec, ParamSpec};
pub use request::{Call, Request};
pub use resolve::{Endpoint, Introspect, MAX_DEPTH, Miss, Resolution, resolve};
pub use response::{IntoResponse, Response};
pub use server::Server;
pub use verb::{UnknownVerb, Verb};
