//! HTTP transport and graceful shutdown.
//!
//! # Request mapping
//!
//! - The HTTP method becomes the [`Verb`]; anything else is `405`.
//! - The URI path is dispatched as-is. Introspection needs a literal `?`
//!   segment, which a URI can only carry encoded: `GET /account/%3F?v=1`.
//!   As a shorthand, a path ending in `/` followed by an empty query
//!   (`GET /account/?`) is read the same way.
//! - Query pairs and the fields of a JSON-object body become arguments; body
//!   fields win over query pairs of the same name.
//! - The configured principal header names the caller.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::verb::Verb;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// let server = arbor::Server::bind("0.0.0.0:3000").unwrap();
    /// # let _ = server;
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Configuration(format!("invalid bind address `{addr}`: {e}")))?;
        Ok(Self { addr })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        Self::bind(&config.bind)
    }

    /// Starts accepting connections and dispatching them through
    /// `dispatcher`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            service = %dispatcher.config().service_name,
            "arbor listening"
        );

        // Tracks every connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = dispatcher.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            async move { handle(dispatcher, req, remote_addr).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("arbor stopped");
        Ok(())
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Turns one HTTP request into one dispatch and one response.
///
/// Every failure becomes a response, so hyper never sees an error.
async fn handle(
    dispatcher: Dispatcher,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();

    let verb = match Verb::try_from(&parts.method) {
        Ok(verb) => verb,
        Err(e) => {
            let res = Response::failure(StatusCode::METHOD_NOT_ALLOWED, &e.to_string(), &Value::Null);
            return Ok(res.into_inner());
        }
    };

    let mut args = query_args(&parts.uri);
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %remote_addr, "reading request body: {e}");
            let res = Response::failure(StatusCode::BAD_REQUEST, "unreadable request body", &Value::Null);
            return Ok(res.into_inner());
        }
    };
    match body_args(&bytes) {
        Ok(fields) => args.extend(fields),
        Err(reason) => {
            let res = Response::failure(StatusCode::BAD_REQUEST, reason, &Value::Null);
            return Ok(res.into_inner());
        }
    }

    let path = request_path(&parts.uri);
    let mut request = Request::new(verb, path.clone()).args(args);
    let header = &dispatcher.config().server.principal_header;
    if let Some(principal) = parts
        .headers
        .get(header.as_str())
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        request = request.principal(principal);
    }

    let res = dispatcher.dispatch(request).await.into_response();
    debug!(peer = %remote_addr, %verb, %path, status = res.status().as_u16(), "request served");
    Ok(res.into_inner())
}

/// The URI path with encoded `?` segments restored.
fn request_path(uri: &Uri) -> String {
    let mut path = uri
        .path()
        .split('/')
        .map(|segment| if segment.eq_ignore_ascii_case("%3F") { "?" } else { segment })
        .collect::<Vec<_>>()
        .join("/");
    if uri.query() == Some("") && uri.path().ends_with('/') {
        path.push('?');
    }
    path
}

fn query_args(uri: &Uri) -> Map<String, Value> {
    uri.query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect()
        })
        .unwrap_or_default()
}

fn body_args(bytes: &[u8]) -> Result<Map<String, Value>, &'static str> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err("request body must be a JSON object"),
        Err(_) => Err("request body is not valid JSON"),
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn encoded_and_bare_query_markers() {
        assert_eq!(request_path(&uri("/account/%3F?v=1")), "/account/?");
        assert_eq!(request_path(&uri("/account/?")), "/account/?");
        assert_eq!(request_path(&uri("/account/?id=3")), "/account/");
        assert_eq!(request_path(&uri("/account/157")), "/account/157");
    }

    #[test]
    fn query_pairs_are_decoded() {
        let args = query_args(&uri("/x?name=a%20b&v=1"));
        assert_eq!(args["name"], "a b");
        assert_eq!(args["v"], "1");
        assert!(query_args(&uri("/x")).is_empty());
    }

    #[test]
    fn body_must_be_an_object() {
        assert!(body_args(b"").unwrap().is_empty());
        assert_eq!(body_args(br#"{"password":"x"}"#).unwrap()["password"], "x");
        assert!(body_args(b"[1,2]").is_err());
        assert!(body_args(b"{nope").is_err());
    }
}
