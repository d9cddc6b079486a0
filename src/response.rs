//! Outgoing HTTP responses.
//!
//! Every answer is the same JSON envelope:
//!
//! ```json
//! { "result": true,  "data": { "id": 157 } }
//! { "result": false, "data": null, "reason": "access to `account/1` denied" }
//! ```
//!
//! The HTTP status carries the error class ([`Error::status`]); `reason`
//! carries the message. A fallback answer is a 404 whose `result` is still
//! `true`, since a method did produce it.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::dispatcher::Outcome;
use crate::error::Error;

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    result: bool,
    data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// An outgoing HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl Response {
    /// `200 OK` carrying `data`.
    pub fn success(data: &Value) -> Self {
        Self::envelope(StatusCode::OK, true, data, None)
    }

    /// A failed envelope with `status` and `reason`.
    pub fn failure(status: StatusCode, reason: &str, data: &Value) -> Self {
        Self::envelope(status, false, data, Some(reason))
    }

    pub fn from_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Fallback(data) => Self::envelope(StatusCode::NOT_FOUND, true, data, None),
            other => Self::success(other.value()),
        }
    }

    /// Maps an error to its status. Authoring defects are logged and
    /// answered without detail; everything else explains itself.
    pub fn from_error(err: &Error) -> Self {
        let status = err.status();
        match err {
            Error::MissingParameters { missing, .. } => {
                let data = serde_json::to_value(missing).unwrap_or(Value::Null);
                Self::failure(status, &err.to_string(), &data)
            }
            Error::Method(_) => Self::failure(status, &err.to_string(), &Value::Null),
            _ if status.is_server_error() => {
                error!(error = %err, "request failed on a server-side defect");
                Self::failure(status, "internal server error", &Value::Null)
            }
            _ => Self::failure(status, &err.to_string(), &Value::Null),
        }
    }

    /// Adds a header. Returns `self` for chaining.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn envelope(status: StatusCode, result: bool, data: &Value, reason: Option<&str>) -> Self {
        let envelope = Envelope { result, data, reason };
        // Serializing a Value-backed struct cannot fail.
        let body = serde_json::to_vec(&envelope).unwrap_or_default();
        Self {
            status,
            headers: vec![("content-type".to_owned(), "application/json".to_owned())],
            body,
        }
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = self.status;
        for (name, value) in self.headers {
            match (
                http::HeaderName::try_from(name.as_str()),
                http::HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(n), Ok(v)) => {
                    res.headers_mut().append(n, v);
                }
                _ => error!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response { Response::from_outcome(&self) }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response { Response::from_error(&self) }
}

impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(v)  => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MissingParam;
    use crate::verb::Verb;
    use serde_json::json;

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn success_envelope() {
        let res = Outcome::Invoked(json!({ "id": 1 })).into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res), json!({ "result": true, "data": { "id": 1 } }));
    }

    #[test]
    fn fallback_is_a_successful_404() {
        let res = Outcome::Fallback(json!("moved")).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&res)["result"], true);
    }

    #[test]
    fn errors_carry_reason_and_status() {
        let res = Error::NotFound { verb: Verb::Get, path: "/x".into() }.into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&res)["reason"], "not found: GET /x");

        let res = Error::MissingParameters {
            endpoint: "POST /login".into(),
            missing: vec![MissingParam { name: "password".into(), kind: None, description: None }],
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&res)["data"][0]["name"], "password");
    }

    #[test]
    fn server_defects_are_not_detailed() {
        let res = Error::Configuration("route target `x` missing".into()).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res)["reason"], "internal server error");
    }
}
