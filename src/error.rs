//! Unified error type.

use std::fmt;
use std::path::PathBuf;

use http::StatusCode;

use crate::verb::Verb;

/// An opaque failure raised by a branch method. The dispatcher never looks
/// inside it; the transport decides how to present it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by arbor's fallible operations.
///
/// Request-level variants ([`NotFound`](Error::NotFound),
/// [`AccessDenied`](Error::AccessDenied),
/// [`MissingParameters`](Error::MissingParameters)) are expected outcomes of
/// ordinary traffic. Authoring defects ([`Configuration`](Error::Configuration),
/// [`InvalidPattern`](Error::InvalidPattern), [`InvalidAcl`](Error::InvalidAcl))
/// mean the branch tree or the ACL configuration is wrong and should be fixed,
/// not retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {verb} {path}")]
    NotFound { verb: Verb, path: String },

    #[error("access to `{path}` denied")]
    AccessDenied { path: String },

    #[error("\"{endpoint}\" is missing the following parameters.\n{}", MissingList(.missing))]
    MissingParameters { endpoint: String, missing: Vec<MissingParam> },

    #[error("invalid query option: {0}")]
    InvalidQuery(String),

    #[error("introspection is not enabled")]
    IntrospectionDisabled,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid ACL rule `{rule}`: {reason}")]
    InvalidAcl { rule: String, reason: String },

    #[error("{0}")]
    Method(#[source] BoxError),

    #[error("reading config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The HTTP status this error is surfaced as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. }             => StatusCode::NOT_FOUND,
            Self::AccessDenied { .. }         => StatusCode::FORBIDDEN,
            Self::MissingParameters { .. }    => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_)             => StatusCode::BAD_REQUEST,
            Self::IntrospectionDisabled       => StatusCode::FORBIDDEN,
            Self::Configuration(_)
            | Self::InvalidPattern { .. }
            | Self::InvalidAcl { .. }
            | Self::Method(_)
            | Self::ConfigRead { .. }
            | Self::ConfigParse(_)
            | Self::Io(_)                     => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for defects in the branch tree or ACL configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InvalidPattern { .. } | Self::InvalidAcl { .. }
        )
    }
}

/// A required parameter that was not supplied, with whatever the method's
/// descriptor says about it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MissingParam {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl fmt::Display for MissingParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "* {}", self.name)?;
        if let Some(kind) = &self.kind {
            write!(f, " ({kind})")?;
        }
        if let Some(desc) = &self.description {
            write!(f, ": {desc}")?;
        }
        Ok(())
    }
}

struct MissingList<'a>(&'a [MissingParam]);

impl fmt::Display for MissingList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, param) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameters_message_lists_details() {
        let err = Error::MissingParameters {
            endpoint: "POST /login".into(),
            missing: vec![
                MissingParam { name: "password".into(), kind: Some("string".into()), description: Some("Account password".into()) },
                MissingParam { name: "otp".into(), kind: None, description: None },
            ],
        };
        assert_eq!(
            err.to_string(),
            "\"POST /login\" is missing the following parameters.\n* password (string): Account password\n* otp"
        );
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn configuration_errors_are_server_errors() {
        let err = Error::InvalidAcl { rule: "admin".into(), reason: "no anchor".into() };
        assert!(err.is_configuration());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!Error::IntrospectionDisabled.is_configuration());
    }
}
