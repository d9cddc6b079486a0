//! HTTP verb as a typed enum.
//!
//! A handler table is keyed by verb. Only the RFC 9110 request methods are
//! routable; anything else is rejected by the server with
//! `405 Method Not Allowed` before it reaches the dispatcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A routable HTTP verb.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Verb {
    /// Every verb, in wire-name order. Used when a table has to be walked
    /// deterministically (introspection, method lookup for `.../name/?`).
    pub const ALL: [Verb; 9] = [
        Self::Connect,
        Self::Delete,
        Self::Get,
        Self::Head,
        Self::Options,
        Self::Patch,
        Self::Post,
        Self::Put,
        Self::Trace,
    ];

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }

    /// Verbs that never change server state. Only these may ask a branch to
    /// describe itself with a trailing `/?`.
    pub fn is_read_safe(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options)
    }
}

/// Parses a method string. Handler tables are often written with lowercase
/// keys (`"get"`), so parsing is case-insensitive.
impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            _         => Err(UnknownVerb(s.to_owned())),
        }
    }
}

impl TryFrom<&http::Method> for Verb {
    type Error = UnknownVerb;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method string that does not name a routable verb.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verb `{0}`")]
pub struct UnknownVerb(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_case() {
        assert_eq!("get".parse::<Verb>(), Ok(Verb::Get));
        assert_eq!("Delete".parse::<Verb>(), Ok(Verb::Delete));
        assert!("PURGE".parse::<Verb>().is_err());
    }

    #[test]
    fn read_safe_verbs() {
        let safe: Vec<_> = Verb::ALL.iter().filter(|v| v.is_read_safe()).collect();
        assert_eq!(safe, [&Verb::Get, &Verb::Head, &Verb::Options]);
    }

    #[test]
    fn converts_from_http_method() {
        assert_eq!(Verb::try_from(&http::Method::PUT), Ok(Verb::Put));
    }
}
