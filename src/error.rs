use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollErrorKind {
    Network,
    HttpStatus,
    GraphqlError,
    ParseError,
}

impl PollErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PollErrorKind::Network => "network",
            PollErrorKind::HttpStatus => "http-status",
            PollErrorKind::GraphqlError => "graphql-error",
            PollErrorKind::ParseError => "parse-error",
        }
    }
}

impl fmt::Display for PollErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a single poll cycle (or of one category request).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct PollError {
    pub kind: PollErrorKind,
    pub message: String,
    /// HTTP status code, set only for `http-status` failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl PollError {
    pub fn new(kind: PollErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PollErrorKind::Network, message)
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(PollErrorKind::HttpStatus, message)
        }
    }

    pub fn graphql(message: impl Into<String>) -> Self {
        Self::new(PollErrorKind::GraphqlError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(PollErrorKind::ParseError, message)
    }

    /// Maps a transport-level `reqwest` failure. Everything that happens before
    /// a status line is received (DNS, TLS, refused, timeout) is `network`.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let detail = if err.is_timeout() {
            "истекло время ожидания ответа"
        } else if err.is_connect() {
            "не удалось установить соединение"
        } else {
            "ошибка транспорта"
        };
        Self::network(format!("{detail}: {err}"))
    }

    /// 401/403: the router rejected the API key.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status, Some(401 | 403))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = PollError::http_status(500, "status 500: Internal Server Error");
        assert_eq!(err.to_string(), "http-status: status 500: Internal Server Error");
        assert_eq!(err.status, Some(500));
        assert!(!err.is_auth_rejection());
    }

    #[test]
    fn auth_rejection_only_for_401_and_403() {
        assert!(PollError::http_status(401, "Unauthorized").is_auth_rejection());
        assert!(PollError::http_status(403, "Forbidden").is_auth_rejection());
        assert!(!PollError::http_status(502, "Bad Gateway").is_auth_rejection());
        assert!(!PollError::graphql("invalid key").is_auth_rejection());
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&PollError::graphql("X, Y")).unwrap();
        assert_eq!(json, r#"{"kind":"graphql-error","message":"X, Y"}"#);
    }
}
