//! Crate-level error type.
//!
//! Every fallible operation in the client returns [`ChainError`]. The variants
//! follow the three ways a call to the experiment server can fail (transport,
//! status, body) plus the client-side conditions the session controller has to
//! distinguish.

use thiserror::Error;

/// Errors raised while driving a participant session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// A TCP-level connection could not be established, or the request timed out.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// The server replied with a non-2xx status code.
    ///
    /// `page` carries the `html` field of the error body when the server sent
    /// a replacement page for the participant.
    #[error("HTTP {status} from {url}")]
    Http {
        status: u16,
        url: String,
        page: Option<String>,
    },

    /// A response body could not be parsed as the expected JSON structure.
    #[error("JSON parse error on field '{field}': {detail}")]
    Json { field: String, detail: String },

    /// The readiness summary has no entry for the requested status label.
    #[error("summary has no '{0}' entry")]
    MissingStatus(String),

    /// An identifier the server assigns was needed before it existed.
    #[error("{0} is not known yet")]
    MissingIdentity(&'static str),

    /// Invalid configuration, CLI input or entry URL.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChainError {
    /// The replacement page the server sent with this error, if any.
    pub fn page(&self) -> Option<&str> {
        match self {
            ChainError::Http { page, .. } => page.as_deref(),
            _ => None,
        }
    }

    /// Shorthand for a body parse failure on `field`.
    pub(crate) fn json(field: &str, detail: impl ToString) -> Self {
        ChainError::Json {
            field: field.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_has_status_and_url() {
        let err = ChainError::Http {
            status: 503,
            url: "http://localhost:5000/summary".to_string(),
            page: None,
        };
        let s = err.to_string();
        assert!(s.contains("503"), "expected status in display: {s}");
        assert!(s.contains("/summary"), "expected url: {s}");
    }

    #[test]
    fn page_only_present_on_http_errors() {
        let with_page = ChainError::Http {
            status: 403,
            url: "x".to_string(),
            page: Some("<p>over quota</p>".to_string()),
        };
        assert_eq!(with_page.page(), Some("<p>over quota</p>"));

        let connect = ChainError::Connect {
            url: "x".to_string(),
            detail: "refused".to_string(),
        };
        assert!(connect.page().is_none());
    }

    #[test]
    fn json_helper_sets_field() {
        let err = ChainError::json("node", "missing field `id`");
        let s = err.to_string();
        assert!(s.contains("node"));
        assert!(s.contains("missing field"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ChainError = io.into();
        assert!(matches!(err, ChainError::Io(_)));
    }

    #[test]
    fn chain_error_is_send_and_sync() {
        fn assert_send_sync<E: Send + Sync + std::error::Error>(_: &E) {}
        assert_send_sync(&ChainError::MissingIdentity("node id"));
    }
}
