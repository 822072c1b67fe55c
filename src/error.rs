/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No complete response was received from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with the decoded response body.
    ///
    /// Bodies that are not valid JSON are kept as a JSON string.
    #[error("http error {status}: {body}")]
    Http {
        status: u16,
        body: serde_json::Value,
    },
    /// Client-side fault raised before anything was sent, such as an invalid
    /// base URL or an unreadable upload file.
    #[error("client configuration error: {0}")]
    Config(String),
    /// Response payload did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status carried by this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Server-provided `detail` field, falling back to `message`.
    pub fn server_detail(&self) -> Option<&str> {
        let Self::Http { body, .. } = self else {
            return None;
        };
        ["detail", "message"]
            .iter()
            .find_map(|field| {
                body.get(field)
                    .and_then(serde_json::Value::as_str)
                    .filter(|detail| !detail.is_empty())
            })
    }

    /// Whether retrying the same request can plausibly succeed.
    ///
    /// Transport failures, `408`, `429` and `5xx` statuses are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::Config(_) | Self::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ApiError;

    #[test]
    fn server_detail_prefers_detail_over_message() {
        let err = ApiError::Http {
            status: 422,
            body: json!({"detail": "bad field", "message": "ignored"}),
        };
        assert_eq!(err.server_detail(), Some("bad field"));

        let err = ApiError::Http {
            status: 422,
            body: json!({"message": "fallback"}),
        };
        assert_eq!(err.server_detail(), Some("fallback"));
    }

    #[test]
    fn server_detail_ignores_non_string_and_empty_fields() {
        let err = ApiError::Http {
            status: 400,
            body: json!({"detail": [{"loc": ["query"]}], "message": ""}),
        };
        assert_eq!(err.server_detail(), None);
        assert_eq!(ApiError::Config("x".to_owned()).server_detail(), None);
    }

    #[test]
    fn transient_statuses() {
        let http = |status| ApiError::Http {
            status,
            body: serde_json::Value::Null,
        };
        assert!(http(500).is_transient());
        assert!(http(503).is_transient());
        assert!(http(408).is_transient());
        assert!(http(429).is_transient());
        assert!(!http(404).is_transient());
        assert!(!http(400).is_transient());
        assert!(!ApiError::Decode("x".to_owned()).is_transient());
    }
}
