//! Maps failed requests to user-facing error categories.

use std::fmt;
use std::time::SystemTime;

use crate::ApiError;

pub const MSG_NETWORK: &str = "Network connection failed, please check your network";
pub const MSG_TIMEOUT: &str = "Request timed out, please try again later";
pub const MSG_UNAUTHORIZED: &str = "Authentication failed, please check your API key";
pub const MSG_FORBIDDEN: &str = "Insufficient permissions";
pub const MSG_NOT_FOUND: &str = "The requested resource does not exist";
pub const MSG_SERVER_ERROR: &str = "Internal server error";
pub const MSG_BAD_REQUEST: &str = "Invalid request parameters";
pub const MSG_UNKNOWN: &str = "Request failed";

/// User-facing category of a failed request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    NetworkUnreachable,
    Timeout,
    Unauthorized,
    Forbidden,
    NotFound,
    /// Status 400, with the server detail when one was provided.
    BadRequest(Option<String>),
    ServerError,
    /// Fault raised on the client before or after the exchange.
    ClientConfigurationError(Option<String>),
    /// Any other status, with the server detail or message when provided.
    Unclassified(Option<String>),
}

impl ErrorKind {
    /// Human-readable message shown in notifications.
    pub fn message(&self) -> &str {
        match self {
            Self::NetworkUnreachable => MSG_NETWORK,
            Self::Timeout => MSG_TIMEOUT,
            Self::Unauthorized => MSG_UNAUTHORIZED,
            Self::Forbidden => MSG_FORBIDDEN,
            Self::NotFound => MSG_NOT_FOUND,
            Self::ServerError => MSG_SERVER_ERROR,
            Self::BadRequest(detail) => detail.as_deref().unwrap_or(MSG_BAD_REQUEST),
            Self::ClientConfigurationError(detail) | Self::Unclassified(detail) => {
                detail.as_deref().unwrap_or(MSG_UNKNOWN)
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Where a failure originated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureCause {
    /// No response was received.
    Network,
    /// The server answered with this non-success status.
    Http(u16),
    /// The client failed on its own.
    Client,
}

/// One classified failed attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: FailureCause,
    pub timestamp: SystemTime,
}

impl ErrorRecord {
    pub fn from_error(error: &ApiError) -> Self {
        let kind = classify(error);
        Self {
            message: kind.message().to_owned(),
            kind,
            cause: cause_of(error),
            timestamp: SystemTime::now(),
        }
    }
}

impl From<&ApiError> for ErrorRecord {
    fn from(error: &ApiError) -> Self {
        Self::from_error(error)
    }
}

/// Classifies a failure. Pure and total.
pub fn classify(error: &ApiError) -> ErrorKind {
    match error {
        ApiError::Http { status: 400, body } => {
            let detail = body
                .get("detail")
                .and_then(serde_json::Value::as_str)
                .filter(|detail| !detail.is_empty());
            classify_status(400, detail)
        }
        ApiError::Http { status, .. } => classify_status(*status, error.server_detail()),
        ApiError::Transport(_) => ErrorKind::NetworkUnreachable,
        ApiError::Config(message) | ApiError::Decode(message) => {
            ErrorKind::ClientConfigurationError(non_empty(message))
        }
    }
}

/// Classifies an HTTP status and optional server detail.
pub fn classify_status(status: u16, detail: Option<&str>) -> ErrorKind {
    match status {
        400 => ErrorKind::BadRequest(detail.map(str::to_owned)),
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Timeout,
        500 => ErrorKind::ServerError,
        _ => ErrorKind::Unclassified(detail.map(str::to_owned)),
    }
}

fn cause_of(error: &ApiError) -> FailureCause {
    match error {
        ApiError::Http { status, .. } => FailureCause::Http(*status),
        ApiError::Transport(_) => FailureCause::Network,
        ApiError::Config(_) | ApiError::Decode(_) => FailureCause::Client,
    }
}

fn non_empty(message: &str) -> Option<String> {
    (!message.is_empty()).then(|| message.to_owned())
}

/// Short description for logs: server detail, else `HTTP {status}`, else
/// the classified message.
pub fn extract_error_message(error: &ApiError) -> String {
    if let Some(detail) = error.server_detail() {
        return detail.to_owned();
    }
    match error {
        ApiError::Http { status, .. } => format!("HTTP {status}"),
        other => classify(other).message().to_owned(),
    }
}
