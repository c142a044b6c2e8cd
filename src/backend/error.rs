use std::fmt;

/// Errors produced by the bot's remote calls and plumbing.
///
/// The first four variants are the taxonomy every handler maps onto chat
/// messages; the rest are local failures.
#[derive(Debug, Clone, PartialEq)]
pub enum BotError {
    /// Authorization rejected by the remote service (HTTP 401)
    AuthExpired(String),

    /// Permission or entitlement denied (HTTP 403)
    Forbidden(String),

    /// Malformed request or unknown resource (HTTP 400/404)
    Validation(String),

    /// Any other HTTP or transport failure
    HttpError(String),

    /// JSON parsing error
    JsonError(String),

    /// WebSocket connection error
    WebSocketError(String),

    /// Credential could not be acquired or refreshed
    AuthError(String),

    /// Credential is not authenticated yet, the feature is disabled
    Unavailable(String),

    /// Configuration error
    ConfigError(String),

    /// Filesystem error
    IoError(String),

    /// Connection closed unexpectedly
    ConnectionClosed(u16, String),

    /// Channel send error
    ChannelError(String),
}

impl BotError {
    /// Classify a non-success HTTP status returned by a remote service.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        let detail = format!("HTTP {}: {}", status, body);
        match status.as_u16() {
            401 => BotError::AuthExpired(detail),
            403 => BotError::Forbidden(detail),
            400 | 404 => BotError::Validation(detail),
            _ => BotError::HttpError(detail),
        }
    }

    /// Turn a response into a `BotError` when its status is not a success.
    pub async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BotError::from_status(status, body))
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, BotError::AuthExpired(_))
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotError::AuthExpired(msg) => write!(f, "Authorization expired: {}", msg),
            BotError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            BotError::Validation(msg) => write!(f, "Validation failure: {}", msg),
            BotError::HttpError(msg) => write!(f, "HTTP error: {}", msg),
            BotError::JsonError(msg) => write!(f, "JSON error: {}", msg),
            BotError::WebSocketError(msg) => write!(f, "WebSocket error: {}", msg),
            BotError::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            BotError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            BotError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            BotError::IoError(msg) => write!(f, "IO error: {}", msg),
            BotError::ConnectionClosed(code, reason) => {
                write!(f, "Connection closed: code={}, reason={}", code, reason)
            }
            BotError::ChannelError(msg) => write!(f, "Channel error: {}", msg),
        }
    }
}

impl std::error::Error for BotError {}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::JsonError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BotError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BotError::WebSocketError(err.to_string())
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::HttpError(err.to_string())
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
