use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the Quillon mix engine
#[derive(Debug)]
pub enum QuillonError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Cluster registry lookup errors (membership refresh failed)
    Registry(String),

    /// Peer communication errors: timeouts, refused connections,
    /// undecodable responses, remote-side failures
    Peer(String),

    /// Inbound payload decoding errors
    Decode(DecodeError),

    /// The mixable model's callback failed
    Mixable(String),

    /// System I/O errors
    Io(std::io::Error),

    /// API/HTTP related errors
    Api(String),
}

/// Decoding errors for inbound frames and envelopes
#[derive(Debug)]
pub enum DecodeError {
    /// Binary codec errors
    Codec(postcard::Error),

    /// Frame-level violations (truncated or oversized frames)
    Frame(String),
}

impl fmt::Display for QuillonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuillonError::Config(msg) => write!(f, "Configuration error: {}", msg),
            QuillonError::Registry(msg) => write!(f, "Registry error: {}", msg),
            QuillonError::Peer(msg) => write!(f, "Peer failure: {}", msg),
            QuillonError::Decode(err) => write!(f, "Decode error: {}", err),
            QuillonError::Mixable(msg) => write!(f, "Mixable error: {}", msg),
            QuillonError::Io(err) => write!(f, "I/O error: {}", err),
            QuillonError::Api(msg) => write!(f, "API error: {}", msg),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Codec(err) => write!(f, "codec: {}", err),
            DecodeError::Frame(msg) => write!(f, "frame: {}", msg),
        }
    }
}

impl std::error::Error for QuillonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QuillonError::Io(err) => Some(err),
            QuillonError::Decode(DecodeError::Codec(err)) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Codec(err) => Some(err),
            DecodeError::Frame(_) => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, QuillonError>;

impl From<std::io::Error> for QuillonError {
    fn from(err: std::io::Error) -> Self {
        QuillonError::Io(err)
    }
}

impl From<postcard::Error> for QuillonError {
    fn from(err: postcard::Error) -> Self {
        QuillonError::Decode(DecodeError::Codec(err))
    }
}

impl From<DecodeError> for QuillonError {
    fn from(err: DecodeError) -> Self {
        QuillonError::Decode(err)
    }
}

impl QuillonError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            QuillonError::Config(_) => StatusCode::BAD_REQUEST,
            QuillonError::Registry(_) => StatusCode::SERVICE_UNAVAILABLE,
            QuillonError::Peer(_) => StatusCode::SERVICE_UNAVAILABLE,
            QuillonError::Decode(_) => StatusCode::BAD_REQUEST,
            QuillonError::Mixable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QuillonError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QuillonError::Api(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            QuillonError::Config(_) => "configuration_error",
            QuillonError::Registry(_) => "registry_error",
            QuillonError::Peer(_) => "peer_error",
            QuillonError::Decode(_) => "decode_error",
            QuillonError::Mixable(_) => "mixable_error",
            QuillonError::Io(_) => "io_error",
            QuillonError::Api(_) => "api_error",
        }
    }
}

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for QuillonError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = QuillonError::Config("Invalid port".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: Invalid port");

        let peer_err = QuillonError::Peer("10.0.0.2:8631: pull: timed out".to_string());
        assert!(peer_err.to_string().contains("Peer failure"));

        let io_err = QuillonError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        assert!(io_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let quillon_err: QuillonError = io_err.into();
        assert!(matches!(quillon_err, QuillonError::Io(_)));

        let frame_err: QuillonError = DecodeError::Frame("frame too large".to_string()).into();
        assert!(matches!(
            frame_err,
            QuillonError::Decode(DecodeError::Frame(_))
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            QuillonError::Registry("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            QuillonError::Decode(DecodeError::Frame("bad".to_string())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
