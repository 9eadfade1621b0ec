/*
[INPUT]:  Error sources (socket, login handshake, signing, frame decoding, config)
[OUTPUT]: Structured error types with retry and classification hints
[POS]:    Error handling layer - unified error type for the entire crate
[UPDATE]: When adding new error sources or changing error classification
*/

use std::time::Duration;

use thiserror::Error;

/// Main error type for the venue WebSocket adapter
#[derive(Error, Debug)]
pub enum WsError {
    /// Dialing the endpoint failed
    #[error("WebSocket connect failed: {0}")]
    Connect(String),

    /// Reading from or writing to the socket failed
    #[error("WebSocket transport error: {0}")]
    Transport(String),

    /// Peer closed the connection
    #[error("WebSocket closed by peer")]
    Closed,

    /// Venue rejected the login request
    #[error("Authentication failed (code {code}): {message}")]
    Authentication { code: i64, message: String },

    /// Venue reported an error for a request (bad channel, bad argument)
    #[error("Venue error (code {code}): {message}")]
    Venue { code: i64, message: String },

    /// Private key could not be parsed or the signature could not be produced
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Inbound frame could not be decoded
    #[error("Malformed frame: {message} (frame: {preview})")]
    Decode { message: String, preview: String },

    /// Outbound request could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded wait expired
    #[error("{what} timed out after {duration:?}")]
    Timeout { what: &'static str, duration: Duration },

    /// No frame arrived within the health-check interval
    #[error("No inbound traffic for {idle:?}, connection considered dead")]
    IdleTimeout { idle: Duration },

    /// No session is ready to carry the request
    #[error("WebSocket not connected")]
    NotConnected,

    /// `connect` was called on a client that is already running
    #[error("WebSocket client already connected")]
    AlreadyConnected,

    /// The client has been closed
    #[error("WebSocket client stopped")]
    Stopped,
}

impl Clone for WsError {
    fn clone(&self) -> Self {
        match self {
            WsError::Connect(m) => WsError::Connect(m.clone()),
            WsError::Transport(m) => WsError::Transport(m.clone()),
            WsError::Closed => WsError::Closed,
            WsError::Authentication { code, message } => WsError::Authentication {
                code: *code,
                message: message.clone(),
            },
            WsError::Venue { code, message } => WsError::Venue {
                code: *code,
                message: message.clone(),
            },
            WsError::Signing(m) => WsError::Signing(m.clone()),
            WsError::Decode { message, preview } => WsError::Decode {
                message: message.clone(),
                preview: preview.clone(),
            },
            // serde_json::Error is not Clone; keep its message
            WsError::Serialization(e) => {
                WsError::Serialization(<serde_json::Error as serde::ser::Error>::custom(e))
            }
            WsError::UrlParse(e) => WsError::UrlParse(*e),
            WsError::Config(m) => WsError::Config(m.clone()),
            WsError::Timeout { what, duration } => WsError::Timeout {
                what,
                duration: *duration,
            },
            WsError::IdleTimeout { idle } => WsError::IdleTimeout { idle: *idle },
            WsError::NotConnected => WsError::NotConnected,
            WsError::AlreadyConnected => WsError::AlreadyConnected,
            WsError::Stopped => WsError::Stopped,
        }
    }
}

impl WsError {
    /// Check if the error is a transient connectivity failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WsError::Connect(_)
                | WsError::Transport(_)
                | WsError::Closed
                | WsError::Timeout { .. }
                | WsError::IdleTimeout { .. }
        )
    }

    /// Check if error indicates a failed login handshake
    pub fn is_auth_error(&self) -> bool {
        matches!(self, WsError::Authentication { .. } | WsError::Signing(_))
    }

    /// Check if error came from a malformed inbound frame
    pub fn is_decode_error(&self) -> bool {
        matches!(self, WsError::Decode { .. })
    }

    pub(crate) fn decode(message: impl Into<String>, raw: &str) -> Self {
        WsError::Decode {
            message: message.into(),
            preview: truncate_for_log(raw, DECODE_PREVIEW_MAX_BYTES),
        }
    }
}

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, WsError>;

const DECODE_PREVIEW_MAX_BYTES: usize = 256;

pub(crate) fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut cut = max_len;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = String::with_capacity(cut + 3);
    out.push_str(&value[..cut]);
    out.push_str("...");
    out
}
