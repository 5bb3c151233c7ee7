use retry_utils::{Classify, FailureClass};
use thiserror::Error;

/// JSON-RPC error codes some providers use for "too many results / range too large"
const LIMIT_EXCEEDED_CODES: [i64; 2] = [-32005, -32602];

#[derive(Error, Debug)]
pub enum RpcClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No RPC endpoint configured for chain {0}")]
    UnsupportedChain(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<config_manager::ConfigurationError> for RpcClientError {
    fn from(err: config_manager::ConfigurationError) -> Self {
        RpcClientError::Config(err.to_string())
    }
}

impl RpcClientError {
    /// The node refused the query because the block window or result set was
    /// too large; the caller should retry with a smaller window
    pub fn is_range_too_large(&self) -> bool {
        match self {
            RpcClientError::Rpc { code, message } => {
                let message = message.to_lowercase();
                LIMIT_EXCEEDED_CODES.contains(code)
                    && (message.contains("range")
                        || message.contains("too many")
                        || message.contains("more than")
                        || message.contains("limit"))
            }
            _ => false,
        }
    }
}

impl Classify for RpcClientError {
    fn classify(&self) -> FailureClass {
        match self {
            RpcClientError::Http(e) => {
                if let Some(status) = e.status() {
                    if status.as_u16() == 429 {
                        FailureClass::RateLimited
                    } else if status.is_server_error() {
                        FailureClass::Transient
                    } else {
                        FailureClass::Permanent
                    }
                } else if e.is_timeout() || e.is_connect() || e.is_request() {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
            RpcClientError::Rpc { message, .. } if !self.is_range_too_large() => {
                let message = message.to_lowercase();
                if message.contains("rate limit") || message.contains("too many requests") {
                    FailureClass::RateLimited
                } else if message.contains("timeout") || message.contains("unavailable") {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
            _ => FailureClass::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcClientError>;
