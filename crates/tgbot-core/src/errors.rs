use crate::api::ApiResponse;

/// Core error type for the notifier.
///
/// Recoverable conditions (rate limiting, timeouts, resets, server errors below
/// the cap) never surface here: the executor absorbs them. Everything in this
/// enum is final for the call that produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Local request construction failed. Never retried.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Network failure the executor does not know how to wait out.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(
        "bad remote call: status {status}, error_code {}, {}",
        response.error_code,
        response.description
    )]
    BadRemoteCall {
        status: u16,
        response: Box<ApiResponse>,
    },

    #[error("repeated server failure after {attempts} attempts: {}", response.description)]
    RemoteServer {
        attempts: u32,
        response: Box<ApiResponse>,
    },

    #[error("malformed response (status {status}): {body}")]
    Malformed { status: u16, body: String },

    #[error("missing field in response: {0}")]
    MissingField(String),

    #[error("retry loop cancelled")]
    Cancelled,

    /// The log sink can no longer deliver; logging pipelines should drop it.
    #[error("bad writer")]
    BadWriter,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl Error {
    /// Decoded remote envelope attached to a fatal remote error, if any.
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            Error::BadRemoteCall { response, .. } | Error::RemoteServer { response, .. } => {
                Some(response)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
