//! Error type shared by the feed, the loader and the config layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp {value:?}")]
    Timestamp { value: String },

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported URL scheme {scheme:?} for {what}")]
    Scheme { scheme: String, what: &'static str },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is closed")]
    StoreClosed,
}

impl Error {
    pub(crate) fn invalid_sample<S: Into<String>>(msg: S) -> Self {
        Error::InvalidSample(msg.into())
    }
}
