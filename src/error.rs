//! Error taxonomy for the session engine.
//!
//! Every failure the engine can surface falls into one of these kinds.
//! The prompt resolver has no entry here on purpose — it degrades instead
//! of failing. `main.rs` wraps these in `anyhow` at the CLI boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing apiKey / apiUrl / model — caught before any network I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The 30-second wall-clock budget elapsed without a response.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// The request never produced an HTTP response (DNS, TLS, connection reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx HTTP status. The message comes from the provider's error body
    /// when one could be parsed, otherwise "<status> <reason>".
    #[error("provider error: {0}")]
    Provider(String),

    /// 2xx response that lacks the expected `choices[0].message.content` path.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Config or history store operation failed. Fatal to the triggering
    /// operation and surfaced to the user.
    #[error("storage error: {0}")]
    Storage(String),

    /// A completion request is already outstanding for this session.
    #[error("a request is already in flight for this session")]
    Busy,
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
