use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Instrument master error: {0}")]
    InstrumentMaster(String),

    #[error("Malformed broker response: {0}")]
    MalformedResponse(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
