/// Core error type for the relay.
///
/// Adapter crates should map their specific errors into this type so the bot
/// core can decide between "tell the user" and "log and continue".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network or HTTP-level failure talking to a provider endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered, but with an error payload or unusable content.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// Rejected user input (bad command argument, duplicate entry, ...).
    #[error("{0}")]
    Validation(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
