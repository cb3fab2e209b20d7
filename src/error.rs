use crate::types::LobbyCode;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to the presentation layer. Validation failures are
/// rejected before any store write; store failures propagate for manual
/// retry. None of these are fatal to the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lobby {0} not found")]
    NotFound(LobbyCode),

    #[error("{0:?} is not a valid join code")]
    InvalidCode(String),

    #[error("display name must be 1-{0} characters")]
    InvalidName(usize),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("only the host may {0}")]
    NotHost(&'static str),

    #[error("only the word chooser may submit the word")]
    NotChooser,

    #[error("the secret word must not be empty")]
    EmptyWord,

    #[error("invalid vote: {0}")]
    InvalidVote(&'static str),

    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),

    #[error("no free join code after {attempts} attempts")]
    CodesExhausted { attempts: u32 },

    #[error("not currently in a lobby")]
    NotInLobby,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for store round-trips
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the shared state store itself. The core never retries
/// these automatically; the caller decides.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
