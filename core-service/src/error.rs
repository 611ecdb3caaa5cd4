use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The resolver could not produce a source for this request.
    #[error("Track unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

impl CoreError {
    /// Failures a retry shortly afterwards may get past.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Library(e) => e.is_transient(),
            CoreError::Playback(e) => e.is_transient() && !e.is_network_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
