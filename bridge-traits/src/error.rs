use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The capability or the requested item does not exist on this host.
    #[error("Not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
