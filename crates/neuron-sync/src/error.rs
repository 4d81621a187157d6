//! Error types for sync operations

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Node unreachable or returned a transport error; retried next tick
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Node payload could not be decoded; abandons the task
    #[error("Decode error: {0}")]
    Decode(String),

    /// Node chain no longer matches the checkpoint at `height`
    #[error("Reorg detected at height {height}")]
    ReorgDetected {
        /// Height whose retained identity no longer matches
        height: u64,
    },

    /// Cursor asked to move backwards outside a rollback
    #[error("Invalid cursor advance: current {current:?}, requested {requested}")]
    InvalidCursorAdvance {
        /// Cursor before the call
        current: Option<u64>,
        /// Requested height
        requested: u64,
    },

    /// Aggregation produced a negative amount
    #[error("Negative balance detected for {address}: {detail}")]
    NegativeBalance {
        /// Affected address
        address: String,
        /// Offending component
        detail: String,
    },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Transient failures that the next tick revisits
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }

    /// Failures that halt the polling loop for the tracked set
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Decode(_)
                | Error::InvalidCursorAdvance { .. }
                | Error::NegativeBalance { .. }
                | Error::Storage(_)
                | Error::Config(_)
        )
    }
}

impl From<neuron_storage_sqlite::Error> for Error {
    fn from(e: neuron_storage_sqlite::Error) -> Self {
        Error::Storage(format!("{}", e))
    }
}

impl From<neuron_core::Error> for Error {
    fn from(e: neuron_core::Error) -> Self {
        Error::Decode(format!("{}", e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Decode(format!("{}", e))
        } else {
            Error::Fetch(format!("{}", e))
        }
    }
}
