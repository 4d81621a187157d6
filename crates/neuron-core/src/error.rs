//! Error types for Neuron Core

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Neuron Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed hex string
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Hash with the wrong length
    #[error("Invalid hash length: expected 32 bytes, got {0}")]
    InvalidHashLength(usize),

    /// Capacity that cannot be parsed or is negative
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    /// Unknown script hash type
    #[error("Invalid hash type: {0}")]
    InvalidHashType(String),

    /// Unknown cell status
    #[error("Invalid cell status: {0}")]
    InvalidCellStatus(String),

    /// Invalid address record
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidHex(_) | Error::InvalidHashLength(_) | Error::InvalidHashType(_) => {
                ErrorCategory::Encoding
            }
            Error::InvalidCapacity(_) => ErrorCategory::Amount,
            Error::InvalidCellStatus(_) => ErrorCategory::Cell,
            Error::InvalidAddress(_) => ErrorCategory::Address,
            Error::Serialization(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Hex / hash / script encoding errors
    Encoding,
    /// Capacity errors
    Amount,
    /// Cell errors
    Cell,
    /// Address errors
    Address,
    /// Internal errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Encoding => write!(f, "Encoding"),
            ErrorCategory::Amount => write!(f, "Amount"),
            ErrorCategory::Cell => write!(f, "Cell"),
            ErrorCategory::Address => write!(f, "Address"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::InvalidHex("zz".to_string()).category(),
            ErrorCategory::Encoding
        );
        assert_eq!(Error::InvalidHashLength(3).category(), ErrorCategory::Encoding);
        assert_eq!(
            Error::InvalidCapacity("-1".to_string()).category(),
            ErrorCategory::Amount
        );
        assert_eq!(
            Error::InvalidCellStatus("gone".to_string()).category(),
            ErrorCategory::Cell
        );
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Encoding.to_string(), "Encoding");
        assert_eq!(ErrorCategory::Amount.to_string(), "Amount");
        assert_eq!(ErrorCategory::Internal.to_string(), "Internal");
    }
}
