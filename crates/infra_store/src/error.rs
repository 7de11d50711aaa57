//! Store error types.

use thiserror::Error;

/// Errors raised by a [`crate::ProductStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was reached but refused the credentials or the privilege
    #[error("store rejected credentials during {operation}: {message}")]
    Unauthorized {
        /// Operation being performed
        operation: &'static str,
        /// Store-provided detail
        message: String,
    },

    /// The store could not be reached
    #[error("store unreachable during {operation}: {message}")]
    Unreachable {
        /// Operation being performed
        operation: &'static str,
        /// Transport detail
        message: String,
    },

    /// A statement failed after the store was reached
    #[error("{operation} failed: {source}")]
    Query {
        /// Operation being performed
        operation: &'static str,
        /// Underlying driver error
        #[source]
        source: sqlx::Error,
    },

    /// A row could not be written as given
    #[error("{operation} rejected a row: {message}")]
    InvalidRow {
        /// Operation being performed
        operation: &'static str,
        /// Which value and why
        message: String,
    },

    /// A returned row did not have the expected shape
    #[error("could not decode {operation} row: {message}")]
    Decode {
        /// Operation being performed
        operation: &'static str,
        /// Decoder detail
        message: String,
    },
}

impl StoreError {
    /// Classify a driver error.
    ///
    /// SQLSTATE class `28` (invalid authorisation) and `42501` (insufficient
    /// privilege) are authorisation failures; I/O, TLS and pool failures are
    /// reachability failures; anything else is a statement failure.
    pub fn classify(operation: &'static str, err: sqlx::Error) -> Self {
        let refused = match &err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                (code.starts_with("28") || code == "42501").then(|| db.message().to_string())
            }
            _ => None,
        };
        if let Some(message) = refused {
            return StoreError::Unauthorized { operation, message };
        }

        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => StoreError::Unreachable {
                operation,
                message: err.to_string(),
            },
            _ => StoreError::Query {
                operation,
                source: err,
            },
        }
    }

    /// Whether the store refused the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, StoreError::Unauthorized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_is_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StoreError::classify("probe", sqlx::Error::Io(io));
        assert!(matches!(err, StoreError::Unreachable { operation: "probe", .. }));
    }

    #[test]
    fn test_pool_timeout_is_unreachable() {
        let err = StoreError::classify("probe", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unreachable { .. }));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_row_not_found_is_query() {
        let err = StoreError::classify("upsert", sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Query { operation: "upsert", .. }));
    }
}
