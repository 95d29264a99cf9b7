//! Store error sentinel kinds (§4.A): every store operation can fail in
//! exactly one of these three ways, regardless of backend.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The key does not exist.
    #[error("key not found: {0}")]
    NotFound(String),

    /// A compare-and-swap/compare-and-delete precondition did not hold.
    #[error("precondition failed for key: {0}")]
    Precondition(String),

    /// Connection, timeout, or serialization failure talking to the
    /// backend itself.
    #[error("store transport error: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, StoreError::Precondition(_))
    }
}
