//! Errors of the interaction contract.
use thiserror::Error;

/// Errors raised by the core containers.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A record was queried with a key it does not contain.
    #[error("no such record key: {0}")]
    RecordKey(String),

    /// A record entry was queried as a different type than it stores.
    #[error("record value type mismatch for key: {0}")]
    RecordValueType(String),
}
