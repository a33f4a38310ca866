//! Error types for the sync protocol.

use crate::category::Category;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single batch item was rejected.
///
/// A rejected item does not affect its siblings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The item could not be decoded at all.
    #[error("malformed item: {0}")]
    Malformed(String),

    /// The idempotency key is empty.
    #[error("idempotency key is empty")]
    EmptyKey,

    /// The idempotency key is too long.
    #[error("idempotency key is {0} characters, maximum is {max}", max = crate::MAX_IDEMPOTENCY_KEY_LEN)]
    KeyTooLong(usize),

    /// The event timestamp lies too far in the future.
    #[error("timestamp {0} is too far in the future")]
    TimestampInFuture(String),

    /// Quantity is negative or not finite.
    #[error("quantity must be a finite, non-negative number")]
    InvalidQuantity,

    /// Severity is outside 1..=5.
    #[error("severity {0} is outside 1..=5")]
    SeverityOutOfRange(u8),

    /// Duration exceeds one day.
    #[error("duration of {0} minutes exceeds one day")]
    DurationTooLong(u32),

    /// A field the category requires is missing.
    #[error("{category} entries require {field}")]
    MissingField {
        /// Category of the item.
        category: Category,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A text field is too long.
    #[error("{field} is {len} characters, maximum is {max}")]
    TextTooLong {
        /// Name of the field.
        field: &'static str,
        /// Actual length.
        len: usize,
        /// Allowed length.
        max: usize,
    },
}
