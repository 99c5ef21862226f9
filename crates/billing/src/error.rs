//! Billing error taxonomy
//!
//! Four caller-visible categories with distinct handling:
//! - `NotFound`: surfaced to the caller, never retried
//! - `InvalidPeriod`: malformed plan configuration, indicates bad data upstream
//! - `ConcurrentModification`: transient, retried with backoff before surfacing
//! - `Validation`: bad amounts/dates/states, surfaced, never retried
//!
//! Notification failures are not part of the taxonomy: they are logged at the
//! dispatch boundary and never propagated into billing results.

use thiserror::Error;

/// Errors produced by the billing core.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Customer, plan or subscription does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Plan period configuration is unusable (count < 1 or unknown type).
    #[error("Invalid billing period: {0}")]
    InvalidPeriod(String),

    /// Another writer changed the subscription between load and save.
    /// Callers should retry; `BillingService` does so automatically.
    #[error("Concurrent modification of subscription {0}")]
    ConcurrentModification(uuid::Uuid),

    /// Input rejected (bad amount, terminal state, date out of range).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage layer failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BillingError {
    /// Whether a caller may retry the failed operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::ConcurrentModification(_))
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrent_modification_is_retryable() {
        assert!(BillingError::ConcurrentModification(uuid::Uuid::new_v4()).is_retryable());
        assert!(!BillingError::NotFound("plan".into()).is_retryable());
        assert!(!BillingError::Validation("bad amount".into()).is_retryable());
        assert!(!BillingError::InvalidPeriod("count 0".into()).is_retryable());
    }
}
