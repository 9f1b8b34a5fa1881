//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and account invariant violations.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// Invalid remote object ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Category slug outside the closed category set
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// The default account cannot be deactivated or deleted
    #[error("Account {0} is the default account and cannot be deactivated or removed")]
    DefaultAccountLocked(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
