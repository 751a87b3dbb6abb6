//! Shared error types

use thiserror::Error;

/// Errors from checks that run before any database access
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid prediction: {0}")]
    InvalidPrediction(String),

    #[error("invalid leaderboard scope: {0}")]
    InvalidScope(String),

    #[error("invalid round status: {0}")]
    InvalidStatus(String),
}
