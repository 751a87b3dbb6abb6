mod bets;
mod leaderboard;
mod players;
pub mod rounds;
mod scheduler;
mod settlement;

pub use bets::*;
pub use leaderboard::*;
pub use players::*;
pub use rounds::*;
pub use scheduler::*;
pub use settlement::*;

use predictor_core::CoreError;
use thiserror::Error;

use crate::infra::db::DatabaseWriteError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Validation(#[from] CoreError),
    #[error("prediction matches baseline max of {0}")]
    PredictionMatchesBaseline(f64),
    #[error("round not open: {0}")]
    RoundNotOpen(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("round not found: {0}")]
    RoundNotFound(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("database write timed out: {0}")]
    DbTimeout(String),
    #[error("{0}")]
    Internal(String),
}

impl From<DatabaseWriteError> for Error {
    fn from(e: DatabaseWriteError) -> Self {
        match e {
            DatabaseWriteError::Sqlx(e) => Error::DbError(e),
            e => Error::DbTimeout(e.to_string()),
        }
    }
}

impl Error {
    /// Stable machine readable code returned to clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::PredictionMatchesBaseline(_) => "prediction_matches_baseline",
            Error::RoundNotOpen(_) => "round_not_open",
            Error::UserNotFound(_) => "user_not_found",
            Error::RoundNotFound(_) => "round_not_found",
            Error::NotFound(_) => "not_found",
            Error::BadRequest(_) | Error::Validation(_) => "bad_request",
            Error::DbError(_) | Error::DbTimeout(_) | Error::Internal(_) => "internal",
        }
    }
}
