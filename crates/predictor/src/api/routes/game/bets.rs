use axum::{extract::State, http::StatusCode, response::ErrorResponse, Json};
use log::{error, info, warn};
use predictor_core::SubmitBet;
use std::sync::Arc;

use crate::{
    domain::{Bet, Error},
    startup::AppState,
};

/// Place or replace the caller's prediction for an active round.
///
/// Rejections come back with a stable `code`: `prediction_matches_baseline`,
/// `round_not_open`, `user_not_found`, `round_not_found` or `bad_request`.
pub async fn submit_bet(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBet>,
) -> Result<(StatusCode, Json<Bet>), ErrorResponse> {
    let round_id = body.round_id.clone();
    let user_id = body.user_id.clone();

    match state.ledger.submit_bet(body).await {
        Ok(bet) => {
            info!("bet accepted for round {} from {}", round_id, user_id);
            Ok((StatusCode::CREATED, Json(bet)))
        }
        Err(e @ (Error::DbError(_) | Error::DbTimeout(_) | Error::Internal(_))) => {
            error!("error submitting bet for round {}: {:?}", round_id, e);
            Err(e.into())
        }
        Err(e) => {
            warn!("bet for round {} from {} rejected: {}", round_id, user_id, e);
            Err(e.into())
        }
    }
}
