use axum::{
    extract::{Path, Query, State},
    response::ErrorResponse,
    Json,
};
use log::{debug, error};
use predictor_core::RoundStatusKind;
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    domain::{Bet, Error, RankingEntry, RoundView},
    startup::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct RoundFilter {
    /// One of `dormant`, `active`, `locked`, `settled`
    pub status: Option<String>,
}

pub async fn get_rounds(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RoundFilter>,
) -> Result<Json<Vec<RoundView>>, ErrorResponse> {
    let status = filter
        .status
        .as_deref()
        .map(str::parse::<RoundStatusKind>)
        .transpose()
        .map_err(|e| {
            debug!("invalid round status filter: {}", e);
            ErrorResponse::from(Error::from(e))
        })?;

    state
        .round_store
        .list_rounds(status)
        .await
        .map(|rounds| Json(rounds.into_iter().map(RoundView::from).collect()))
        .map_err(|e| {
            error!("error listing rounds: {:?}", e);
            e.into()
        })
}

pub async fn get_round(
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<String>,
) -> Result<Json<RoundView>, ErrorResponse> {
    match state.round_store.get_round(&round_id).await {
        Ok(Some(round)) => Ok(Json(RoundView::from(round))),
        Ok(None) => Err(Error::RoundNotFound(round_id).into()),
        Err(e) => {
            error!("error getting round {}: {:?}", round_id, e);
            Err(e.into())
        }
    }
}

/// Bets of a round, ranked order once it has settled
pub async fn get_round_bets(
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<String>,
) -> Result<Json<Vec<Bet>>, ErrorResponse> {
    ensure_round_exists(&state, &round_id).await?;

    state
        .ledger
        .bets_for_round(&round_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting bets for round {}: {:?}", round_id, e);
            e.into()
        })
}

pub async fn get_round_ranking(
    State(state): State<Arc<AppState>>,
    Path(round_id): Path<String>,
) -> Result<Json<Vec<RankingEntry>>, ErrorResponse> {
    ensure_round_exists(&state, &round_id).await?;

    state
        .leaderboard
        .round_ranking(&round_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting ranking for round {}: {:?}", round_id, e);
            e.into()
        })
}

async fn ensure_round_exists(state: &AppState, round_id: &str) -> Result<(), ErrorResponse> {
    match state.round_store.get_round(round_id).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(Error::RoundNotFound(round_id.to_string()).into()),
        Err(e) => {
            error!("error getting round {}: {:?}", round_id, e);
            Err(e.into())
        }
    }
}
