use axum::{
    extract::{Path, Query, State},
    response::ErrorResponse,
    Json,
};
use log::{debug, error};
use predictor_core::LeaderboardScope;
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    domain::{Error, Leaderboard},
    startup::AppState,
};

pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// Standings for `all_time`, `YYYY`, `YYYY_Qn` or `YYYY_MM`
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(scope): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Leaderboard>, ErrorResponse> {
    let scope: LeaderboardScope = scope.parse().map_err(|e| {
        debug!("invalid leaderboard scope: {}", e);
        ErrorResponse::from(Error::from(e))
    })?;

    state
        .leaderboard
        .standings(scope, query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT))
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting leaderboard {}: {:?}", scope, e);
            e.into()
        })
}
