use axum::{
    extract::{Path, State},
    response::ErrorResponse,
    Json,
};
use log::error;
use std::sync::Arc;

use crate::{
    domain::{Player, RegisterPlayer},
    startup::AppState,
};

pub async fn register_player(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterPlayer>,
) -> Result<Json<Player>, ErrorResponse> {
    state
        .players
        .upsert_player(body)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error registering player: {:?}", e);
            e.into()
        })
}

pub async fn get_player(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Player>, ErrorResponse> {
    state
        .players
        .get_player(&user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting player {}: {:?}", user_id, e);
            e.into()
        })
}
