use axum::{extract::State, response::ErrorResponse, Json};
use log::{error, info};
use std::sync::Arc;

use crate::{domain::TickSummary, startup::AppState};

/// Run one scheduler pass now and report what it did
pub async fn run_scheduler_tick(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TickSummary>, ErrorResponse> {
    info!("scheduler tick triggered over http");
    state.scheduler.run_tick().await.map(Json).map_err(|e| {
        error!("error running scheduler tick: {:?}", e);
        e.into()
    })
}
