use axum::{extract::State, response::ErrorResponse};
use hyper::StatusCode;
use log::{debug, error};
use std::sync::Arc;

use crate::{domain::Error, startup::AppState};

pub async fn health(State(state): State<Arc<AppState>>) -> Result<StatusCode, ErrorResponse> {
    state.round_store.ping().await.map_err(|e| {
        error!("{}", e);
        Error::DbError(e)
    })?;

    for (task_name, task) in state.background_threads.iter() {
        if task.is_finished() {
            let err = Error::Internal(format!(
                "background task {} has stopped, the service needs a restart",
                task_name
            ));
            error!("{}", err);
            return Err(err.into());
        }
    }

    debug!("service, background tasks and db are up");
    Ok(StatusCode::OK)
}
