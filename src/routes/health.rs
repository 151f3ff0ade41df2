use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (db, cache) = tokio::join!(state.credentials.ping(), state.cache.ping());

    match (db, cache) {
        (Ok(()), Ok(())) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "db": "connected", "cache": "connected" })),
        ),
        (db, cache) => {
            let describe = |r: Result<(), crate::error::StoreError>| match r {
                Ok(()) => "connected".to_string(),
                Err(e) => e.to_string(),
            };
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "db": describe(db), "cache": describe(cache) })),
            )
        }
    }
}
