use axum::{Json, extract::State};
use plaza_types::api::HealthResponse;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        env: state.config.env.clone(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
