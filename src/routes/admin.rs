use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::{auth::CurrentUser, error::AppError, routes::ApiResponse, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/sweep", post(force_sweep))
}

#[derive(Serialize)]
struct SweepSummary {
    eligible: usize,
    archived: usize,
    skipped: usize,
    deferred: usize,
}

async fn force_sweep(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ApiResponse<SweepSummary>>, AppError> {
    let admin = current.require_admin()?;
    info!(user_id = %admin.user_id, "manual sweep requested");
    let report = state.trips.force_sweep().await?;
    Ok(Json(ApiResponse::ok(SweepSummary {
        eligible: report.eligible,
        archived: report.archived,
        skipped: report.skipped,
        deferred: report.deferred,
    })))
}
