use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        lifecycle::LifecycleMarker,
        trip::{TripDetails, TripId, TripView},
    },
    routes::{ApiJson, ApiPath, ApiResponse},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(current_trip).post(create_trip))
        .route("/past", get(past_trips))
        .route("/:trip_id", post(update_trip))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTripRequest {
    #[serde(flatten)]
    details: TripDetails,
    /// Only set when backfilling a historical trip, e.g. `"B01"`.
    #[serde(default)]
    previous: Option<LifecycleMarker>,
}

async fn create_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(request): ApiJson<CreateTripRequest>,
) -> Result<Json<ApiResponse<TripView>>, AppError> {
    let user = current.require_user()?;
    let trip = state
        .trips
        .create_trip(request.details, request.previous, user.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(state.trips.describe(trip).await?)))
}

async fn update_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiPath(trip_id): ApiPath<TripId>,
    ApiJson(details): ApiJson<TripDetails>,
) -> Result<Json<ApiResponse<TripView>>, AppError> {
    let user = current.require_user()?;
    let trip = state
        .trips
        .update_trip(trip_id, details, user.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(state.trips.describe(trip).await?)))
}

async fn current_trip(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ApiResponse<Option<TripView>>>, AppError> {
    let user = current.require_user()?;
    let view = match state.trips.get_current_trip(user.user_id).await? {
        Some(trip) => Some(state.trips.describe(trip).await?),
        None => None,
    };
    Ok(Json(ApiResponse::ok(view)))
}

async fn past_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ApiResponse<Vec<TripView>>>, AppError> {
    let user = current.require_user()?;
    let trips = state.trips.get_past_trips(user.user_id).await?;
    Ok(Json(ApiResponse::ok(state.trips.describe_all(trips).await?)))
}
