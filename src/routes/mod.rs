pub mod admin;
pub mod trips;

use axum::{
    extract::{FromRequest, FromRequestParts},
    middleware, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{auth, error::AppError, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/trip", trips::router())
        .nest("/admin", admin::router())
        .layer(middleware::from_fn(auth::resolve_gateway_identity))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Envelope shared by every successful JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: &'static str,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: "OK",
            message: "OK",
            data,
        }
    }
}

/// JSON body extractor whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path extractor whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);
