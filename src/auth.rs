use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{
    error::AppError,
    models::{trip::UserId, user::UserRole},
};

/// Set by the identity gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AuthenticatedUser>().copied()))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }

    pub fn require_admin(&self) -> Result<&AuthenticatedUser, AppError> {
        let user = self.require_user()?;
        if user.role == UserRole::Admin {
            Ok(user)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Reads the identity forwarded by the gateway. Missing or malformed headers
/// leave the request anonymous.
pub fn identity_from_headers(headers: &HeaderMap) -> Option<AuthenticatedUser> {
    let user_id = headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    let role = match headers.get(USER_ROLE_HEADER) {
        None => UserRole::User,
        Some(value) => value.to_str().ok()?.parse().ok()?,
    };
    Some(AuthenticatedUser {
        user_id: UserId(user_id),
        role,
    })
}

pub async fn resolve_gateway_identity(mut req: Request, next: Next) -> Response {
    match identity_from_headers(req.headers()) {
        Some(user) => {
            req.extensions_mut().insert(user);
        }
        None => debug!("request without gateway identity"),
    }
    next.run(req).await
}
