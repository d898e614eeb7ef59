//! Admin bearer-token extractor for moderation endpoints.
//!
//! The storefront has no customer accounts. Review moderation is done by the
//! site owner with a static token from `LAMPLIGHT_ADMIN_TOKEN`.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use tracing::warn;

use crate::crypto::constant_time_compare;
use crate::state::AppState;

/// Extractor that requires `Authorization: Bearer <admin token>`.
///
/// # Example
///
/// ```rust,ignore
/// async fn approve(_admin: RequireAdmin, Path(id): Path<i32>) -> impl IntoResponse {
///     // ...
/// }
/// ```
pub struct RequireAdmin;

/// Rejection for a missing or wrong admin token.
pub struct AdminRejection;

impl IntoResponse for AdminRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [("WWW-Authenticate", "Bearer")],
            "Unauthorized",
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AdminRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(AdminRejection)?;

        if !constant_time_compare(token, state.config().admin_token.expose_secret()) {
            warn!(path = %parts.uri.path(), "Rejected admin request with wrong token");
            return Err(AdminRejection);
        }

        Ok(Self)
    }
}
