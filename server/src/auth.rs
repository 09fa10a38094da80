use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{cookies::CookieJar, errors::ApiMessage, state::AppState};

/// The caller, as identified by the token cookie.
///
/// The token is self-contained, so extracting this never touches the
/// database. Handlers that need the full user load it themselves.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = CookieJar::from_request_parts(parts, state).await?;

        let Some(token) = cookies.token() else {
            debug!("No token cookie found");
            return Err(unauthorized("Please Login"));
        };

        let claims = match state.tokens.verify(&token) {
            Ok(claims) => claims,
            Err(err) => {
                info!(error = ?err, "Rejected token");
                return Err(unauthorized("Invalid token"));
            }
        };

        match claims.user_id() {
            Ok(user_id) => Ok(AuthUser { user_id }),
            Err(err) => {
                info!(error = ?err, "Token carried an unusable id");
                Err(unauthorized("Invalid token"))
            }
        }
    }
}

fn unauthorized(message: &str) -> Response {
    ApiMessage::new(StatusCode::UNAUTHORIZED, message).into_response()
}
