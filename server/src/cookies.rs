use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse as _, Response},
};
use time::Duration;
use tower_cookies::cookie::SameSite;
use tracing::error;

pub use tower_cookies::Cookie;

use crate::{state::AppState, token::TOKEN_LIFETIME_DAYS};

/// Cookie carrying the signed session token
pub const TOKEN_COOKIE_NAME: &str = "token";

pub struct CookieJar {
    cookies: tower_cookies::Cookies,
    secure: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for CookieJar {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = match tower_cookies::Cookies::from_request_parts(parts, state).await {
            Ok(cookies) => cookies,
            Err(_) => {
                error!("Failed to extract cookies from request");
                return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }
        };

        Ok(CookieJar {
            cookies,
            secure: state.secure_cookies,
        })
    }
}

impl CookieJar {
    /// The raw token from the request, if one was sent
    pub fn token(&self) -> Option<String> {
        self.cookies
            .get(TOKEN_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn set_token(&self, token: String) {
        self.cookies.add(token_cookie(token, self.secure));
    }

    /// Expire the token cookie on the client
    pub fn clear_token(&self) {
        self.cookies.remove(removal_cookie(self.secure));
    }
}

fn token_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(TOKEN_COOKIE_NAME, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie.set_max_age(Duration::days(TOKEN_LIFETIME_DAYS));
    cookie
}

fn removal_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(TOKEN_COOKIE_NAME, "");
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie
}
