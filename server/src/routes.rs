use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use color_eyre::eyre::WrapErr;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::{
    errors::{ServerError, ServerResult},
    state::AppState,
};

pub mod pins;
pub mod users;

/// Build the application router with all routes
pub fn routes(app_state: AppState) -> color_eyre::Result<Router> {
    let cors = cors_layer(&app_state.config.allowed_origin)?;
    let body_limit = DefaultBodyLimit::max(app_state.config.max_upload_bytes);

    let user_routes = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/logout", get(users::logout))
        .route("/me", get(users::my_profile))
        .route("/:id", get(users::user_profile))
        .route("/follow/:id", post(users::follow_user));

    let pin_routes = Router::new()
        .route("/new", post(pins::create_pin))
        .route("/all", get(pins::get_all_pins))
        .route(
            "/:id",
            get(pins::get_single_pin)
                .put(pins::update_pin)
                .delete(pins::delete_pin),
        )
        .route(
            "/comment/:id",
            post(pins::comment_on_pin).delete(pins::delete_comment),
        );

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/user", user_routes)
        .nest("/api/pin", pin_routes)
        .layer(body_limit)
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state);

    Ok(router)
}

fn cors_layer(allowed_origin: &str) -> color_eyre::Result<CorsLayer> {
    let origin = HeaderValue::from_str(allowed_origin)
        .wrap_err_with(|| format!("Invalid ALLOWED_ORIGIN: {allowed_origin}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

async fn health() -> &'static str {
    "OK"
}

/// Parse an id from the path, answering 400 with `message` if it is not one
pub(crate) fn parse_id(raw: &str, message: &str) -> ServerResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServerError::message(StatusCode::BAD_REQUEST, message))
}
