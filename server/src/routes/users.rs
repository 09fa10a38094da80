use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    cookies::CookieJar,
    errors::{ApiJson, OrNotFound as _, ServerError, ServerResult, WithMessage as _},
    password,
    routes::parse_id,
    state::AppState,
    user::{normalize_email, FollowOutcome, User},
};

#[derive(Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    cookies: CookieJar,
    ApiJson(input): ApiJson<RegisterInput>,
) -> ServerResult<impl IntoResponse> {
    let name = input.name.trim();
    let email = normalize_email(&input.email);

    if name.is_empty() || email.is_empty() || input.password.trim().is_empty() {
        return Err(ServerError::message(
            StatusCode::BAD_REQUEST,
            "Name, email and password are required",
        ));
    }

    if User::get_by_email(&state.db, &email).await?.is_some() {
        return Err(email_taken());
    }

    let password_hash = password::hash(&input.password)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error hashing password")?;

    let user = User::create(&state.db, name, &email, &password_hash)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error creating user")?
        .ok_or_else(email_taken)?;

    let token = state
        .tokens
        .issue(user.id)
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error generating token")?;
    cookies.set_token(token);

    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": user, "message": "User Registered" })),
    ))
}

fn email_taken() -> ServerError {
    ServerError::message(StatusCode::BAD_REQUEST, "Email already registered")
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    cookies: CookieJar,
    ApiJson(input): ApiJson<LoginInput>,
) -> ServerResult<Json<serde_json::Value>> {
    let email = normalize_email(&input.email);

    let user = User::get_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ServerError::message(StatusCode::BAD_REQUEST, "No user with this email"))?;

    if !password::verify(&input.password, &user.password_hash).await? {
        return Err(ServerError::message(StatusCode::BAD_REQUEST, "Wrong password"));
    }

    let token = state
        .tokens
        .issue(user.id)
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error generating token")?;
    cookies.set_token(token);

    info!("User {} logged in", user.id);

    Ok(Json(json!({ "user": user, "message": "Logged in" })))
}

pub async fn logout(AuthUser { user_id }: AuthUser, cookies: CookieJar) -> Json<serde_json::Value> {
    cookies.clear_token();
    info!("User {} logged out", user_id);

    Json(json!({ "message": "Logged Out Successfully" }))
}

#[instrument(skip(state))]
pub async fn my_profile(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
) -> ServerResult<Json<User>> {
    let user = User::get_by_id(&state.db, user_id)
        .await?
        .or_not_found("User not found")?;

    Ok(Json(user))
}

#[instrument(skip(state, _auth))]
pub async fn user_profile(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> ServerResult<Json<User>> {
    let user_id = parse_id(&id, "Invalid user ID")?;

    let user = User::get_by_id(&state.db, user_id)
        .await?
        .or_not_found("User not found")?;

    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn follow_user(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
) -> ServerResult<Json<serde_json::Value>> {
    let target_id = parse_id(&id, "Invalid user ID")?;

    if target_id == user_id {
        return Err(ServerError::message(
            StatusCode::BAD_REQUEST,
            "You can't follow yourself",
        ));
    }

    let outcome = User::toggle_follow(&state.db, user_id, target_id)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error following user")?;

    let message = match outcome {
        FollowOutcome::Followed => "User Followed",
        FollowOutcome::Unfollowed => "User Unfollowed",
        FollowOutcome::TargetMissing => {
            return Err(ServerError::message(StatusCode::NOT_FOUND, "User not found"))
        }
    };

    Ok(Json(json!({ "message": message })))
}
