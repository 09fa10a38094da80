use std::fmt::Debug;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use color_eyre::eyre::eyre;
use serde::de::DeserializeOwned;
use serde_json::json;

/// The public half of an error: what the client gets to see.
#[derive(Debug, Clone)]
pub struct ApiMessage {
    pub status: StatusCode,
    pub message: String,
}

impl ApiMessage {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiMessage {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

#[derive(Debug)]
pub struct ServerError(pub(crate) color_eyre::Report, pub(crate) ApiMessage);

pub type ServerResult<S> = Result<S, ServerError>;

impl ServerError {
    /// An error with no underlying cause beyond the message itself
    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        ServerError(eyre!("{message}"), ApiMessage::new(status, message))
    }

    pub fn status(&self) -> StatusCode {
        self.1.status
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self.0, status = %self.1.status, "Request Error");

        let is_dev_mode = std::env::var("DEVELOPMENT_MODE")
            .map(|v| v == "1")
            .unwrap_or(false);

        if is_dev_mode && self.1.status == StatusCode::INTERNAL_SERVER_ERROR {
            let body = json!({
                "message": self.1.message,
                "error": format!("{:?}", self.0),
            });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }

        self.1.into_response()
    }
}

impl<E> From<E> for ServerError
where
    E: Into<color_eyre::Report>,
{
    fn from(err: E) -> Self {
        ServerError(
            err.into(),
            ApiMessage::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        )
    }
}

pub(crate) trait WithMessage<T> {
    fn with_message(self, status: StatusCode, message: &str) -> ServerResult<T>;
}

impl<T, E> WithMessage<T> for Result<T, E>
where
    E: Into<color_eyre::Report>,
{
    fn with_message(self, status: StatusCode, message: &str) -> ServerResult<T> {
        self.map_err(|err| ServerError(err.into(), ApiMessage::new(status, message)))
    }
}

pub(crate) trait OrNotFound<T> {
    fn or_not_found(self, message: &str) -> ServerResult<T>;
}

impl<T> OrNotFound<T> for Option<T> {
    fn or_not_found(self, message: &str) -> ServerResult<T> {
        self.ok_or_else(|| ServerError::message(StatusCode::NOT_FOUND, message))
    }
}

/// `Json` that reports malformed bodies as `{"message": ...}` instead of plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ServerError {
    ServerError::message(StatusCode::BAD_REQUEST, rejection.body_text())
}

/// `Query` with the same `{"message": ...}` rejection as [`ApiJson`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ServerError {
    ServerError::message(rejection.status(), rejection.body_text())
}
