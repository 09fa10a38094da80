use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::{
        ApiJson, ApiMessage, ApiQuery, OrNotFound as _, ServerError, ServerResult,
        WithMessage as _,
    },
    image_host::ImageUpload,
    pin::{Comment, NewPin, Pin},
    routes::parse_id,
    state::AppState,
    user::User,
};

/// The fields of a `multipart/form-data` pin submission
#[derive(Debug, Default)]
struct PinForm {
    title: String,
    body: String,
    file: Option<ImageUpload>,
}

/// Keeps the rejection's status, so an oversized body stays a 413
fn bad_multipart(err: MultipartError) -> ServerError {
    ServerError::message(err.status(), err.body_text())
}

async fn read_pin_form(mut multipart: Multipart) -> ServerResult<PinForm> {
    let mut form = PinForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "title" => form.title = field.text().await.map_err(bad_multipart)?,
            "pin" => form.body = field.text().await.map_err(bad_multipart)?,
            "file" => {
                let file_name = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("upload")
                    .to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&file_name)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let bytes = field.bytes().await.map_err(bad_multipart)?;

                if !bytes.is_empty() {
                    form.file = Some(ImageUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Checks the bytes themselves rather than trusting the declared type
fn ensure_image(upload: &mut ImageUpload) -> ServerResult<()> {
    match infer::get(&upload.bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => {
            upload.content_type = kind.mime_type().to_string();
            Ok(())
        }
        _ => Err(ServerError::message(
            StatusCode::BAD_REQUEST,
            "Uploaded file must be an image",
        )),
    }
}

#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn create_pin(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<impl IntoResponse> {
    let multipart = multipart
        .map_err(|rejection| ServerError::message(rejection.status(), rejection.body_text()))?;
    let form = read_pin_form(multipart).await?;

    let Some(mut upload) = form.file else {
        return Err(ServerError::message(StatusCode::BAD_REQUEST, "No file uploaded"));
    };

    let title = form.title.trim();
    if title.is_empty() {
        return Err(ServerError::message(StatusCode::BAD_REQUEST, "Title is required"));
    }

    ensure_image(&mut upload)?;

    let image = state
        .image_host
        .upload(upload)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error uploading file")?;

    let new_pin = NewPin {
        title,
        body: &form.body,
        owner_id: user_id,
        image: &image,
    };

    let pin = match Pin::create(&state.db, new_pin).await {
        Ok(pin) => pin,
        Err(err) => {
            // Don't leave an orphaned image behind
            if let Err(destroy_err) = state.image_host.destroy(&image.id).await {
                error!(
                    "Failed to clean up image {} after insert failure: {:?}",
                    image.id, destroy_err
                );
            }
            return Err(ServerError(
                err,
                ApiMessage::new(StatusCode::INTERNAL_SERVER_ERROR, "Error creating pin"),
            ));
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Pin Created", "pin": pin })),
    ))
}

#[instrument(skip_all)]
pub async fn get_all_pins(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> ServerResult<Json<Vec<Pin>>> {
    let pins = Pin::all(&state.db)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching pins")?;

    Ok(Json(pins))
}

#[instrument(skip(state, _auth))]
pub async fn get_single_pin(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> ServerResult<Json<Pin>> {
    let pin_id = parse_id(&id, "Invalid pin ID")?;

    let pin = Pin::get_by_id(&state.db, pin_id)
        .await?
        .or_not_found("Pin not found")?;

    Ok(Json(pin))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePinInput {
    pub title: Option<String>,
    pub pin: Option<String>,
}

/// Load a pin the caller is about to modify, checking they own it
async fn load_owned_pin(state: &AppState, pin_id: Uuid, user_id: Uuid) -> ServerResult<Pin> {
    let pin = Pin::get_by_id(&state.db, pin_id)
        .await?
        .or_not_found("Pin not found")?;

    if !pin.is_owned_by(user_id) {
        info!("User {} does not own pin {}", user_id, pin_id);
        return Err(ServerError::message(StatusCode::FORBIDDEN, "Unauthorized"));
    }

    Ok(pin)
}

#[instrument(skip(state, input))]
pub async fn update_pin(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdatePinInput>,
) -> ServerResult<Json<serde_json::Value>> {
    let pin_id = parse_id(&id, "Invalid pin ID")?;

    let title = input.title.as_deref().map(str::trim);
    if title == Some("") {
        return Err(ServerError::message(StatusCode::BAD_REQUEST, "Title is required"));
    }

    let mut pin = load_owned_pin(&state, pin_id, user_id).await?;

    pin.update(&state.db, title, input.pin.as_deref())
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error updating pin")?;

    Ok(Json(json!({ "message": "Pin updated" })))
}

#[instrument(skip(state))]
pub async fn delete_pin(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
) -> ServerResult<Json<serde_json::Value>> {
    let pin_id = parse_id(&id, "Invalid pin ID")?;

    let pin = load_owned_pin(&state, pin_id, user_id).await?;

    if !pin.image.id.is_empty() {
        state
            .image_host
            .destroy(&pin.image.id)
            .await
            .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error deleting image")?;
    }

    pin.delete(&state.db)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error deleting pin")?;

    Ok(Json(json!({ "message": "Pin Deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct CommentInput {
    #[serde(default)]
    pub comment: String,
}

#[instrument(skip(state, input))]
pub async fn comment_on_pin(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<CommentInput>,
) -> ServerResult<Json<serde_json::Value>> {
    let text = input.comment.trim();
    if text.is_empty() {
        return Err(ServerError::message(StatusCode::BAD_REQUEST, "Comment is required"));
    }

    let pin_id = parse_id(&id, "Invalid pin ID")?;

    let author = User::get_by_id(&state.db, user_id)
        .await?
        .or_not_found("User not found")?;

    Comment::add(&state.db, pin_id, user_id, &author.name, text)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error adding comment")?
        .or_not_found("Pin not found")?;

    Ok(Json(json!({ "message": "Comment Added" })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteCommentParams {
    #[serde(rename = "commentId")]
    pub comment_id: Option<String>,
}

#[instrument(skip(state))]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser { user_id }: AuthUser,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<DeleteCommentParams>,
) -> ServerResult<Json<serde_json::Value>> {
    let pin_id = parse_id(&id, "Invalid pin ID")?;
    let comment_id = parse_id(
        params.comment_id.as_deref().unwrap_or_default(),
        "Invalid comment ID",
    )?;

    let removed = Comment::delete_own(&state.db, pin_id, comment_id, user_id)
        .await
        .with_message(StatusCode::INTERNAL_SERVER_ERROR, "Error deleting comment")?;

    if !removed {
        return Err(ServerError::message(
            StatusCode::FORBIDDEN,
            "Unauthorized or comment not found",
        ));
    }

    Ok(Json(json!({ "message": "Comment Deleted" })))
}
