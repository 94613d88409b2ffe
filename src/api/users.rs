use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{UpdateUserRequest, User, UserPublic};
use crate::services::{
    file_service::{validate_image_content_type, MAX_IMAGE_SIZE},
    AuthService, FileService,
};

/// Avatar upload confirmation
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct AvatarUploadResponse {
    pub success: bool,
    pub avatar_url: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me", put(update_me))
        .route("/me/avatar", post(upload_avatar))
        .route("/:id", get(get_user))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User profile", body = UserPublic),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<UserPublic>> {
    let user = AuthService::get_user_by_id(&state.pool, auth_user.user_id).await?;
    Ok(Json(UserPublic::from(user)))
}

/// Update the current user's profile
#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserPublic),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_me(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserPublic>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            phone = COALESCE($4, phone),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth_user.user_id)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.phone)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(UserPublic::from(user)))
}

/// Upload a profile avatar
#[utoipa::path(
    post,
    path = "/api/v1/users/me/avatar",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Avatar uploaded", body = AvatarUploadResponse),
        (status = 400, description = "Invalid file"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn upload_avatar(
    State(state): State<AppState>,
    auth_user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let file_service = FileService::new(&state.config).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "avatar" {
            let content_type = field
                .content_type()
                .ok_or_else(|| AppError::BadRequest("Missing Content-Type".to_string()))?
                .to_string();

            if !validate_image_content_type(&content_type) {
                return Err(AppError::BadRequest(
                    "Unsupported image format".to_string(),
                ));
            }

            let file_name = field.file_name().unwrap_or("avatar.jpg").to_string();

            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;

            if data.len() > MAX_IMAGE_SIZE {
                return Err(AppError::BadRequest("File too large".to_string()));
            }

            let url = file_service
                .upload_file("avatars", &file_name, &content_type, data.to_vec())
                .await?;

            let old_avatar: Option<(Option<String>,)> =
                sqlx::query_as("SELECT avatar_url FROM users WHERE id = $1")
                    .bind(auth_user.user_id)
                    .fetch_optional(&state.pool)
                    .await?;

            sqlx::query("UPDATE users SET avatar_url = $1, updated_at = NOW() WHERE id = $2")
                .bind(&url)
                .bind(auth_user.user_id)
                .execute(&state.pool)
                .await?;

            // Replaced avatars are removed from storage; a failed delete
            // only leaves an orphan object behind.
            if let Some((Some(old_url),)) = old_avatar {
                if let Some(key) = file_service.get_key_from_url(&old_url) {
                    if let Err(e) = file_service.delete_file(&key).await {
                        tracing::warn!("Failed to delete old avatar {}: {}", key, e);
                    }
                }
            }

            return Ok(Json(json!({
                "success": true,
                "avatar_url": url
            })));
        }
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

/// Public profile of another user (for counterparties in leases,
/// payments and messages)
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User profile", body = UserPublic),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserPublic>> {
    let user = AuthService::get_user_by_id(&state.pool, id).await?;
    Ok(Json(UserPublic::from(user)))
}
