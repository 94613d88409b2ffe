use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::AppState;
use crate::models::{
    AuthResponse, LoginRequest, RefreshTokenRequest, RegisterRequest, TokenResponse, UserPublic,
    UserRole,
};
use crate::services::AuthService;

/// Logout confirmation
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout))
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let email = payload.email.trim().to_lowercase();

    if AuthService::get_user_by_email(&state.pool, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    // Self-service registration never grants the admin role
    let role = match payload.role.unwrap_or(UserRole::Tenant) {
        UserRole::Admin => UserRole::Tenant,
        other => other,
    };

    let password_hash = AuthService::hash_password(&payload.password)?;
    let user = AuthService::create_user(
        &state.pool,
        &email,
        &password_hash,
        payload.first_name.trim(),
        payload.last_name.trim(),
        payload.phone.as_deref(),
        role,
    )
    .await?;

    let auth_service = AuthService::new(state.config.clone());
    let access_token = auth_service.generate_access_token(&user)?;
    let refresh_token = auth_service.generate_refresh_token(&user)?;

    let expires_at = Utc::now() + Duration::seconds(state.config.jwt_refresh_expiry);
    AuthService::save_refresh_token(
        &state.pool,
        user.id,
        &AuthService::hash_token(&refresh_token),
        None,
        None,
        expires_at,
    )
    .await?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: UserPublic::from(user),
    }))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();

    let user = AuthService::get_user_by_email(&state.pool, &email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !AuthService::verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    AuthService::update_last_login(&state.pool, user.id).await?;

    let auth_service = AuthService::new(state.config.clone());
    let access_token = auth_service.generate_access_token(&user)?;
    let refresh_token = auth_service.generate_refresh_token(&user)?;

    let expires_at = Utc::now() + Duration::seconds(state.config.jwt_refresh_expiry);
    AuthService::save_refresh_token(
        &state.pool,
        user.id,
        &AuthService::hash_token(&refresh_token),
        payload.device_info.as_deref(),
        None,
        expires_at,
    )
    .await?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: UserPublic::from(user),
    }))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Invalid or expired refresh token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let auth_service = AuthService::new(state.config.clone());
    let claims = auth_service.verify_token(&payload.refresh_token)?;

    if claims.token_type != "refresh" {
        return Err(AppError::Unauthorized);
    }

    let token_hash = AuthService::hash_token(&payload.refresh_token);
    if !AuthService::refresh_token_exists(&state.pool, &token_hash).await? {
        return Err(AppError::Unauthorized);
    }

    let user_id = uuid::Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;
    let user = AuthService::get_user_by_id(&state.pool, user_id).await?;

    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    // Rotate: old refresh token out, new one in
    AuthService::delete_refresh_token(&state.pool, &token_hash).await?;

    let access_token = auth_service.generate_access_token(&user)?;
    let new_refresh_token = auth_service.generate_refresh_token(&user)?;

    let expires_at = Utc::now() + Duration::seconds(state.config.jwt_refresh_expiry);
    AuthService::save_refresh_token(
        &state.pool,
        user.id,
        &AuthService::hash_token(&new_refresh_token),
        None,
        None,
        expires_at,
    )
    .await?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: new_refresh_token,
    }))
}

/// Invalidate a refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Logged out", body = LogoutResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AppResult<Json<Value>> {
    let token_hash = AuthService::hash_token(&payload.refresh_token);
    AuthService::delete_refresh_token(&state.pool, &token_hash).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out"
    })))
}
