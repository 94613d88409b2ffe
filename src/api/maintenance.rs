use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    update_mask_for_role, AssignMaintenanceRequest, CreateMaintenanceRequest, MaintenancePhoto,
    MaintenanceQuery, MaintenanceRequest, MaintenanceRequestResponse, MaintenanceStatus,
    UpdateMaintenanceRequest, UserRole,
};
use crate::services::{
    file_service::{validate_image_content_type, MAX_IMAGE_SIZE},
    EmailService, FileService,
};
use crate::utils::validators::sanitize_string;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_request))
        .route("/", get(list_requests))
        .route("/:id", get(get_request))
        .route("/:id", put(update_request))
        .route("/:id", delete(delete_request))
        .route("/:id/assign", post(assign_request))
        .route("/:id/photos", post(upload_photo))
}

async fn load_request(state: &AppState, id: Uuid) -> AppResult<MaintenanceRequest> {
    sqlx::query_as::<_, MaintenanceRequest>("SELECT * FROM maintenance_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Maintenance request not found".to_string()))
}

fn check_request_access(request: &MaintenanceRequest, auth_user: &AuthUser) -> AppResult<()> {
    let allowed = request.tenant_id == auth_user.user_id
        || request.landlord_id == auth_user.user_id
        || request.assigned_manager_id == Some(auth_user.user_id)
        || auth_user.role == UserRole::Admin;

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

async fn build_request_response(
    state: &AppState,
    request: MaintenanceRequest,
) -> AppResult<MaintenanceRequestResponse> {
    let property_title: Option<String> =
        sqlx::query_as::<_, (String,)>("SELECT title FROM properties WHERE id = $1")
            .bind(request.property_id)
            .fetch_optional(&state.pool)
            .await?
            .map(|(t,)| t);

    let tenant_name: Option<String> = sqlx::query_as::<_, (String, String)>(
        "SELECT first_name, last_name FROM users WHERE id = $1",
    )
    .bind(request.tenant_id)
    .fetch_optional(&state.pool)
    .await?
    .map(|(f, l)| format!("{} {}", f, l));

    let manager_name: Option<String> = if let Some(manager_id) = request.assigned_manager_id {
        sqlx::query_as::<_, (String, String)>(
            "SELECT first_name, last_name FROM users WHERE id = $1",
        )
        .bind(manager_id)
        .fetch_optional(&state.pool)
        .await?
        .map(|(f, l)| format!("{} {}", f, l))
    } else {
        None
    };

    let photos: Vec<(String,)> = sqlx::query_as(
        "SELECT url FROM maintenance_photos WHERE request_id = $1 ORDER BY created_at",
    )
    .bind(request.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(MaintenanceRequestResponse {
        id: request.id,
        property_id: request.property_id,
        property_title,
        tenant_id: request.tenant_id,
        tenant_name,
        assigned_manager_id: request.assigned_manager_id,
        assigned_manager_name: manager_name,
        title: request.title,
        description: request.description,
        category: request.category,
        priority: request.priority,
        status: request.status,
        notes: request.notes,
        photos: photos.into_iter().map(|(url,)| url).collect(),
        completed_at: request.completed_at,
        created_at: request.created_at,
    })
}

/// File a maintenance request
#[utoipa::path(
    post,
    path = "/api/v1/maintenance",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    request_body = CreateMaintenanceRequest,
    responses(
        (status = 200, description = "Request filed", body = MaintenanceRequestResponse),
        (status = 403, description = "Caller is not the property's tenant"),
        (status = 404, description = "Property not found"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateMaintenanceRequest>,
) -> AppResult<Json<MaintenanceRequestResponse>> {
    let title = sanitize_string(&payload.title);
    let description = sanitize_string(&payload.description);
    if title.is_empty() || description.is_empty() {
        return Err(AppError::Validation(
            "Title and description are required".to_string(),
        ));
    }

    let property: Option<(Uuid, Option<Uuid>, Option<Uuid>)> = sqlx::query_as(
        "SELECT landlord_id, current_tenant_id, assigned_manager_id FROM properties WHERE id = $1",
    )
    .bind(payload.property_id)
    .fetch_optional(&state.pool)
    .await?;

    let (landlord_id, current_tenant_id, assigned_manager_id) =
        property.ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

    // Only the tenant living in the unit can open a request for it.
    if current_tenant_id != Some(auth_user.user_id) {
        return Err(AppError::Forbidden);
    }

    let request = sqlx::query_as::<_, MaintenanceRequest>(
        r#"
        INSERT INTO maintenance_requests
            (property_id, tenant_id, landlord_id, assigned_manager_id,
             title, description, category, priority, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'open')
        RETURNING *
        "#,
    )
    .bind(payload.property_id)
    .bind(auth_user.user_id)
    .bind(landlord_id)
    .bind(assigned_manager_id)
    .bind(&title)
    .bind(&description)
    .bind(&payload.category)
    .bind(payload.priority.unwrap_or_default())
    .fetch_one(&state.pool)
    .await?;

    notify_landlord(&state, &request);

    let response = build_request_response(&state, request).await?;
    Ok(Json(response))
}

/// Landlord notification, detached from the request.
fn notify_landlord(state: &AppState, request: &MaintenanceRequest) {
    let pool = state.pool.clone();
    let config = state.config.clone();
    let landlord_id = request.landlord_id;
    let property_id = request.property_id;
    let request_title = request.title.clone();

    tokio::spawn(async move {
        let lookup: Result<Option<(String, String)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT u.email, p.title
            FROM users u, properties p
            WHERE u.id = $1 AND p.id = $2
            "#,
        )
        .bind(landlord_id)
        .bind(property_id)
        .fetch_optional(&pool)
        .await;

        let (email, property_title) = match lookup {
            Ok(Some(pair)) => pair,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Maintenance notice lookup failed: {}", e);
                return;
            }
        };

        let email_service = EmailService::new(config);
        if let Err(e) = email_service
            .send_maintenance_notice(&email, &property_title, &request_title)
            .await
        {
            tracing::error!("Failed to send maintenance notice: {}", e);
        }
    });
}

/// Maintenance requests visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/maintenance",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    params(MaintenanceQuery),
    responses(
        (status = 200, description = "Request list", body = Vec<MaintenanceRequestResponse>)
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<MaintenanceQuery>,
) -> AppResult<Json<Vec<MaintenanceRequestResponse>>> {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.page.unwrap_or(0) * limit;

    let requests = match auth_user.role {
        UserRole::Admin => {
            sqlx::query_as::<_, MaintenanceRequest>(
                r#"
                SELECT * FROM maintenance_requests
                WHERE ($1::varchar IS NULL OR status::text = $1)
                  AND ($2::varchar IS NULL OR category::text = $2)
                  AND ($3::uuid IS NULL OR property_id = $3)
                ORDER BY created_at DESC
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(&query.status)
            .bind(&query.category)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        UserRole::Manager => {
            sqlx::query_as::<_, MaintenanceRequest>(
                r#"
                SELECT * FROM maintenance_requests
                WHERE assigned_manager_id = $1
                  AND ($2::varchar IS NULL OR status::text = $2)
                  AND ($3::varchar IS NULL OR category::text = $3)
                  AND ($4::uuid IS NULL OR property_id = $4)
                ORDER BY created_at DESC
                LIMIT $5 OFFSET $6
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.status)
            .bind(&query.category)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            sqlx::query_as::<_, MaintenanceRequest>(
                r#"
                SELECT * FROM maintenance_requests
                WHERE (tenant_id = $1 OR landlord_id = $1)
                  AND ($2::varchar IS NULL OR status::text = $2)
                  AND ($3::varchar IS NULL OR category::text = $3)
                  AND ($4::uuid IS NULL OR property_id = $4)
                ORDER BY created_at DESC
                LIMIT $5 OFFSET $6
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.status)
            .bind(&query.category)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
    };

    let mut response = Vec::new();
    for request in requests {
        response.push(build_request_response(&state, request).await?);
    }

    Ok(Json(response))
}

/// Maintenance request details
#[utoipa::path(
    get,
    path = "/api/v1/maintenance/{id}",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request", body = MaintenanceRequestResponse),
        (status = 403, description = "Not involved in the request"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MaintenanceRequestResponse>> {
    let request = load_request(&state, id).await?;
    check_request_access(&request, &auth_user)?;

    let response = build_request_response(&state, request).await?;
    Ok(Json(response))
}

/// Update a maintenance request within the caller's field mask
#[utoipa::path(
    put,
    path = "/api/v1/maintenance/{id}",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    request_body = UpdateMaintenanceRequest,
    responses(
        (status = 200, description = "Request updated", body = MaintenanceRequestResponse),
        (status = 403, description = "Field not permitted for the caller's role"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn update_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMaintenanceRequest>,
) -> AppResult<Json<MaintenanceRequestResponse>> {
    let request = load_request(&state, id).await?;
    check_request_access(&request, &auth_user)?;

    let mask = update_mask_for_role(&auth_user.role);
    if payload.violates_mask(&mask) {
        return Err(AppError::Forbidden);
    }

    let completing = payload.status == Some(MaintenanceStatus::Completed)
        && request.status != MaintenanceStatus::Completed;

    let updated = sqlx::query_as::<_, MaintenanceRequest>(
        r#"
        UPDATE maintenance_requests SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            priority = COALESCE($5, priority),
            status = COALESCE($6, status),
            notes = COALESCE($7, notes),
            completed_at = CASE WHEN $8 THEN NOW() ELSE completed_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(&payload.priority)
    .bind(&payload.status)
    .bind(&payload.notes)
    .bind(completing)
    .fetch_one(&state.pool)
    .await?;

    let response = build_request_response(&state, updated).await?;
    Ok(Json(response))
}

/// Delete a maintenance request
#[utoipa::path(
    delete,
    path = "/api/v1/maintenance/{id}",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request deleted"),
        (status = 403, description = "Only the landlord can delete")
    )
)]
pub async fn delete_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let request = load_request(&state, id).await?;

    if request.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    sqlx::query("DELETE FROM maintenance_requests WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Maintenance request deleted"
    })))
}

/// Assign a manager to work the request
#[utoipa::path(
    post,
    path = "/api/v1/maintenance/{id}/assign",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    request_body = AssignMaintenanceRequest,
    responses(
        (status = 200, description = "Manager assigned", body = MaintenanceRequestResponse),
        (status = 403, description = "Only the landlord can assign"),
        (status = 404, description = "Manager not found")
    )
)]
pub async fn assign_request(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignMaintenanceRequest>,
) -> AppResult<Json<MaintenanceRequestResponse>> {
    let request = load_request(&state, id).await?;

    if request.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    let manager: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'manager'")
            .bind(payload.manager_id)
            .fetch_optional(&state.pool)
            .await?;

    if manager.is_none() {
        return Err(AppError::NotFound("Manager not found".to_string()));
    }

    let updated = sqlx::query_as::<_, MaintenanceRequest>(
        r#"
        UPDATE maintenance_requests
        SET assigned_manager_id = $2,
            status = CASE WHEN status = 'open' THEN 'in_progress'::maintenance_status ELSE status END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.manager_id)
    .fetch_one(&state.pool)
    .await?;

    let response = build_request_response(&state, updated).await?;
    Ok(Json(response))
}

/// Attach a photo to a maintenance request
#[utoipa::path(
    post,
    path = "/api/v1/maintenance/{id}/photos",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photo uploaded"),
        (status = 400, description = "Invalid file"),
        (status = 403, description = "Not involved in the request")
    )
)]
pub async fn upload_photo(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let request = load_request(&state, id).await?;
    check_request_access(&request, &auth_user)?;

    let file_service = FileService::new(&state.config).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "photo" {
            let content_type = field
                .content_type()
                .ok_or_else(|| AppError::BadRequest("Missing Content-Type".to_string()))?
                .to_string();

            if !validate_image_content_type(&content_type) {
                return Err(AppError::BadRequest(
                    "Unsupported image format".to_string(),
                ));
            }

            let file_name = field.file_name().unwrap_or("photo.jpg").to_string();

            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;

            if data.len() > MAX_IMAGE_SIZE {
                return Err(AppError::BadRequest("File too large".to_string()));
            }

            let url = file_service
                .upload_file("maintenance", &file_name, &content_type, data.to_vec())
                .await?;

            sqlx::query_as::<_, MaintenancePhoto>(
                "INSERT INTO maintenance_photos (request_id, url) VALUES ($1, $2) RETURNING *",
            )
            .bind(id)
            .bind(&url)
            .fetch_one(&state.pool)
            .await?;

            return Ok(Json(json!({
                "success": true,
                "url": url
            })));
        }
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}
