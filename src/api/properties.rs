use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{is_landlord_or_admin, AppState, AuthUser};
use crate::models::{
    AssignManagerRequest, AssignTenantRequest, CreatePropertyRequest, Property, PropertyImage,
    PropertyResponse, PropertyStatus, SearchPropertiesQuery, UpdatePropertyRequest, UserRole,
};
use crate::services::{
    file_service::{validate_image_content_type, MAX_IMAGE_SIZE},
    FileService,
};
use crate::utils::validators::validate_zip_code;

/// Generic success envelope
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

/// Image upload confirmation
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ImageUploadResponse {
    pub success: bool,
    pub url: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_property))
        .route("/", get(list_properties))
        .route("/:id", get(get_property))
        .route("/:id", put(update_property))
        .route("/:id", delete(delete_property))
        .route("/:id/images", post(upload_image))
        .route("/:id/tenant", post(assign_tenant))
        .route("/:id/tenant", delete(unassign_tenant))
        .route("/:id/manager", post(assign_manager))
}

/// Loads a property and checks the caller owns it (admins pass).
async fn get_owned_property(
    state: &AppState,
    property_id: Uuid,
    auth_user: &AuthUser,
) -> AppResult<Property> {
    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
        .bind(property_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

    if property.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    Ok(property)
}

async fn build_property_response(
    state: &AppState,
    property: Property,
) -> AppResult<PropertyResponse> {
    let tenant_name: Option<String> = if let Some(tenant_id) = property.current_tenant_id {
        sqlx::query_as::<_, (String, String)>(
            "SELECT first_name, last_name FROM users WHERE id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&state.pool)
        .await?
        .map(|(f, l)| format!("{} {}", f, l))
    } else {
        None
    };

    let images: Vec<(String,)> = sqlx::query_as(
        "SELECT url FROM property_images WHERE property_id = $1 ORDER BY sort_order",
    )
    .bind(property.id)
    .fetch_all(&state.pool)
    .await?;

    let address = match (&property.state, &property.zip_code) {
        (Some(st), Some(zip)) => format!("{}, {}, {} {}", property.street, property.city, st, zip),
        _ => format!("{}, {}", property.street, property.city),
    };

    Ok(PropertyResponse {
        id: property.id,
        landlord_id: property.landlord_id,
        current_tenant_id: property.current_tenant_id,
        current_tenant_name: tenant_name,
        assigned_manager_id: property.assigned_manager_id,
        title: property.title,
        description: property.description,
        property_type: property.property_type,
        address,
        bedrooms: property.bedrooms,
        bathrooms: property.bathrooms,
        area_sqm: property.area_sqm,
        rent_amount: property.rent_amount,
        deposit_amount: property.deposit_amount,
        status: property.status,
        is_available: property.is_available,
        images: images.into_iter().map(|(url,)| url).collect(),
        created_at: property.created_at,
    })
}

/// Create a property listing
#[utoipa::path(
    post,
    path = "/api/v1/properties",
    tag = "properties",
    security(("bearer_auth" = [])),
    request_body = CreatePropertyRequest,
    responses(
        (status = 200, description = "Property created", body = PropertyResponse),
        (status = 403, description = "Landlords only"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_property(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreatePropertyRequest>,
) -> AppResult<Json<PropertyResponse>> {
    if !is_landlord_or_admin(&auth_user.role) {
        return Err(AppError::Forbidden);
    }

    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    if payload.rent_amount.is_sign_negative() || payload.deposit_amount.is_sign_negative() {
        return Err(AppError::Validation(
            "Amounts cannot be negative".to_string(),
        ));
    }

    if let Some(zip) = &payload.zip_code {
        if !validate_zip_code(zip) {
            return Err(AppError::Validation("Invalid ZIP code".to_string()));
        }
    }

    let property = sqlx::query_as::<_, Property>(
        r#"
        INSERT INTO properties (
            landlord_id, title, description, property_type, street, city, state,
            zip_code, bedrooms, bathrooms, area_sqm, rent_amount, deposit_amount,
            status, is_available
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, true)
        RETURNING *
        "#,
    )
    .bind(auth_user.user_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.property_type)
    .bind(&payload.street)
    .bind(&payload.city)
    .bind(&payload.state)
    .bind(&payload.zip_code)
    .bind(payload.bedrooms)
    .bind(payload.bathrooms)
    .bind(payload.area_sqm)
    .bind(payload.rent_amount)
    .bind(payload.deposit_amount)
    .bind(PropertyStatus::Available)
    .fetch_one(&state.pool)
    .await?;

    let response = build_property_response(&state, property).await?;
    Ok(Json(response))
}

/// Search and list properties
#[utoipa::path(
    get,
    path = "/api/v1/properties",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(SearchPropertiesQuery),
    responses(
        (status = 200, description = "Property list", body = Vec<PropertyResponse>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_properties(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<SearchPropertiesQuery>,
) -> AppResult<Json<Vec<PropertyResponse>>> {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.page.unwrap_or(0) * limit;
    let search_pattern = query.query.as_ref().map(|q| format!("%{}%", q));

    // Landlords and managers see their own portfolio; tenants browse
    // available listings plus the property they occupy.
    let properties = match auth_user.role {
        UserRole::Landlord => {
            sqlx::query_as::<_, Property>(
                r#"
                SELECT * FROM properties
                WHERE landlord_id = $1
                  AND ($2::varchar IS NULL OR city ILIKE $2)
                  AND ($3::varchar IS NULL OR property_type::text = $3)
                  AND ($4::varchar IS NULL OR status::text = $4)
                  AND ($5::varchar IS NULL OR title ILIKE $5 OR street ILIKE $5)
                ORDER BY created_at DESC
                LIMIT $6 OFFSET $7
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.city)
            .bind(&query.property_type)
            .bind(&query.status)
            .bind(&search_pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        UserRole::Manager => {
            sqlx::query_as::<_, Property>(
                r#"
                SELECT * FROM properties
                WHERE assigned_manager_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(auth_user.user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            sqlx::query_as::<_, Property>(
                r#"
                SELECT * FROM properties
                WHERE (is_available = true OR current_tenant_id = $1)
                  AND ($2::varchar IS NULL OR city ILIKE $2)
                  AND ($3::varchar IS NULL OR property_type::text = $3)
                  AND ($4::numeric IS NULL OR rent_amount >= $4)
                  AND ($5::numeric IS NULL OR rent_amount <= $5)
                  AND ($6::varchar IS NULL OR title ILIKE $6 OR street ILIKE $6)
                ORDER BY created_at DESC
                LIMIT $7 OFFSET $8
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.city)
            .bind(&query.property_type)
            .bind(query.min_rent)
            .bind(query.max_rent)
            .bind(&search_pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
    };

    let mut response = Vec::new();
    for property in properties {
        response.push(build_property_response(&state, property).await?);
    }

    Ok(Json(response))
}

/// Property details
#[utoipa::path(
    get,
    path = "/api/v1/properties/{id}",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Property", body = PropertyResponse),
        (status = 404, description = "Property not found")
    )
)]
pub async fn get_property(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PropertyResponse>> {
    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

    let response = build_property_response(&state, property).await?;
    Ok(Json(response))
}

/// Update a property
#[utoipa::path(
    put,
    path = "/api/v1/properties/{id}",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    request_body = UpdatePropertyRequest,
    responses(
        (status = 200, description = "Property updated", body = PropertyResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Property not found"),
        (status = 409, description = "Status conflicts with tenant assignment")
    )
)]
pub async fn update_property(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePropertyRequest>,
) -> AppResult<Json<PropertyResponse>> {
    let property = get_owned_property(&state, id, &auth_user).await?;

    // Occupancy is driven by tenant assignment, not by hand
    if let Some(status) = &payload.status {
        if *status == PropertyStatus::Occupied && property.current_tenant_id.is_none() {
            return Err(AppError::Conflict(
                "Cannot mark a property occupied without a tenant".to_string(),
            ));
        }
        if *status != PropertyStatus::Occupied && property.current_tenant_id.is_some() {
            return Err(AppError::Conflict(
                "Property has a tenant assigned; unassign first".to_string(),
            ));
        }
    }

    let updated = sqlx::query_as::<_, Property>(
        r#"
        UPDATE properties SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            bedrooms = COALESCE($4, bedrooms),
            bathrooms = COALESCE($5, bathrooms),
            area_sqm = COALESCE($6, area_sqm),
            rent_amount = COALESCE($7, rent_amount),
            deposit_amount = COALESCE($8, deposit_amount),
            status = COALESCE($9, status),
            is_available = (COALESCE($9, status) = 'available'),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.bedrooms)
    .bind(payload.bathrooms)
    .bind(payload.area_sqm)
    .bind(payload.rent_amount)
    .bind(payload.deposit_amount)
    .bind(&payload.status)
    .fetch_one(&state.pool)
    .await?;

    let response = build_property_response(&state, updated).await?;
    Ok(Json(response))
}

/// Delete a property
#[utoipa::path(
    delete,
    path = "/api/v1/properties/{id}",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Property deleted", body = SuccessResponse),
        (status = 403, description = "Not the owner"),
        (status = 409, description = "Tenant still assigned")
    )
)]
pub async fn delete_property(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let property = get_owned_property(&state, id, &auth_user).await?;

    if property.current_tenant_id.is_some() {
        return Err(AppError::Conflict(
            "Cannot delete a property with an assigned tenant".to_string(),
        ));
    }

    sqlx::query("DELETE FROM properties WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Property deleted"
    })))
}

/// Upload a property image
#[utoipa::path(
    post,
    path = "/api/v1/properties/{id}/images",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image uploaded", body = ImageUploadResponse),
        (status = 400, description = "Invalid file"),
        (status = 403, description = "Not the owner")
    )
)]
pub async fn upload_image(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    get_owned_property(&state, id, &auth_user).await?;

    let file_service = FileService::new(&state.config).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "image" {
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
                .upload_file("properties", &file_name, &content_type, data.to_vec())
                .await?;

            sqlx::query_as::<_, PropertyImage>(
                r#"
                INSERT INTO property_images (property_id, url, sort_order)
                VALUES ($1, $2, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM property_images WHERE property_id = $1))
                RETURNING *
                "#,
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

/// Assign a tenant to a property
#[utoipa::path(
    post,
    path = "/api/v1/properties/{id}/tenant",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    request_body = AssignTenantRequest,
    responses(
        (status = 200, description = "Tenant assigned", body = SuccessResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Tenant not found"),
        (status = 409, description = "Property already occupied")
    )
)]
pub async fn assign_tenant(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTenantRequest>,
) -> AppResult<Json<Value>> {
    let property = get_owned_property(&state, id, &auth_user).await?;

    if property.current_tenant_id.is_some() {
        return Err(AppError::Conflict(
            "Property already has a tenant".to_string(),
        ));
    }

    let tenant: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'tenant'")
            .bind(payload.tenant_id)
            .fetch_optional(&state.pool)
            .await?;

    if tenant.is_none() {
        return Err(AppError::NotFound("Tenant not found".to_string()));
    }

    sqlx::query(
        r#"
        UPDATE properties
        SET current_tenant_id = $2, status = 'occupied', is_available = false, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.tenant_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Tenant assigned"
    })))
}

/// Remove the current tenant from a property
#[utoipa::path(
    delete,
    path = "/api/v1/properties/{id}/tenant",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Tenant unassigned", body = SuccessResponse),
        (status = 403, description = "Not the owner"),
        (status = 409, description = "An active lease exists")
    )
)]
pub async fn unassign_tenant(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    get_owned_property(&state, id, &auth_user).await?;

    let active_lease: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM leases WHERE property_id = $1 AND status = 'active'")
            .bind(id)
            .fetch_optional(&state.pool)
            .await?;

    if active_lease.is_some() {
        return Err(AppError::Conflict(
            "Terminate the active lease before unassigning the tenant".to_string(),
        ));
    }

    sqlx::query(
        r#"
        UPDATE properties
        SET current_tenant_id = NULL, status = 'available', is_available = true, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(&state.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Tenant unassigned"
    })))
}

/// Assign a manager to a property
#[utoipa::path(
    post,
    path = "/api/v1/properties/{id}/manager",
    tag = "properties",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    request_body = AssignManagerRequest,
    responses(
        (status = 200, description = "Manager assigned", body = SuccessResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Manager not found")
    )
)]
pub async fn assign_manager(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignManagerRequest>,
) -> AppResult<Json<Value>> {
    get_owned_property(&state, id, &auth_user).await?;

    let manager: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'manager'")
            .bind(payload.manager_id)
            .fetch_optional(&state.pool)
            .await?;

    if manager.is_none() {
        return Err(AppError::NotFound("Manager not found".to_string()));
    }

    sqlx::query("UPDATE properties SET assigned_manager_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(payload.manager_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Manager assigned"
    })))
}
