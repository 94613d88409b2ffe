use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    can_terminate, ranges_overlap, status_after_sign, CreateLeaseRequest, Lease, LeaseParty,
    LeaseResponse, LeaseSignature, LeaseStatus, LeasesQuery, Property, SignLeaseRequest,
    UpdateLeaseRequest, UserRole,
};
use crate::services::{billing_service, DocumentService, EmailService};
use crate::utils::validators::{validate_date_range, validate_due_day};

/// Payment generation outcome for a single lease
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct GeneratePaymentResponse {
    pub success: bool,
    pub created: bool,
    pub message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_lease))
        .route("/", get(list_leases))
        .route("/:id", get(get_lease))
        .route("/:id", put(update_lease))
        .route("/:id", delete(delete_lease))
        .route("/:id/sign", post(sign_lease))
        .route("/:id/terminate", post(terminate_lease))
        .route("/:id/generate-payment", post(generate_lease_payment))
}

async fn load_lease(state: &AppState, id: Uuid) -> AppResult<Lease> {
    sqlx::query_as::<_, Lease>("SELECT * FROM leases WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Lease not found".to_string()))
}

/// A lease is visible to its two parties, the property's assigned
/// manager, and admins.
async fn check_lease_access(state: &AppState, lease: &Lease, auth_user: &AuthUser) -> AppResult<()> {
    if lease.party_of(auth_user.user_id).is_some() || auth_user.role == UserRole::Admin {
        return Ok(());
    }

    if auth_user.role == UserRole::Manager {
        let managed: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM properties WHERE id = $1 AND assigned_manager_id = $2",
        )
        .bind(lease.property_id)
        .bind(auth_user.user_id)
        .fetch_optional(&state.pool)
        .await?;

        if managed.is_some() {
            return Ok(());
        }
    }

    Err(AppError::Forbidden)
}

async fn build_lease_response(state: &AppState, lease: Lease) -> AppResult<LeaseResponse> {
    let property: Option<(String, String, String)> =
        sqlx::query_as("SELECT title, street, city FROM properties WHERE id = $1")
            .bind(lease.property_id)
            .fetch_optional(&state.pool)
            .await?;

    let landlord_name: Option<String> = sqlx::query_as::<_, (String, String)>(
        "SELECT first_name, last_name FROM users WHERE id = $1",
    )
    .bind(lease.landlord_id)
    .fetch_optional(&state.pool)
    .await?
    .map(|(f, l)| format!("{} {}", f, l));

    let tenant_name: Option<String> = sqlx::query_as::<_, (String, String)>(
        "SELECT first_name, last_name FROM users WHERE id = $1",
    )
    .bind(lease.tenant_id)
    .fetch_optional(&state.pool)
    .await?
    .map(|(f, l)| format!("{} {}", f, l));

    let is_fully_signed = lease.is_fully_signed();

    Ok(LeaseResponse {
        id: lease.id,
        property_id: lease.property_id,
        property_title: property.as_ref().map(|(t, _, _)| t.clone()),
        property_address: property.as_ref().map(|(_, s, c)| format!("{}, {}", s, c)),
        landlord_id: lease.landlord_id,
        landlord_name,
        tenant_id: lease.tenant_id,
        tenant_name,
        start_date: lease.start_date,
        end_date: lease.end_date,
        rent_amount: lease.rent_amount,
        deposit_amount: lease.deposit_amount,
        payment_due_day: lease.payment_due_day,
        terms: lease.terms,
        status: lease.status,
        landlord_signature: LeaseSignature {
            signed: lease.landlord_signed,
            signed_at: lease.landlord_signed_at,
            ip_address: lease.landlord_signature_ip,
        },
        tenant_signature: LeaseSignature {
            signed: lease.tenant_signed,
            signed_at: lease.tenant_signed_at,
            ip_address: lease.tenant_signature_ip,
        },
        is_fully_signed,
        document_url: lease.document_url,
        created_at: lease.created_at,
    })
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

/// Create a draft lease
#[utoipa::path(
    post,
    path = "/api/v1/leases",
    tag = "leases",
    security(("bearer_auth" = [])),
    request_body = CreateLeaseRequest,
    responses(
        (status = 200, description = "Lease created", body = LeaseResponse),
        (status = 403, description = "Not the property owner"),
        (status = 404, description = "Property or tenant not found"),
        (status = 409, description = "Overlapping lease exists"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_lease(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateLeaseRequest>,
) -> AppResult<Json<LeaseResponse>> {
    let property = sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
        .bind(payload.property_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

    if property.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    if !validate_date_range(payload.start_date, payload.end_date) {
        return Err(AppError::Validation(
            "Lease start date cannot be after the end date".to_string(),
        ));
    }

    if !validate_due_day(payload.payment_due_day) {
        return Err(AppError::Validation(
            "Payment due day must be between 1 and 31".to_string(),
        ));
    }

    let tenant: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 AND role = 'tenant' AND is_active = true")
            .bind(payload.tenant_id)
            .fetch_optional(&state.pool)
            .await?;

    if tenant.is_none() {
        return Err(AppError::NotFound("Tenant not found".to_string()));
    }

    // Reject terms that collide with a live lease on the property.
    let existing = sqlx::query_as::<_, Lease>(
        "SELECT * FROM leases WHERE property_id = $1 AND status IN ('pending', 'active')",
    )
    .bind(payload.property_id)
    .fetch_all(&state.pool)
    .await?;

    for lease in &existing {
        if ranges_overlap(
            lease.start_date,
            lease.end_date,
            payload.start_date,
            payload.end_date,
        ) {
            return Err(AppError::Conflict(
                "An overlapping lease already exists for this property".to_string(),
            ));
        }
    }

    let rent_amount = payload.rent_amount.unwrap_or(property.rent_amount);
    let deposit_amount = payload.deposit_amount.unwrap_or(property.deposit_amount);

    let lease = sqlx::query_as::<_, Lease>(
        r#"
        INSERT INTO leases (
            property_id, landlord_id, tenant_id, start_date, end_date,
            rent_amount, deposit_amount, payment_due_day, terms, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'draft')
        RETURNING *
        "#,
    )
    .bind(payload.property_id)
    .bind(property.landlord_id)
    .bind(payload.tenant_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(rent_amount)
    .bind(deposit_amount)
    .bind(payload.payment_due_day)
    .bind(&payload.terms)
    .fetch_one(&state.pool)
    .await?;

    let response = build_lease_response(&state, lease).await?;
    Ok(Json(response))
}

/// Leases visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/leases",
    tag = "leases",
    security(("bearer_auth" = [])),
    params(LeasesQuery),
    responses(
        (status = 200, description = "Lease list", body = Vec<LeaseResponse>)
    )
)]
pub async fn list_leases(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<LeasesQuery>,
) -> AppResult<Json<Vec<LeaseResponse>>> {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.page.unwrap_or(0) * limit;

    let leases = match auth_user.role {
        UserRole::Manager => {
            sqlx::query_as::<_, Lease>(
                r#"
                SELECT l.* FROM leases l
                JOIN properties p ON p.id = l.property_id
                WHERE p.assigned_manager_id = $1
                  AND ($2::varchar IS NULL OR l.status::text = $2)
                  AND ($3::uuid IS NULL OR l.property_id = $3)
                ORDER BY l.created_at DESC
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.status)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        UserRole::Admin => {
            sqlx::query_as::<_, Lease>(
                r#"
                SELECT * FROM leases
                WHERE ($1::varchar IS NULL OR status::text = $1)
                  AND ($2::uuid IS NULL OR property_id = $2)
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(&query.status)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            sqlx::query_as::<_, Lease>(
                r#"
                SELECT * FROM leases
                WHERE (landlord_id = $1 OR tenant_id = $1)
                  AND ($2::varchar IS NULL OR status::text = $2)
                  AND ($3::uuid IS NULL OR property_id = $3)
                ORDER BY created_at DESC
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.status)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
    };

    let mut response = Vec::new();
    for lease in leases {
        response.push(build_lease_response(&state, lease).await?);
    }

    Ok(Json(response))
}

/// Lease details
#[utoipa::path(
    get,
    path = "/api/v1/leases/{id}",
    tag = "leases",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Lease ID")
    ),
    responses(
        (status = 200, description = "Lease", body = LeaseResponse),
        (status = 403, description = "Not a party to the lease"),
        (status = 404, description = "Lease not found")
    )
)]
pub async fn get_lease(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LeaseResponse>> {
    let lease = load_lease(&state, id).await?;
    check_lease_access(&state, &lease, &auth_user).await?;

    let response = build_lease_response(&state, lease).await?;
    Ok(Json(response))
}

/// Update lease terms
#[utoipa::path(
    put,
    path = "/api/v1/leases/{id}",
    tag = "leases",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Lease ID")
    ),
    request_body = UpdateLeaseRequest,
    responses(
        (status = 200, description = "Lease updated", body = LeaseResponse),
        (status = 403, description = "Only the landlord can amend terms"),
        (status = 409, description = "Lease is active and fully signed")
    )
)]
pub async fn update_lease(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLeaseRequest>,
) -> AppResult<Json<LeaseResponse>> {
    let lease = load_lease(&state, id).await?;

    if lease.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    // A live, fully-signed agreement is immutable; terminate it instead.
    if lease.status == LeaseStatus::Active && lease.is_fully_signed() {
        return Err(AppError::Conflict(
            "Cannot amend an active lease; terminate it first".to_string(),
        ));
    }

    if let Some(day) = payload.payment_due_day {
        if !validate_due_day(day) {
            return Err(AppError::Validation(
                "Payment due day must be between 1 and 31".to_string(),
            ));
        }
    }

    let new_start = payload.start_date.unwrap_or(lease.start_date);
    let new_end = payload.end_date.unwrap_or(lease.end_date);
    if !validate_date_range(new_start, new_end) {
        return Err(AppError::Validation(
            "Lease start date cannot be after the end date".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, Lease>(
        r#"
        UPDATE leases SET
            start_date = COALESCE($2, start_date),
            end_date = COALESCE($3, end_date),
            rent_amount = COALESCE($4, rent_amount),
            deposit_amount = COALESCE($5, deposit_amount),
            payment_due_day = COALESCE($6, payment_due_day),
            terms = COALESCE($7, terms),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.rent_amount)
    .bind(payload.deposit_amount)
    .bind(payload.payment_due_day)
    .bind(&payload.terms)
    .fetch_one(&state.pool)
    .await?;

    let response = build_lease_response(&state, updated).await?;
    Ok(Json(response))
}

/// Delete an unsigned lease
#[utoipa::path(
    delete,
    path = "/api/v1/leases/{id}",
    tag = "leases",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Lease ID")
    ),
    responses(
        (status = 200, description = "Lease deleted"),
        (status = 403, description = "Only the landlord can delete"),
        (status = 409, description = "Lease is active and fully signed")
    )
)]
pub async fn delete_lease(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let lease = load_lease(&state, id).await?;

    if lease.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    if lease.status == LeaseStatus::Active && lease.is_fully_signed() {
        return Err(AppError::Conflict(
            "Cannot delete an active lease; terminate it first".to_string(),
        ));
    }

    sqlx::query("DELETE FROM leases WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Lease deleted"
    })))
}

/// Sign a lease as landlord or tenant
#[utoipa::path(
    post,
    path = "/api/v1/leases/{id}/sign",
    tag = "leases",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Lease ID")
    ),
    request_body = SignLeaseRequest,
    responses(
        (status = 200, description = "Signature recorded", body = LeaseResponse),
        (status = 403, description = "Not a party to the lease"),
        (status = 409, description = "Already signed or lease not signable")
    )
)]
pub async fn sign_lease(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignLeaseRequest>,
) -> AppResult<Json<LeaseResponse>> {
    let lease = load_lease(&state, id).await?;

    let party = lease
        .party_of(auth_user.user_id)
        .ok_or(AppError::Forbidden)?;

    if !matches!(lease.status, LeaseStatus::Draft | LeaseStatus::Pending) {
        return Err(AppError::Conflict(format!(
            "Lease cannot be signed in its current state ({:?})",
            lease.status
        )));
    }

    if lease.has_signed(party) {
        return Err(AppError::Conflict(
            "You have already signed this lease".to_string(),
        ));
    }

    if payload.signature_data.trim().is_empty() {
        return Err(AppError::Validation("Signature data is required".to_string()));
    }

    let ip = client_ip(&headers);
    let now = Utc::now();

    let (landlord_signed, tenant_signed) = match party {
        LeaseParty::Landlord => (true, lease.tenant_signed),
        LeaseParty::Tenant => (lease.landlord_signed, true),
    };
    let new_status = status_after_sign(landlord_signed, tenant_signed);

    let updated = match party {
        LeaseParty::Landlord => {
            sqlx::query_as::<_, Lease>(
                r#"
                UPDATE leases SET
                    landlord_signed = true,
                    landlord_signature_data = $2,
                    landlord_signed_at = $3,
                    landlord_signature_ip = $4,
                    status = $5,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(&payload.signature_data)
            .bind(now)
            .bind(&ip)
            .bind(&new_status)
            .fetch_one(&state.pool)
            .await?
        }
        LeaseParty::Tenant => {
            sqlx::query_as::<_, Lease>(
                r#"
                UPDATE leases SET
                    tenant_signed = true,
                    tenant_signature_data = $2,
                    tenant_signed_at = $3,
                    tenant_signature_ip = $4,
                    status = $5,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(&payload.signature_data)
            .bind(now)
            .bind(&ip)
            .bind(&new_status)
            .fetch_one(&state.pool)
            .await?
        }
    };

    if updated.status == LeaseStatus::Active {
        activate_lease(&state, &updated).await?;
    }

    let response = build_lease_response(&state, updated).await?;
    Ok(Json(response))
}

/// Side effects of the second signature landing: the property becomes
/// occupied by the tenant, the agreement document is rendered, and both
/// parties are notified. Document and email are fire-and-forget.
async fn activate_lease(state: &AppState, lease: &Lease) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE properties
        SET current_tenant_id = $2, status = 'occupied', is_available = false, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(lease.property_id)
    .bind(lease.tenant_id)
    .execute(&state.pool)
    .await?;

    let pool = state.pool.clone();
    let config = state.config.clone();
    let lease_id = lease.id;
    tokio::spawn(async move {
        let document_service = DocumentService::new(config);
        if let Err(e) = document_service.generate_lease_document(&pool, lease_id).await {
            tracing::error!("Failed to generate lease document for {}: {}", lease_id, e);
        }
    });

    let pool = state.pool.clone();
    let config = state.config.clone();
    let lease = lease.clone();
    tokio::spawn(async move {
        let property_title: Option<(String,)> =
            match sqlx::query_as("SELECT title FROM properties WHERE id = $1")
                .bind(lease.property_id)
                .fetch_optional(&pool)
                .await
            {
                Ok(row) => row,
                Err(e) => {
                    tracing::error!("Lease activation email lookup failed: {}", e);
                    return;
                }
            };
        let title = property_title.map(|(t,)| t).unwrap_or_default();

        let emails: Vec<(String,)> =
            match sqlx::query_as("SELECT email FROM users WHERE id = $1 OR id = $2")
                .bind(lease.landlord_id)
                .bind(lease.tenant_id)
                .fetch_all(&pool)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!("Lease activation email lookup failed: {}", e);
                    return;
                }
            };

        let email_service = EmailService::new(config);
        for (email,) in emails {
            if let Err(e) = email_service
                .send_lease_activated(
                    &email,
                    &title,
                    &lease.start_date.to_string(),
                    &lease.end_date.to_string(),
                )
                .await
            {
                tracing::error!("Failed to send lease activation email: {}", e);
            }
        }
    });

    Ok(())
}

/// Terminate a lease
#[utoipa::path(
    post,
    path = "/api/v1/leases/{id}/terminate",
    tag = "leases",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Lease ID")
    ),
    responses(
        (status = 200, description = "Lease terminated", body = LeaseResponse),
        (status = 403, description = "Only the landlord can terminate"),
        (status = 409, description = "Lease is already terminated")
    )
)]
pub async fn terminate_lease(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LeaseResponse>> {
    let lease = load_lease(&state, id).await?;

    if lease.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    if !can_terminate(&lease.status) {
        return Err(AppError::Conflict(
            "Lease is already terminated".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, Lease>(
        "UPDATE leases SET status = 'terminated', updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    // The property goes back on the market whatever state the lease was in.
    sqlx::query(
        r#"
        UPDATE properties
        SET current_tenant_id = NULL, status = 'available', is_available = true, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(lease.property_id)
    .execute(&state.pool)
    .await?;

    let response = build_lease_response(&state, updated).await?;
    Ok(Json(response))
}

/// Generate this month's rent payment for a lease
#[utoipa::path(
    post,
    path = "/api/v1/leases/{id}/generate-payment",
    tag = "leases",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Lease ID")
    ),
    responses(
        (status = 200, description = "Generation outcome", body = GeneratePaymentResponse),
        (status = 403, description = "Only the landlord can generate payments"),
        (status = 409, description = "Lease is not active")
    )
)]
pub async fn generate_lease_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let lease = load_lease(&state, id).await?;

    if lease.landlord_id != auth_user.user_id && auth_user.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    let today = Utc::now().date_naive();
    let created = billing_service::generate_for_lease(&state.pool, &lease, today).await?;

    Ok(Json(json!({
        "success": true,
        "created": created,
        "message": if created {
            "Payment created"
        } else {
            "This month's payment already exists"
        }
    })))
}
