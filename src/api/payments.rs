use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::{is_admin, is_landlord_or_admin, is_tenant, AppState, AuthUser};
use crate::models::{
    generate_receipt_number, CreatePaymentRequest, GenerationSummary, Payment, PaymentResponse,
    PaymentStatus, PaymentsQuery, ProcessPaymentRequest, ReceiptResponse, UserRole,
};
use crate::services::billing_service;
use crate::services::gateway_service::{CardDetails, ChargeResult, GatewayService};
use crate::services::{DocumentService, EmailService};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_payment))
        .route("/", get(list_payments))
        .route("/generate", post(generate_payments))
        .route("/:id", get(get_payment))
        .route("/:id", delete(delete_payment))
        .route("/:id/process", post(process_payment))
        .route("/:id/refund", post(refund_payment))
        .route("/:id/receipt", get(get_receipt))
}

async fn load_payment(state: &AppState, id: Uuid) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
}

fn check_payment_access(payment: &Payment, auth_user: &AuthUser) -> AppResult<()> {
    if payment.tenant_id == auth_user.user_id
        || payment.landlord_id == auth_user.user_id
        || is_admin(&auth_user.role)
    {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

async fn build_payment_response(state: &AppState, payment: Payment) -> AppResult<PaymentResponse> {
    let property_title: Option<String> =
        sqlx::query_as::<_, (String,)>("SELECT title FROM properties WHERE id = $1")
            .bind(payment.property_id)
            .fetch_optional(&state.pool)
            .await?
            .map(|(t,)| t);

    let tenant_name: Option<String> = sqlx::query_as::<_, (String, String)>(
        "SELECT first_name, last_name FROM users WHERE id = $1",
    )
    .bind(payment.tenant_id)
    .fetch_optional(&state.pool)
    .await?
    .map(|(f, l)| format!("{} {}", f, l));

    Ok(PaymentResponse {
        id: payment.id,
        property_id: payment.property_id,
        property_title,
        lease_id: payment.lease_id,
        tenant_id: payment.tenant_id,
        tenant_name,
        landlord_id: payment.landlord_id,
        amount: payment.amount,
        payment_type: payment.payment_type,
        due_date: payment.due_date,
        paid_date: payment.paid_date,
        status: payment.status,
        receipt_number: payment.receipt_number,
        card_last4: payment.card_last4,
        card_brand: payment.card_brand,
        failure_reason: payment.failure_reason,
        notes: payment.notes,
        created_at: payment.created_at,
    })
}

/// Create a payment record
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Payment created", body = PaymentResponse),
        (status = 403, description = "Not allowed for this property"),
        (status = 404, description = "Property not found"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<Json<PaymentResponse>> {
    if payload.amount <= rust_decimal::Decimal::ZERO {
        return Err(AppError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }

    let property: Option<(Uuid, Option<Uuid>)> =
        sqlx::query_as("SELECT landlord_id, current_tenant_id FROM properties WHERE id = $1")
            .bind(payload.property_id)
            .fetch_optional(&state.pool)
            .await?;

    let (landlord_id, current_tenant_id) =
        property.ok_or_else(|| AppError::NotFound("Property not found".to_string()))?;

    // Landlords bill a tenant of their choosing; tenants can only raise
    // a payment on the unit they occupy, payable by themselves.
    let tenant_id = if is_landlord_or_admin(&auth_user.role) {
        if landlord_id != auth_user.user_id && !is_admin(&auth_user.role) {
            return Err(AppError::Forbidden);
        }
        payload
            .tenant_id
            .or(current_tenant_id)
            .ok_or_else(|| AppError::Validation("tenant_id is required".to_string()))?
    } else if is_tenant(&auth_user.role) {
        if current_tenant_id != Some(auth_user.user_id) {
            return Err(AppError::Forbidden);
        }
        auth_user.user_id
    } else {
        return Err(AppError::Forbidden);
    };

    if let Some(lease_id) = payload.lease_id {
        let lease: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM leases WHERE id = $1 AND property_id = $2")
                .bind(lease_id)
                .bind(payload.property_id)
                .fetch_optional(&state.pool)
                .await?;
        if lease.is_none() {
            return Err(AppError::NotFound("Lease not found".to_string()));
        }
    }

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments
            (property_id, lease_id, tenant_id, landlord_id, amount, payment_type, due_date, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
        RETURNING *
        "#,
    )
    .bind(payload.property_id)
    .bind(payload.lease_id)
    .bind(tenant_id)
    .bind(landlord_id)
    .bind(payload.amount)
    .bind(&payload.payment_type)
    .bind(payload.due_date)
    .bind(&payload.notes)
    .fetch_one(&state.pool)
    .await?;

    let response = build_payment_response(&state, payment).await?;
    Ok(Json(response))
}

/// Payments visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(PaymentsQuery),
    responses(
        (status = 200, description = "Payment list", body = Vec<PaymentResponse>)
    )
)]
pub async fn list_payments(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<PaymentsQuery>,
) -> AppResult<Json<Vec<PaymentResponse>>> {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.page.unwrap_or(0) * limit;

    let payments = match auth_user.role {
        UserRole::Admin => {
            sqlx::query_as::<_, Payment>(
                r#"
                SELECT * FROM payments
                WHERE ($1::varchar IS NULL OR status::text = $1)
                  AND ($2::varchar IS NULL OR payment_type::text = $2)
                  AND ($3::uuid IS NULL OR property_id = $3)
                ORDER BY due_date DESC
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(&query.status)
            .bind(&query.payment_type)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        UserRole::Manager => {
            sqlx::query_as::<_, Payment>(
                r#"
                SELECT pay.* FROM payments pay
                JOIN properties p ON p.id = pay.property_id
                WHERE p.assigned_manager_id = $1
                  AND ($2::varchar IS NULL OR pay.status::text = $2)
                  AND ($3::varchar IS NULL OR pay.payment_type::text = $3)
                  AND ($4::uuid IS NULL OR pay.property_id = $4)
                ORDER BY pay.due_date DESC
                LIMIT $5 OFFSET $6
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.status)
            .bind(&query.payment_type)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            sqlx::query_as::<_, Payment>(
                r#"
                SELECT * FROM payments
                WHERE (tenant_id = $1 OR landlord_id = $1)
                  AND ($2::varchar IS NULL OR status::text = $2)
                  AND ($3::varchar IS NULL OR payment_type::text = $3)
                  AND ($4::uuid IS NULL OR property_id = $4)
                ORDER BY due_date DESC
                LIMIT $5 OFFSET $6
                "#,
            )
            .bind(auth_user.user_id)
            .bind(&query.status)
            .bind(&query.payment_type)
            .bind(query.property_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.pool)
            .await?
        }
    };

    let mut response = Vec::new();
    for payment in payments {
        response.push(build_payment_response(&state, payment).await?);
    }

    Ok(Json(response))
}

/// Payment details
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Payment", body = PaymentResponse),
        (status = 403, description = "Not a party to the payment"),
        (status = 404, description = "Payment not found")
    )
)]
pub async fn get_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PaymentResponse>> {
    let payment = load_payment(&state, id).await?;
    check_payment_access(&payment, &auth_user)?;

    let response = build_payment_response(&state, payment).await?;
    Ok(Json(response))
}

/// Delete an unpaid payment record
#[utoipa::path(
    delete,
    path = "/api/v1/payments/{id}",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Payment deleted"),
        (status = 403, description = "Only the landlord can delete"),
        (status = 409, description = "Payment has been settled")
    )
)]
pub async fn delete_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let payment = load_payment(&state, id).await?;

    if payment.landlord_id != auth_user.user_id && !is_admin(&auth_user.role) {
        return Err(AppError::Forbidden);
    }

    if matches!(
        payment.status,
        PaymentStatus::Paid | PaymentStatus::Processing | PaymentStatus::Refunded
    ) {
        return Err(AppError::Conflict(
            "Settled or in-flight payments cannot be deleted".to_string(),
        ));
    }

    sqlx::query("DELETE FROM payments WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Payment deleted"
    })))
}

/// Pay with a card through the demo gateway
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/process",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    request_body = ProcessPaymentRequest,
    responses(
        (status = 200, description = "Payment settled", body = PaymentResponse),
        (status = 400, description = "Card declined"),
        (status = 403, description = "Only the tenant can pay"),
        (status = 409, description = "Payment not payable or already in flight"),
        (status = 422, description = "Invalid card input")
    )
)]
pub async fn process_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProcessPaymentRequest>,
) -> AppResult<Json<PaymentResponse>> {
    let payment = load_payment(&state, id).await?;

    if payment.tenant_id != auth_user.user_id {
        return Err(AppError::Forbidden);
    }

    if !matches!(
        payment.status,
        PaymentStatus::Pending | PaymentStatus::Overdue | PaymentStatus::Failed
    ) {
        return Err(AppError::Conflict(format!(
            "Payment cannot be processed in its current state ({:?})",
            payment.status
        )));
    }

    // Claim the payment. The conditional update is the guard against two
    // concurrent attempts on the same record.
    let claimed = sqlx::query(
        r#"
        UPDATE payments SET status = 'processing', updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'overdue', 'failed')
        "#,
    )
    .bind(id)
    .execute(&state.pool)
    .await?;

    if claimed.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "Payment is already being processed".to_string(),
        ));
    }

    let previous_status = payment.status.clone();

    let gateway = GatewayService::new(&state.config);
    let card = CardDetails {
        number: payload.card_number,
        expiry_month: payload.expiry_month,
        expiry_year: payload.expiry_year,
        cvv: payload.cvv,
    };

    let charge = match gateway.charge(&card).await {
        Ok(result) => result,
        Err(e) => {
            // Malformed input never reached the gateway; release the claim.
            sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(&previous_status)
                .execute(&state.pool)
                .await?;
            return Err(e);
        }
    };

    let updated = match charge {
        ChargeResult::Approved(success) => {
            let now = Utc::now();

            // The receipt suffix is random; a same-month collision trips
            // the unique index, so regenerate and retry a few times.
            let mut attempts = 0;
            let updated = loop {
                let receipt_number = payment
                    .receipt_number
                    .clone()
                    .unwrap_or_else(|| generate_receipt_number(now.date_naive()));

                let result = sqlx::query_as::<_, Payment>(
                    r#"
                    UPDATE payments SET
                        status = 'paid',
                        paid_date = $2,
                        receipt_number = $3,
                        card_last4 = $4,
                        card_brand = $5,
                        transaction_id = $6,
                        processing_time_ms = $7,
                        failure_reason = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(now)
                .bind(&receipt_number)
                .bind(&success.card_last4)
                .bind(success.card_brand.as_str())
                .bind(&success.transaction_id)
                .bind(success.processing_time_ms as i32)
                .fetch_one(&state.pool)
                .await;

                match result {
                    Ok(updated) => break updated,
                    Err(sqlx::Error::Database(db))
                        if db.is_unique_violation()
                            && payment.receipt_number.is_none()
                            && attempts < 3 =>
                    {
                        attempts += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            settle_side_effects(&state, &updated);
            updated
        }
        ChargeResult::Declined(decline) => {
            sqlx::query(
                r#"
                UPDATE payments SET
                    status = 'failed',
                    card_brand = $2,
                    processing_time_ms = $3,
                    failure_reason = $4,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(decline.card_brand.as_str())
            .bind(decline.processing_time_ms as i32)
            .bind(&decline.message)
            .execute(&state.pool)
            .await?;

            return Err(AppError::GatewayDeclined(decline.message));
        }
    };

    let response = build_payment_response(&state, updated).await?;
    Ok(Json(response))
}

/// Receipt rendering and email after a successful charge, detached from
/// the request so a slow upload never delays the payer's response.
fn settle_side_effects(state: &AppState, payment: &Payment) {
    let pool = state.pool.clone();
    let config = state.config.clone();
    let payment = payment.clone();

    tokio::spawn(async move {
        let document_service = DocumentService::new(config.clone());
        if let Err(e) = document_service
            .generate_receipt_document(&pool, payment.id)
            .await
        {
            tracing::error!("Failed to generate receipt for {}: {}", payment.id, e);
        }

        let lookup: Result<Option<(String, String)>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT u.email, p.title
            FROM users u, properties p
            WHERE u.id = $1 AND p.id = $2
            "#,
        )
        .bind(payment.tenant_id)
        .bind(payment.property_id)
        .fetch_optional(&pool)
        .await;

        let (email, title) = match lookup {
            Ok(Some(pair)) => pair,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Receipt email lookup failed: {}", e);
                return;
            }
        };

        let receipt_number = payment.receipt_number.clone().unwrap_or_default();
        let email_service = EmailService::new(config);
        if let Err(e) = email_service
            .send_receipt(&email, &receipt_number, &payment.amount.to_string(), &title)
            .await
        {
            tracing::error!("Failed to send receipt email: {}", e);
        }
    });
}

/// Refund a settled payment
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refund",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Payment refunded", body = PaymentResponse),
        (status = 403, description = "Only the landlord can refund"),
        (status = 409, description = "Payment has not been settled")
    )
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PaymentResponse>> {
    let payment = load_payment(&state, id).await?;

    if payment.landlord_id != auth_user.user_id && !is_admin(&auth_user.role) {
        return Err(AppError::Forbidden);
    }

    if payment.status != PaymentStatus::Paid {
        return Err(AppError::Conflict(
            "Only a paid payment can be refunded".to_string(),
        ));
    }

    let transaction_id = payment
        .transaction_id
        .clone()
        .ok_or_else(|| AppError::Conflict("Payment has no gateway transaction".to_string()))?;

    let gateway = GatewayService::new(&state.config);
    let refund_id = gateway.refund(&transaction_id).await?;

    let updated = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments SET
            status = 'refunded',
            notes = CONCAT(COALESCE(notes || ' | ', ''), 'Refund ', $2::varchar),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&refund_id)
    .fetch_one(&state.pool)
    .await?;

    let response = build_payment_response(&state, updated).await?;
    Ok(Json(response))
}

/// Receipt for a settled payment
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}/receipt",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Receipt", body = ReceiptResponse),
        (status = 403, description = "Not a party to the payment"),
        (status = 409, description = "Payment has not been settled")
    )
)]
pub async fn get_receipt(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReceiptResponse>> {
    let mut payment = load_payment(&state, id).await?;
    check_payment_access(&payment, &auth_user)?;

    if payment.status != PaymentStatus::Paid {
        return Err(AppError::Conflict(
            "Receipt is only available for paid payments".to_string(),
        ));
    }

    let receipt_number = payment
        .receipt_number
        .clone()
        .ok_or_else(|| AppError::Conflict("Payment has no receipt number".to_string()))?;

    let paid_date = payment
        .paid_date
        .ok_or_else(|| AppError::Conflict("Payment has no paid date".to_string()))?;

    // Regenerate the stored document if the earlier background pass
    // never completed.
    if payment.receipt_url.is_none() {
        let document_service = DocumentService::new(state.config.clone());
        match document_service.generate_receipt_document(&state.pool, id).await {
            Ok(url) => payment.receipt_url = Some(url),
            Err(e) => tracing::error!("Receipt regeneration failed for {}: {}", id, e),
        }
    }

    Ok(Json(ReceiptResponse {
        receipt_number,
        payment_id: payment.id,
        amount: payment.amount,
        payment_type: payment.payment_type,
        paid_date,
        card_brand: payment.card_brand,
        card_last4: payment.card_last4,
        transaction_id: payment.transaction_id,
        receipt_url: payment.receipt_url,
    }))
}

/// Run recurring-rent generation on demand
#[utoipa::path(
    post,
    path = "/api/v1/payments/generate",
    tag = "payments",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Generation summary", body = GenerationSummary),
        (status = 403, description = "Landlords and admins only")
    )
)]
pub async fn generate_payments(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<GenerationSummary>> {
    if !is_landlord_or_admin(&auth_user.role) {
        return Err(AppError::Forbidden);
    }

    let today = Utc::now().date_naive();

    // Admins sweep the whole system; landlords only their own leases.
    let summary = if is_admin(&auth_user.role) {
        billing_service::run_generation_tick(&state.pool, today).await
    } else {
        billing_service::generate_for_landlord(&state.pool, auth_user.user_id, today).await
    };

    Ok(Json(summary))
}
