use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{GenerationSummary, Lease, LeaseStatus, PaymentStatus, PaymentType};

// One tick in flight at a time, shared by the timer task and the manual
// admin trigger.
static TICK_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Due date for a given month, clamping day-of-month to the month's
/// length (a lease due on the 31st bills on Feb 28/29).
pub fn due_date_in_month(year: i32, month: u32, due_day: u32) -> NaiveDate {
    let last = last_day_of_month(year, month);
    NaiveDate::from_ymd_opt(year, month, due_day.min(last))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, last).unwrap())
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
        .day()
}

/// Calendar-month window [first of month, first of next month) used by
/// the duplicate-payment existence check.
pub fn month_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap();
    let end = if today.month() == 12 {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1).unwrap()
    };
    (start, end)
}

/// A lease bills today when today is its effective due day for this
/// month and today falls inside the lease term.
pub fn lease_bills_on(
    due_day: u32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    today: NaiveDate,
) -> bool {
    due_date_in_month(today.year(), today.month(), due_day) == today
        && start_date <= today
        && end_date >= today
}

/// Creates this month's rent payment for a lease unless one already
/// exists. Returns true when a payment was created, false when the
/// month is already covered.
pub async fn generate_for_lease(pool: &PgPool, lease: &Lease, today: NaiveDate) -> AppResult<bool> {
    if lease.status != LeaseStatus::Active {
        return Err(AppError::Conflict(
            "Payments can only be generated for active leases".to_string(),
        ));
    }

    let (month_start, month_end) = month_bounds(today);

    let existing: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM payments
        WHERE lease_id = $1
          AND payment_type = $2
          AND due_date >= $3
          AND due_date < $4
        LIMIT 1
        "#,
    )
    .bind(lease.id)
    .bind(PaymentType::Rent)
    .bind(month_start)
    .bind(month_end)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Ok(false);
    }

    let due_date = due_date_in_month(today.year(), today.month(), lease.payment_due_day as u32);

    sqlx::query(
        r#"
        INSERT INTO payments
            (property_id, lease_id, tenant_id, landlord_id, amount, payment_type, due_date, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(lease.property_id)
    .bind(lease.id)
    .bind(lease.tenant_id)
    .bind(lease.landlord_id)
    .bind(lease.rent_amount)
    .bind(PaymentType::Rent)
    .bind(due_date)
    .bind(PaymentStatus::Pending)
    .bind(format!("Monthly rent for {}", today.format("%B %Y")))
    .execute(pool)
    .await?;

    Ok(true)
}

/// Generation pass over every active lease whose effective due day is
/// today. Per-lease failures are isolated and collected; one broken
/// lease never stops the rest of the run.
pub async fn run_generation_tick(pool: &PgPool, today: NaiveDate) -> GenerationSummary {
    let mut summary = GenerationSummary {
        created: 0,
        existing: 0,
        errors: Vec::new(),
    };

    let leases = match sqlx::query_as::<_, Lease>(
        r#"
        SELECT * FROM leases
        WHERE status = 'active'
          AND start_date <= $1
          AND end_date >= $1
        "#,
    )
    .bind(today)
    .fetch_all(pool)
    .await
    {
        Ok(leases) => leases,
        Err(e) => {
            summary.errors.push(format!("Failed to load active leases: {}", e));
            return summary;
        }
    };

    for lease in leases {
        if !lease_bills_on(
            lease.payment_due_day as u32,
            lease.start_date,
            lease.end_date,
            today,
        ) {
            continue;
        }

        match generate_for_lease(pool, &lease, today).await {
            Ok(true) => summary.created += 1,
            Ok(false) => summary.existing += 1,
            Err(e) => summary
                .errors
                .push(format!("Lease {}: {}", lease.id, e)),
        }
    }

    summary
}

/// Marks every pending payment due strictly before today as overdue.
/// Processing, paid, failed and already-overdue records are untouched.
pub async fn run_overdue_sweep(pool: &PgPool, today: NaiveDate) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = 'overdue', updated_at = NOW()
        WHERE status = 'pending' AND due_date < $1
        "#,
    )
    .bind(today)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Manual "generate for everything I own" variant, scoped to one
/// landlord's active leases instead of the whole system.
pub async fn generate_for_landlord(
    pool: &PgPool,
    landlord_id: Uuid,
    today: NaiveDate,
) -> GenerationSummary {
    let mut summary = GenerationSummary {
        created: 0,
        existing: 0,
        errors: Vec::new(),
    };

    let leases = match sqlx::query_as::<_, Lease>(
        r#"
        SELECT * FROM leases
        WHERE landlord_id = $1
          AND status = 'active'
          AND start_date <= $2
          AND end_date >= $2
        "#,
    )
    .bind(landlord_id)
    .bind(today)
    .fetch_all(pool)
    .await
    {
        Ok(leases) => leases,
        Err(e) => {
            summary.errors.push(format!("Failed to load leases: {}", e));
            return summary;
        }
    };

    for lease in leases {
        match generate_for_lease(pool, &lease, today).await {
            Ok(true) => summary.created += 1,
            Ok(false) => summary.existing += 1,
            Err(e) => summary
                .errors
                .push(format!("Lease {}: {}", lease.id, e)),
        }
    }

    summary
}

/// One scheduler pass: generation, then the overdue sweep. The two
/// steps are independent; a failure in one is logged and does not stop
/// the other. Skips when a tick is already in flight.
pub async fn run_daily_tick(pool: &PgPool) {
    let Ok(_guard) = TICK_LOCK.try_lock() else {
        tracing::warn!("Billing tick already running, skipping this pass");
        return;
    };

    let today = chrono::Utc::now().date_naive();

    let summary = run_generation_tick(pool, today).await;
    tracing::info!(
        created = summary.created,
        existing = summary.existing,
        errors = summary.errors.len(),
        "Recurring payment generation finished"
    );
    for err in &summary.errors {
        tracing::error!("Payment generation error: {}", err);
    }

    match run_overdue_sweep(pool, today).await {
        Ok(updated) => tracing::info!(updated, "Overdue sweep finished"),
        Err(e) => tracing::error!("Overdue sweep failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn draft_lease() -> Lease {
        Lease {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            landlord_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 12, 31),
            rent_amount: Decimal::new(150000, 2),
            deposit_amount: Decimal::new(150000, 2),
            payment_due_day: 1,
            terms: None,
            status: LeaseStatus::Draft,
            landlord_signed: false,
            landlord_signature_data: None,
            landlord_signed_at: None,
            landlord_signature_ip: None,
            tenant_signed: false,
            tenant_signature_data: None,
            tenant_signed_at: None,
            tenant_signature_ip: None,
            document_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_inactive_lease() {
        // Lazy pool: the status guard must fire before any query runs
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unreachable")
            .unwrap();

        let err = generate_for_lease(&pool, &draft_lease(), date(2024, 6, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2024, 1), 31);
        assert_eq!(last_day_of_month(2024, 2), 29);
        assert_eq!(last_day_of_month(2023, 2), 28);
        assert_eq!(last_day_of_month(2024, 4), 30);
        assert_eq!(last_day_of_month(2024, 12), 31);
    }

    #[test]
    fn test_due_date_clamps_to_month_length() {
        assert_eq!(due_date_in_month(2024, 2, 31), date(2024, 2, 29));
        assert_eq!(due_date_in_month(2023, 2, 30), date(2023, 2, 28));
        assert_eq!(due_date_in_month(2024, 4, 31), date(2024, 4, 30));
        assert_eq!(due_date_in_month(2024, 7, 15), date(2024, 7, 15));
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(
            month_bounds(date(2024, 8, 20)),
            (date(2024, 8, 1), date(2024, 9, 1))
        );
        assert_eq!(
            month_bounds(date(2024, 12, 5)),
            (date(2024, 12, 1), date(2025, 1, 1))
        );
    }

    #[test]
    fn test_lease_bills_on_matching_day() {
        let start = date(2024, 1, 1);
        let end = date(2024, 12, 31);

        assert!(lease_bills_on(15, start, end, date(2024, 6, 15)));
        assert!(!lease_bills_on(15, start, end, date(2024, 6, 14)));
        assert!(!lease_bills_on(15, start, end, date(2024, 6, 16)));
    }

    #[test]
    fn test_lease_bills_on_clamped_day() {
        let start = date(2024, 1, 1);
        let end = date(2024, 12, 31);

        // Due day 31 fires on the last day of February
        assert!(lease_bills_on(31, start, end, date(2024, 2, 29)));
        assert!(!lease_bills_on(31, start, end, date(2024, 2, 28)));
    }

    #[test]
    fn test_lease_bills_only_inside_term() {
        let start = date(2024, 3, 1);
        let end = date(2024, 8, 31);

        assert!(lease_bills_on(1, start, end, date(2024, 5, 1)));
        assert!(!lease_bills_on(1, start, end, date(2024, 2, 1)));
        assert!(!lease_bills_on(1, start, end, date(2024, 9, 1)));
        // Term boundaries are inclusive
        assert!(lease_bills_on(1, start, end, date(2024, 3, 1)));
    }
}
