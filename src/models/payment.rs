use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Overdue,
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Rent,
    Deposit,
    LateFee,
    Maintenance,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub property_id: Uuid,
    pub lease_id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: PaymentStatus,
    pub receipt_number: Option<String>,
    pub card_last4: Option<String>,
    pub card_brand: Option<String>,
    pub transaction_id: Option<String>,
    pub processing_time_ms: Option<i32>,
    pub failure_reason: Option<String>,
    pub receipt_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Receipt numbers look like `RCP-202408-0417`. The four-digit suffix is
/// random, matching the legacy scheme; the unique index on the column is
/// the backstop for the rare same-month collision.
pub fn generate_receipt_number(date: NaiveDate) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!(
        "RCP-{}{:02}-{:04}",
        date.year(),
        date.month(),
        rng.gen_range(0..10000)
    )
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub property_id: Uuid,
    pub property_title: Option<String>,
    pub lease_id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub tenant_name: Option<String>,
    pub landlord_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: PaymentStatus,
    pub receipt_number: Option<String>,
    pub card_last4: Option<String>,
    pub card_brand: Option<String>,
    pub failure_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub property_id: Uuid,
    pub lease_id: Option<Uuid>,
    /// Required when a landlord creates the payment; ignored for tenant
    /// self-service where the tenant is always the payer.
    pub tenant_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessPaymentRequest {
    pub card_number: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvv: String,
    pub cardholder_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReceiptResponse {
    pub receipt_number: String,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
    pub paid_date: DateTime<Utc>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub transaction_id: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct PaymentsQuery {
    pub status: Option<String>,
    pub payment_type: Option<String>,
    pub property_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Summary returned by the manual recurring-generation endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct GenerationSummary {
    pub created: usize,
    pub existing: usize,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_number_format() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 15).unwrap();
        for _ in 0..50 {
            let receipt = generate_receipt_number(date);
            assert!(receipt.starts_with("RCP-202408-"));
            assert_eq!(receipt.len(), "RCP-202408-0000".len());
            let suffix = &receipt["RCP-202408-".len()..];
            assert!(suffix.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_receipt_number_month_padding() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        let receipt = generate_receipt_number(date);
        assert!(receipt.starts_with("RCP-202501-"));
    }
}
